//! Chat actions shared by the socket and the REST endpoints.

use crate::db::models::{Chat, Message};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use crate::websocket::hub::ChatHub;
use crate::websocket::protocol::ServerMessage;
use tracing::info;
use uuid::Uuid;

pub const MAX_MESSAGE_LENGTH: usize = 2000;
const PREVIEW_LENGTH: usize = 80;

pub fn validate_content(content: &str) -> Result<&str, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::ValidationError("Message cannot be empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(AppError::ValidationError(format!(
            "Message cannot exceed {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(content)
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LENGTH {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_LENGTH).collect();
        format!("{}...", cut)
    }
}

/// Loads a chat and checks that `user_id` takes part in it.
pub async fn participant_chat(db: &DbOperations, chat_id: Uuid, user_id: Uuid) -> Result<Chat, AppError> {
    let chat = db
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;
    if !chat.is_participant(user_id) {
        return Err(AppError::Forbidden("You are not part of this chat".into()));
    }
    Ok(chat)
}

/// Persists a message, notifies the other participant, then relays it to
/// everyone in the chat's room.
pub async fn relay_message(
    db: &DbOperations,
    hub: &ChatHub,
    sender_id: Uuid,
    chat_id: Uuid,
    content: &str,
) -> Result<Message, AppError> {
    let content = validate_content(content)?;
    let chat = participant_chat(db, chat_id, sender_id).await?;

    let message = db.insert_message(chat.id, sender_id, content).await?;
    let recipient = chat.other_participant(sender_id);
    db.create_notification(recipient, "message", "New message", &preview(content))
        .await?;

    let delivered = hub
        .send_to_room(
            &chat.id.to_string(),
            &ServerMessage::NewMessage {
                message: message.clone(),
            },
            None,
        )
        .await;
    info!("Relayed message {} in chat {} to {} connections", message.id, chat.id, delivered);
    Ok(message)
}

/// Joins a socket to a chat room after checking membership.
pub async fn join_chat_room(
    db: &DbOperations,
    hub: &ChatHub,
    connection_id: Uuid,
    user_id: Uuid,
    room_id: &str,
) -> Result<String, AppError> {
    let chat_id = Uuid::parse_str(room_id.trim())
        .map_err(|_| AppError::ValidationError("room_id must be a chat id".into()))?;
    let chat = participant_chat(db, chat_id, user_id).await?;

    let room = chat.id.to_string();
    hub.join(&connection_id, &room).await;
    Ok(room)
}
