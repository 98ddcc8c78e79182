use crate::api::{response, PageQuery};
use crate::auth::extractor::AuthenticatedUser;
use crate::error::AppError;
use crate::websocket::relay;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct OpenChatRequest {
    pub property_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

pub async fn list_chats(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.list_chats_for_user(user.id).await?))
}

/// Opens the conversation between the caller and a listing's owner,
/// reusing the existing one when there is one.
pub async fn open_chat(
    user: AuthenticatedUser,
    req: web::Json<OpenChatRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(req.property_id).await?;
    if property.owner_id == user.id {
        return Err(AppError::ValidationError("You cannot start a chat with yourself".into()));
    }

    let chat = state
        .db
        .find_or_create_chat(property.id, user.id, property.owner_id)
        .await?;
    info!("User {} opened chat {} about property {}", user.id, chat.id, property.id);
    Ok(response::ok(chat))
}

pub async fn list_messages(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let chat = relay::participant_chat(&state.db, path.into_inner(), user.id).await?;
    let page = query.page();
    let messages = state.db.list_messages(chat.id, page.limit, page.offset()).await?;
    Ok(response::ok(messages))
}

pub async fn send_message(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<SendMessageRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let message = relay::relay_message(&state.db, &state.hub, user.id, path.into_inner(), &req.content).await?;
    Ok(response::created(message, "Message sent"))
}

pub async fn mark_read(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let chat = relay::participant_chat(&state.db, path.into_inner(), user.id).await?;
    let updated = state.db.mark_chat_read(chat.id, user.id).await?;
    Ok(response::ok(serde_json::json!({ "updated": updated })))
}

pub async fn online_users(_user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(serde_json::json!({ "user_ids": state.hub.online_users().await })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .route("", web::get().to(list_chats))
            .route("", web::post().to(open_chat))
            .route("/online", web::get().to(online_users))
            .route("/{id}/messages", web::get().to(list_messages))
            .route("/{id}/messages", web::post().to(send_message))
            .route("/{id}/read", web::patch().to(mark_read)),
    );
}
