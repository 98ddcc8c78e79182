use crate::auth::extractor::access_token_from_request;
use crate::db::operations::DbOperations;
use crate::error::{AppError, AuthError};
use crate::websocket::hub::ChatHub;
use crate::websocket::protocol::{ClientMessage, ServerMessage};
use crate::websocket::relay;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// A frame queued by the hub for this socket.
struct Outbound(String);

/// One browser socket. Frames from other connections arrive through the
/// hub's channel and are written out by the `Outbound` stream handler.
pub struct ChatSession {
    id: Uuid,
    user_id: Uuid,
    peer_addr: String,
    hub: Arc<ChatHub>,
    db: DbOperations,
    heartbeat: Instant,
}

impl ChatSession {
    pub fn new(user_id: Uuid, peer_addr: String, hub: Arc<ChatHub>, db: DbOperations) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            peer_addr,
            hub,
            db,
            heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut <Self as Actor>::Context, msg: &ServerMessage) {
        ctx.text(msg.to_json());
    }

    fn send_error(&self, ctx: &mut <Self as Actor>::Context, message: &str) {
        self.send(
            ctx,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > CLIENT_TIMEOUT {
                warn!("Heartbeat timed out for {} (user {}), disconnecting", act.peer_addr, act.user_id);
                ctx.stop();
                return;
            }
            act.send(ctx, &ServerMessage::Ping);
        });
    }

    fn handle_client_message(&mut self, text: &str, ctx: &mut <Self as Actor>::Context) {
        let client_msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to parse message from {}: {}", self.peer_addr, e);
                self.send_error(ctx, &format!("Invalid message format: {}", e));
                return;
            }
        };

        match client_msg {
            ClientMessage::JoinRoom { room_id } => {
                let (db, hub) = (self.db.clone(), self.hub.clone());
                let (connection_id, user_id) = (self.id, self.user_id);
                let fut = async move { relay::join_chat_room(&db, &hub, connection_id, user_id, &room_id).await };
                ctx.spawn(fut.into_actor(self).map(|result, act, ctx| match result {
                    Ok(room_id) => act.send(ctx, &ServerMessage::Joined { room_id }),
                    Err(e) => act.send_error(ctx, &e.to_string()),
                }));
            }
            ClientMessage::LeaveRoom { room_id } => {
                let hub = self.hub.clone();
                let connection_id = self.id;
                ctx.spawn(async move { hub.leave(&connection_id, &room_id).await }.into_actor(self));
            }
            ClientMessage::SendMessage { chat_id, content } => {
                let (db, hub) = (self.db.clone(), self.hub.clone());
                let sender_id = self.user_id;
                let fut = async move { relay::relay_message(&db, &hub, sender_id, chat_id, &content).await };
                ctx.spawn(fut.into_actor(self).map(|result, act, ctx| {
                    if let Err(e) = result {
                        error!("Message from user {} was not relayed: {}", act.user_id, e);
                        act.send_error(ctx, &e.to_string());
                    }
                }));
            }
            ClientMessage::Typing { chat_id } => {
                let hub = self.hub.clone();
                let (connection_id, user_id) = (self.id, self.user_id);
                ctx.spawn(
                    async move {
                        let room = chat_id.to_string();
                        // Only sockets that passed the join check may signal typing
                        if hub.is_member(&connection_id, &room).await {
                            hub.send_to_room(&room, &ServerMessage::Typing { chat_id, user_id }, Some(connection_id))
                                .await;
                        }
                    }
                    .into_actor(self),
                );
            }
            ClientMessage::Ping => self.send(ctx, &ServerMessage::Pong),
            ClientMessage::Pong => self.heartbeat = Instant::now(),
        }
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection established with {} (user {}, id {})", self.peer_addr, self.user_id, self.id);
        self.start_heartbeat(ctx);

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        ctx.add_stream(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Outbound(frame), rx))
        }));

        let hub = self.hub.clone();
        let (connection_id, user_id) = (self.id, self.user_id);
        ctx.wait(async move { hub.register(connection_id, user_id, tx).await }.into_actor(self));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection closed with {} (id {})", self.peer_addr, self.id);
        let hub = self.hub.clone();
        let connection_id = self.id;
        actix::spawn(async move {
            hub.unregister(&connection_id).await;
        });
    }
}

impl StreamHandler<Outbound> for ChatSession {
    fn handle(&mut self, frame: Outbound, ctx: &mut Self::Context) {
        ctx.text(frame.0);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        debug!("Outbound channel closed for connection {}", self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.heartbeat = Instant::now();
                self.handle_client_message(&text, ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                debug!("Received binary message from {} of {} bytes", self.peer_addr, bin.len());
                self.send_error(ctx, "Binary messages are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Checks the handshake: a known `userId` is required, and when the
/// browser also sent a session cookie it must belong to that user.
async fn authorize_handshake(
    req: &HttpRequest,
    query: &ConnectQuery,
    state: &crate::AppState,
) -> Result<Uuid, AppError> {
    let raw = query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::ValidationError("userId query parameter is required".into()))?;
    let user_id = Uuid::parse_str(raw)?;

    if let Some(token) = access_token_from_request(req) {
        let claims = state.auth.verify_access(&token)?;
        if claims.sub != user_id {
            return Err(AuthError::SessionMismatch.into());
        }
    }

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }
    Ok(user.id)
}

/// Upgrades `GET /ws?userId=...` to a chat socket.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    state: web::Data<crate::AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("New WebSocket connection request from: {}", peer_addr);

    let user_id = match authorize_handshake(&req, &query, &state).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejected WebSocket handshake from {}: {}", peer_addr, e);
            return Err(e.into());
        }
    };

    ws::start(
        ChatSession::new(user_id, peer_addr, state.hub.clone(), state.db.clone()),
        &req,
        stream,
    )
}
