use crate::websocket::protocol::ServerMessage;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

struct ConnectionEntry {
    user_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<Uuid, ConnectionEntry>,
    rooms: HashMap<String, HashSet<Uuid>>,
    /// Open connections per user; a user is online while this is non-zero.
    online: HashMap<Uuid, usize>,
}

impl HubState {
    fn online_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.online.keys().copied().collect();
        users.sort();
        users
    }

    fn send(&self, connection_id: &Uuid, payload: &str) {
        if let Some(entry) = self.connections.get(connection_id) {
            if let Err(e) = entry.sender.send(payload.to_string()) {
                error!("Failed to send to connection {}: {}", connection_id, e);
            }
        }
    }

    fn broadcast(&self, payload: &str) {
        for id in self.connections.keys() {
            self.send(id, payload);
        }
    }
}

/// Process-wide registry of chat sockets, their rooms and who is online.
pub struct ChatHub {
    state: RwLock<HubState>,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
        }
    }

    /// Adds a connection and pushes the new online list to everyone.
    pub async fn register(&self, connection_id: Uuid, user_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        *state.online.entry(user_id).or_insert(0) += 1;
        info!("Registered connection {} for user {}", connection_id, user_id);

        let online = ServerMessage::OnlineUsers {
            user_ids: state.online_users(),
        };
        state.broadcast(&online.to_json());
    }

    pub async fn unregister(&self, connection_id: &Uuid) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.remove(connection_id) else {
            return false;
        };

        for room in &entry.rooms {
            let now_empty = match state.rooms.get_mut(room) {
                Some(members) => {
                    members.remove(connection_id);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.rooms.remove(room);
            }
        }

        let went_offline = match state.online.get_mut(&entry.user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => true,
        };
        if went_offline {
            state.online.remove(&entry.user_id);
        }
        info!("Removed connection {} for user {}", connection_id, entry.user_id);

        let online = ServerMessage::OnlineUsers {
            user_ids: state.online_users(),
        };
        state.broadcast(&online.to_json());
        true
    }

    pub async fn join(&self, connection_id: &Uuid, room: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return false;
        };
        entry.rooms.insert(room.to_string());
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(*connection_id);
        debug!("Connection {} joined room {}", connection_id, room);
        true
    }

    pub async fn leave(&self, connection_id: &Uuid, room: &str) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(connection_id) {
            entry.rooms.remove(room);
        }
        let now_empty = match state.rooms.get_mut(room) {
            Some(members) => {
                members.remove(connection_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.rooms.remove(room);
        }
    }

    pub async fn is_member(&self, connection_id: &Uuid, room: &str) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map_or(false, |members| members.contains(connection_id))
    }

    pub async fn send_to_room(&self, room: &str, msg: &ServerMessage, exclude: Option<Uuid>) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return 0;
        };

        let payload = msg.to_json();
        let mut delivered = 0;
        for id in members {
            if Some(*id) == exclude {
                continue;
            }
            state.send(id, &payload);
            delivered += 1;
        }
        delivered
    }

    pub async fn send_to_user(&self, user_id: &Uuid, msg: &ServerMessage) -> usize {
        let state = self.state.read().await;
        let payload = msg.to_json();
        let targets: Vec<Uuid> = state
            .connections
            .iter()
            .filter(|(_, entry)| entry.user_id == *user_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &targets {
            state.send(id, &payload);
        }
        targets.len()
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.state.read().await.online_users()
    }

    pub async fn is_online(&self, user_id: &Uuid) -> bool {
        self.state.read().await.online.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
