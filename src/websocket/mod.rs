//! Realtime chat: the socket actor, the shared room hub and the frame
//! protocol spoken over `/ws`.

pub mod hub;
pub mod protocol;
pub mod relay;
pub mod session;

pub use hub::ChatHub;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{websocket_route, ChatSession};
