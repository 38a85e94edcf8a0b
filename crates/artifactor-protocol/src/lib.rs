pub mod frames;
pub mod handshake;
pub mod methods;

pub use frames::{ClientMessage, MessageType, ServerMessage};
pub use handshake::{AuthenticatedUser, ConnectParams};
