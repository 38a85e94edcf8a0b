mod comments;
mod room;

pub use room::{ActiveUser, CollaborationHub};
