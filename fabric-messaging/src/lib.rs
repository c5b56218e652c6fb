//! Directed mailboxes, broadcast channels, and collaboration request/response workflows.
pub mod error;
pub mod mailbox;
pub mod message;

pub use error::MessagingError;
pub use error::Result;
pub use mailbox::Messaging;
pub use message::BroadcastMessage;
pub use message::Collaboration;
pub use message::DirectedMessage;
pub use message::MessagePriority;
