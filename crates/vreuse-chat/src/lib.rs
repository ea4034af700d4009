//! Conversation resolution and the message log service, shared by the REST
//! API and the WebSocket gateway.

pub mod error;
pub mod message_log;
pub mod resolver;
pub mod users;

pub use error::{ChatError, ErrorKind};
pub use message_log::MessageLog;
pub use resolver::{ConversationResolver, ResolvedConversation};
pub use users::UserDirectory;
