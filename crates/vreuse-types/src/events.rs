use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageView;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is identified and registered
    Ready { user_id: Uuid },

    /// A message was appended to a conversation this user belongs to
    Deliver { message: MessageView },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Bind this connection to the user named in the token. A signed token
    /// rather than a bare user id, so a client cannot claim someone else's
    /// presence and receive their messages.
    Identify { token: String },

    /// Post a message. Ids stay raw strings; the delivery router validates
    /// them and drops anything malformed.
    Send {
        conversation_id: String,
        sender_id: String,
        text: String,
    },
}
