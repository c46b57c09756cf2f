use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: String },

    /// Full ordered message set of a subscribed conversation.
    /// Sent once on subscribe and again after every change.
    MessagesSnapshot {
        conversation_id: String,
        messages: Vec<Message>,
    },

    /// A command was rejected (e.g. subscribing to someone else's conversation)
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start streaming snapshots for a conversation
    Subscribe { conversation_id: String },

    /// Stop streaming snapshots for a conversation
    Unsubscribe { conversation_id: String },
}
