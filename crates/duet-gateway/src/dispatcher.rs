use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

/// Notification that something in a conversation's message set changed.
/// Carries no payload: listeners re-read the full ordered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationChanged {
    pub conversation_id: String,
}

/// Fans out change notifications to every live query.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for change notifications; every live query sees
    /// every notification and filters by conversation id
    broadcast_tx: broadcast::Sender<ConversationChanged>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to change notifications. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationChanged> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Announce that `conversation_id` changed.
    pub fn notify(&self, conversation_id: &str) {
        // No receivers is fine: nobody is watching this conversation.
        let delivered = self
            .inner
            .broadcast_tx
            .send(ConversationChanged {
                conversation_id: conversation_id.to_string(),
            })
            .unwrap_or(0);
        trace!("Change on {} fanned out to {} listeners", conversation_id, delivered);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
