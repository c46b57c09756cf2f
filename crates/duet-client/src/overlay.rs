use std::sync::{Arc, Mutex};

use tracing::warn;
use uuid::Uuid;

use duet_api::channel::MessageChannel;
use duet_api::error::ChatError;
use duet_api::store::now;
use duet_types::identity::counterpart;
use duet_types::models::{Identity, Message, MessagePayload};

/// Prefix of placeholder ids. Persisted ids are UUIDs and never carry it.
pub const PLACEHOLDER_PREFIX: &str = "local-";

/// A send that did not go through. Carries the original input back so the
/// caller can offer a retry.
#[derive(Debug)]
pub struct SendFailure {
    pub conversation_id: String,
    pub payload: MessagePayload,
    pub error: ChatError,
}

/// Outgoing messages shown before the store confirms them.
#[derive(Clone)]
pub struct OptimisticOverlay {
    channel: MessageChannel,
    sender: Identity,
    pending: Arc<Mutex<Vec<Message>>>,
}

impl OptimisticOverlay {
    pub fn new(channel: MessageChannel, sender: Identity) -> Self {
        Self {
            channel,
            sender,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Show `payload` in the view right away and persist it. The placeholder
    /// is gone when this returns, whatever the outcome; on success the
    /// stream carries the real record.
    pub async fn submit(
        &self,
        conversation_id: &str,
        payload: MessagePayload,
    ) -> Result<Message, SendFailure> {
        let placeholder = self.stage(conversation_id, &payload);
        let result = self
            .channel
            .send(conversation_id, payload.clone(), &self.sender, Some(placeholder.created_at))
            .await;
        self.settle(&placeholder.id);

        result.map_err(|error| {
            warn!("Send to {} failed: {}", conversation_id, error);
            SendFailure {
                conversation_id: conversation_id.to_string(),
                payload,
                error,
            }
        })
    }

    /// Add a placeholder for `payload` and return it.
    pub fn stage(&self, conversation_id: &str, payload: &MessagePayload) -> Message {
        let at = now();
        let receiver = counterpart(conversation_id, &self.sender.uid).unwrap_or_default();
        let mut placeholder = Message::new_delivered(
            format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()),
            conversation_id,
            &self.sender.uid,
            receiver,
            payload,
            at,
            at,
        );
        placeholder.delivered_at = None;

        if let Ok(mut pending) = self.pending.lock() {
            pending.push(placeholder.clone());
        }
        placeholder
    }

    /// Drop a placeholder once its write has finished.
    pub fn settle(&self, placeholder_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|m| m.id != placeholder_id);
        }
    }

    pub fn pending(&self, conversation_id: &str) -> Vec<Message> {
        self.pending
            .lock()
            .map(|pending| {
                pending
                    .iter()
                    .filter(|m| m.conversation_id == conversation_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge an authoritative snapshot with outstanding placeholders of the
    /// same conversation, ordered by `created_at`.
    pub fn view(&self, conversation_id: &str, snapshot: &[Message]) -> Vec<Message> {
        let mut merged = snapshot.to_vec();
        merged.extend(self.pending(conversation_id));
        // Stable: snapshot order wins on equal timestamps
        merged.sort_by_key(|m| m.created_at);
        merged
    }
}

pub fn is_placeholder(message: &Message) -> bool {
    message.id.starts_with(PLACEHOLDER_PREFIX)
}
