use std::sync::Arc;

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use duet_db::Database;
use duet_gateway::dispatcher::Dispatcher;
use duet_gateway::live::{LiveQuery, Subscription, load_messages};
use duet_media::path::parse_object_path;
use duet_types::identity::split_conversation_id;
use duet_types::models::{Identity, Message, MessagePayload};

use crate::error::ChatError;
use crate::store::{ConversationStore, now, run_blocking};

/// Write path and live stream for a conversation's messages.
#[derive(Clone)]
pub struct MessageChannel {
    db: Arc<Database>,
    store: ConversationStore,
    live: LiveQuery,
}

impl MessageChannel {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self {
            store: ConversationStore::new(db.clone()),
            live: LiveQuery::new(db.clone(), dispatcher),
            db,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn live(&self) -> &LiveQuery {
        &self.live
    }

    /// Persist a new message from `sender`.
    ///
    /// The receiver is derived from the conversation id rather than the
    /// stored participants. On first contact the conversation is created
    /// before the message is written. Nothing is written if the sender is
    /// not a participant.
    pub async fn send(
        &self,
        conversation_id: &str,
        payload: MessagePayload,
        sender: &Identity,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Message, ChatError> {
        let (a, b) = split_conversation_id(conversation_id)
            .ok_or_else(|| ChatError::InvalidConversationId(conversation_id.to_string()))?;
        validate_payload(conversation_id, &payload)?;
        if let Some(at) = created_at {
            validate_created_at(at)?;
        }

        let existing = self.store.get(conversation_id).await?;
        let is_participant = match &existing {
            Some(convo) => convo.has_participant(&sender.uid),
            None => true,
        };
        let receiver = if sender.uid == a {
            b
        } else if sender.uid == b {
            a
        } else {
            return Err(ChatError::authorization(&sender.uid, conversation_id));
        };
        if !is_participant {
            return Err(ChatError::authorization(&sender.uid, conversation_id));
        }

        let now = now();
        let created_at = created_at.map(|t| t.trunc_subsecs(6)).unwrap_or(now);
        let message = Message::new_delivered(
            Uuid::new_v4().to_string(),
            conversation_id,
            &sender.uid,
            receiver,
            &payload,
            created_at,
            now,
        );

        if existing.is_none() && !self.store.ensure(conversation_id, (a, b)).await? {
            // The other participant created it between our read and write
            debug!("Conversation {} appeared concurrently, merging", conversation_id);
        }

        let record = message.clone();
        run_blocking(&self.db, move |db| db.insert_message(&record)).await?;
        self.store.touch(conversation_id, &payload.preview(), now).await?;
        self.live.dispatcher().notify(conversation_id);

        info!(
            "{} -> {} in {}: {} message {}",
            message.sender_id,
            message.receiver_id,
            conversation_id,
            message.kind.as_str(),
            message.id
        );
        Ok(message)
    }

    /// The full ordered message set, as the first emission of `subscribe`
    /// would deliver it.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, ChatError> {
        Ok(load_messages(&self.db, conversation_id).await?)
    }

    /// Live ordered stream, see [`LiveQuery::subscribe`].
    pub fn subscribe<F>(&self, conversation_id: &str, on_update: F) -> Subscription
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        self.live.subscribe(conversation_id, on_update)
    }

    /// delivered -> sent, on the receiver's behalf.
    ///
    /// `Ok(false)` when nothing changed: the message is gone or already past
    /// `delivered`.
    pub async fn mark_sent(
        &self,
        conversation_id: &str,
        message_id: &str,
        actor: &Identity,
    ) -> Result<bool, ChatError> {
        if self.receiver_check(conversation_id, message_id, actor).await?.is_none() {
            return Ok(false);
        }
        let (cid, mid, at) = (conversation_id.to_string(), message_id.to_string(), now());
        let changed = run_blocking(&self.db, move |db| db.mark_message_sent(&cid, &mid, at)).await?;
        if changed {
            debug!("{} marked {} sent", actor.uid, message_id);
            self.live.dispatcher().notify(conversation_id);
        }
        Ok(changed)
    }

    /// delivered|sent -> seen, on the receiver's behalf.
    pub async fn mark_seen(
        &self,
        conversation_id: &str,
        message_id: &str,
        actor: &Identity,
    ) -> Result<bool, ChatError> {
        if self.receiver_check(conversation_id, message_id, actor).await?.is_none() {
            return Ok(false);
        }
        let (cid, mid, at) = (conversation_id.to_string(), message_id.to_string(), now());
        let changed = run_blocking(&self.db, move |db| db.mark_message_seen(&cid, &mid, at)).await?;
        if changed {
            debug!("{} marked {} seen", actor.uid, message_id);
            self.live.dispatcher().notify(conversation_id);
        }
        Ok(changed)
    }

    /// Load the message and require `actor` to be its receiver. A missing
    /// message is `None`: it is no longer relevant and the transition is a
    /// no-op.
    async fn receiver_check(
        &self,
        conversation_id: &str,
        message_id: &str,
        actor: &Identity,
    ) -> Result<Option<Message>, ChatError> {
        let (cid, mid) = (conversation_id.to_string(), message_id.to_string());
        let Some(row) = run_blocking(&self.db, move |db| db.get_message(&cid, &mid)).await? else {
            debug!("Transition on missing message {} ignored", message_id);
            return Ok(None);
        };
        let message = row.into_message()?;
        if !message.is_addressed_to(&actor.uid) {
            return Err(ChatError::authorization(&actor.uid, conversation_id));
        }
        Ok(Some(message))
    }
}

fn validate_payload(conversation_id: &str, payload: &MessagePayload) -> Result<(), ChatError> {
    match payload {
        MessagePayload::Text { content } => {
            if content.trim().is_empty() {
                return Err(ChatError::InvalidPayload("empty text".into()));
            }
        }
        MessagePayload::Media { kind, path } => {
            let parts = parse_object_path(path).map_err(|e| ChatError::InvalidPayload(e.to_string()))?;
            if parts.conversation_id != conversation_id || parts.kind != *kind {
                return Err(ChatError::InvalidPayload(format!(
                    "{path} is not a {} object of {conversation_id}",
                    kind.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// Stored timestamps sort as text, which only holds for four-digit years.
fn validate_created_at(at: DateTime<Utc>) -> Result<(), ChatError> {
    if !(0..=9999).contains(&at.year()) {
        return Err(ChatError::InvalidPayload(format!("createdAt out of range: {at}")));
    }
    Ok(())
}
