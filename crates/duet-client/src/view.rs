use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use duet_api::channel::MessageChannel;
use duet_gateway::live::Subscription;
use duet_types::models::{Identity, Message, MessageStatus};

/// An open conversation screen.
///
/// Whenever the most recent message addressed to the viewer is not yet
/// `seen`, it is marked `seen`. Closing the view stops both the callbacks
/// and the trigger.
pub struct ConversationView {
    subscription: Subscription,
}

impl ConversationView {
    pub fn open<F>(
        channel: &MessageChannel,
        viewer: Identity,
        conversation_id: &str,
        mut on_update: F,
    ) -> Self
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        let trigger_channel = channel.clone();
        // Id of the seen write in flight, so repeated snapshots don't pile up
        let requested: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let subscription = channel.subscribe(conversation_id, move |snapshot| {
            if let Some(latest) = latest_unseen_incoming(&snapshot, &viewer.uid) {
                request_seen(&trigger_channel, &viewer, &requested, latest);
            }
            on_update(snapshot);
        });
        Self { subscription }
    }

    pub fn conversation_id(&self) -> &str {
        self.subscription.conversation_id()
    }

    pub fn close(self) {
        debug!("Closing view of {}", self.subscription.conversation_id());
    }
}

/// The most recent message addressed to `uid`, when it is not `seen`.
pub fn latest_unseen_incoming<'a>(snapshot: &'a [Message], uid: &str) -> Option<&'a Message> {
    snapshot
        .iter()
        .rev()
        .find(|m| m.is_addressed_to(uid))
        .filter(|m| m.status != MessageStatus::Seen)
}

fn request_seen(
    channel: &MessageChannel,
    viewer: &Identity,
    requested: &Arc<Mutex<Option<String>>>,
    message: &Message,
) {
    match requested.lock() {
        Ok(mut current) => {
            if current.as_deref() == Some(message.id.as_str()) {
                return;
            }
            *current = Some(message.id.clone());
        }
        Err(_) => return,
    }

    let channel = channel.clone();
    let viewer = viewer.clone();
    let requested = requested.clone();
    let conversation_id = message.conversation_id.clone();
    let message_id = message.id.clone();
    tokio::spawn(async move {
        if let Err(e) = channel.mark_seen(&conversation_id, &message_id, &viewer).await {
            warn!("Failed to mark {} seen: {}", message_id, e);
            if let Ok(mut current) = requested.lock() {
                if current.as_deref() == Some(message_id.as_str()) {
                    *current = None;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use duet_types::models::MessagePayload;

    use super::*;

    fn incoming(id: &str, from: &str, to: &str, offset: i64) -> Message {
        let at = Utc::now() + Duration::seconds(offset);
        Message::new_delivered(id.to_string(), "u1__u2", from, to, &MessagePayload::text(id), at, at)
    }

    #[test]
    fn test_latest_incoming_skips_own_messages() {
        let snapshot = vec![
            incoming("a", "u1", "u2", 0),
            incoming("b", "u2", "u1", 1),
            incoming("c", "u1", "u2", 2),
            incoming("d", "u2", "u1", 3),
        ];
        assert_eq!(latest_unseen_incoming(&snapshot, "u2").unwrap().id, "c");
        assert_eq!(latest_unseen_incoming(&snapshot, "u1").unwrap().id, "d");
    }

    #[test]
    fn test_latest_incoming_already_seen() {
        let mut latest = incoming("b", "u1", "u2", 1);
        latest.status = MessageStatus::Seen;
        let snapshot = vec![incoming("a", "u1", "u2", 0), latest];
        // An older unseen message does not trigger once the latest is seen
        assert!(latest_unseen_incoming(&snapshot, "u2").is_none());
        assert!(latest_unseen_incoming(&[], "u2").is_none());
    }
}
