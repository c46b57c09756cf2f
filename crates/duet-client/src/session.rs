use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use duet_api::channel::MessageChannel;
use duet_gateway::live::Subscription;
use duet_types::models::{Identity, Message, MessageStatus};

use crate::view::ConversationView;

/// Upper bound on remembered attempts per session.
pub const ATTEMPTED_CAPACITY: usize = 4096;

/// Message ids this session has already tried to mark `sent`, oldest
/// evicted first once full.
#[derive(Debug, Default)]
pub struct AttemptedSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl AttemptedSet {
    /// Returns `false` if `id` was already attempted.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= ATTEMPTED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|x| x != id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One signed-in receiving client. Watches conversations and marks every
/// `delivered` message addressed to it as `sent` the first time it shows
/// up in a snapshot.
pub struct ReceiverSession {
    channel: MessageChannel,
    identity: Identity,
    attempted: Arc<Mutex<AttemptedSet>>,
    watches: HashMap<String, Subscription>,
}

impl ReceiverSession {
    pub fn new(channel: MessageChannel, identity: Identity) -> Self {
        Self {
            channel,
            identity,
            attempted: Arc::new(Mutex::new(AttemptedSet::default())),
            watches: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Start watching a conversation. Watching it twice is a no-op.
    pub fn watch(&mut self, conversation_id: &str) {
        if self.watches.contains_key(conversation_id) {
            return;
        }
        let channel = self.channel.clone();
        let identity = self.identity.clone();
        let attempted = self.attempted.clone();
        let subscription = self.channel.subscribe(conversation_id, move |snapshot| {
            mark_delivered_as_sent(&channel, &identity, &attempted, &snapshot);
        });
        debug!("{} watching {}", self.identity.uid, conversation_id);
        self.watches.insert(conversation_id.to_string(), subscription);
    }

    /// Stop watching. In-flight transition writes still complete.
    pub fn unwatch(&mut self, conversation_id: &str) {
        if self.watches.remove(conversation_id).is_some() {
            debug!("{} stopped watching {}", self.identity.uid, conversation_id);
        }
    }

    pub fn is_watching(&self, conversation_id: &str) -> bool {
        self.watches.contains_key(conversation_id)
    }

    /// Open the conversation on screen: snapshots go to `on_update` and the
    /// latest incoming message is marked `seen`. The conversation is also
    /// watched, so incoming messages are marked `sent` meanwhile.
    pub fn open<F>(&mut self, conversation_id: &str, on_update: F) -> ConversationView
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        self.watch(conversation_id);
        ConversationView::open(&self.channel, self.identity.clone(), conversation_id, on_update)
    }

    pub fn attempted_len(&self) -> usize {
        self.attempted.lock().map(|set| set.len()).unwrap_or_default()
    }
}

fn mark_delivered_as_sent(
    channel: &MessageChannel,
    identity: &Identity,
    attempted: &Arc<Mutex<AttemptedSet>>,
    snapshot: &[Message],
) {
    for message in snapshot {
        if message.status != MessageStatus::Delivered || !message.is_addressed_to(&identity.uid) {
            continue;
        }
        let first_attempt = match attempted.lock() {
            Ok(mut set) => set.insert(&message.id),
            Err(_) => return,
        };
        if !first_attempt {
            continue;
        }

        let channel = channel.clone();
        let identity = identity.clone();
        let attempted = attempted.clone();
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.mark_sent(&conversation_id, &message_id, &identity).await {
                warn!("Failed to mark {} sent: {}", message_id, e);
                // Let the next snapshot try again
                if let Ok(mut set) = attempted.lock() {
                    set.remove(&message_id);
                }
            }
        });
    }
}
