use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use duet_db::Database;
use duet_types::models::Message;

use crate::dispatcher::Dispatcher;

/// Read the full message set of a conversation, ascending by `created_at`.
/// Rows that fail to decode are logged and skipped.
pub async fn load_messages(db: &Arc<Database>, conversation_id: &str) -> anyhow::Result<Vec<Message>> {
    let db = db.clone();
    let cid = conversation_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.get_messages(&cid)).await??;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            row.into_message()
                .map_err(|e| warn!("Skipping corrupt message '{}': {}", id, e))
                .ok()
        })
        .collect())
}

/// Ordered live query over a conversation's messages.
#[derive(Clone)]
pub struct LiveQuery {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl LiveQuery {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Invoke `on_update` with the full ordered message set now, and again
    /// after every change to the conversation.
    ///
    /// Store errors are logged and the loop keeps waiting for the next
    /// change. Dropping or unsubscribing the returned handle stops all
    /// further callbacks.
    pub fn subscribe<F>(&self, conversation_id: impl Into<String>, mut on_update: F) -> Subscription
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        let conversation_id = conversation_id.into();
        let active = Arc::new(AtomicBool::new(true));

        // Subscribe before the first read so no change slips in between.
        let mut changes = self.dispatcher.subscribe();
        let db = self.db.clone();
        let cid = conversation_id.clone();
        let task_active = active.clone();

        let handle = tokio::spawn(async move {
            loop {
                match load_messages(&db, &cid).await {
                    Ok(messages) => {
                        if !task_active.load(Ordering::Acquire) {
                            break;
                        }
                        on_update(messages);
                    }
                    Err(e) => warn!("Live query on {} failed to read: {}", cid, e),
                }

                // Wait for the next change to this conversation
                loop {
                    match changes.recv().await {
                        Ok(change) if change.conversation_id == cid => break,
                        Ok(_) => continue,
                        // Missed notifications; a fresh full read covers them
                        Err(RecvError::Lagged(n)) => {
                            debug!("Live query on {} lagged by {} notifications", cid, n);
                            break;
                        }
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        });

        Subscription {
            conversation_id,
            active,
            handle,
        }
    }
}

/// Handle for a live query. Dropping it unsubscribes.
pub struct Subscription {
    conversation_id: String,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.handle.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use duet_types::models::MessagePayload;
    use tokio::sync::mpsc;

    fn seed(db: &Database, n: i64) {
        let t0 = Utc::now();
        db.create_conversation_if_absent("u1__u2", ("u1", "u2"), t0).unwrap();
        // Insert newest first to prove ordering comes from created_at
        for i in (0..n).rev() {
            let msg = Message::new_delivered(
                uuid::Uuid::new_v4().to_string(),
                "u1__u2",
                "u1",
                "u2",
                &MessagePayload::text(format!("m{i}")),
                t0 + Duration::seconds(i),
                t0,
            );
            db.insert_message(&msg).unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_emission_is_full_ordered_set() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, 3);
        let live = LiveQuery::new(db, Dispatcher::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = live.subscribe("u1__u2", move |msgs| {
            let _ = tx.send(msgs);
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(first[0].content.as_deref(), Some("m0"));
    }

    #[tokio::test]
    async fn test_change_emits_full_snapshot() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, 2);
        let dispatcher = Dispatcher::new();
        let live = LiveQuery::new(db.clone(), dispatcher.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = live.subscribe("u1__u2", move |msgs| {
            let _ = tx.send(msgs);
        });
        assert_eq!(rx.recv().await.unwrap().len(), 2);

        // Changes to other conversations are ignored
        dispatcher.notify("u3__u4");
        let now = Utc::now() + Duration::days(1);
        let msg = Message::new_delivered(
            "late".into(),
            "u1__u2",
            "u2",
            "u1",
            &MessagePayload::text("reply"),
            now,
            now,
        );
        db.insert_message(&msg).unwrap();
        dispatcher.notify("u1__u2");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second.last().unwrap().id, "late");
    }

    #[tokio::test]
    async fn test_no_callbacks_after_unsubscribe() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, 1);
        let dispatcher = Dispatcher::new();
        let live = LiveQuery::new(db, dispatcher.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = live.subscribe("u1__u2", move |msgs| {
            let _ = tx.send(msgs);
        });
        rx.recv().await.unwrap();

        sub.unsubscribe();
        dispatcher.notify("u1__u2");

        let next = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(next, Err(_) | Ok(None)));
    }
}
