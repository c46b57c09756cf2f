use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, warn};

use duet_db::Database;
use duet_types::models::Conversation;

use crate::error::ChatError;

/// Bound on discovery-style reads such as the inbox listing.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ChatError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    let result = tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
    Ok(result?)
}

/// Conversation documents: existence check, first-contact creation and the
/// denormalized last-message preview.
#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Database>,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Point read. A missing conversation is `None`, not an error.
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, ChatError> {
        let cid = id.to_string();
        let row = run_blocking(&self.db, move |db| db.get_conversation(&cid)).await?;
        Ok(row.map(|r| r.into_conversation()).transpose()?)
    }

    /// Create the conversation if it does not exist yet. Returns whether
    /// this call created it; `false` means it was already there (possibly
    /// created a moment ago by the other participant).
    pub async fn ensure(&self, id: &str, participants: (&str, &str)) -> Result<bool, ChatError> {
        let cid = id.to_string();
        let (a, b) = (participants.0.to_string(), participants.1.to_string());
        let now = now();
        let created = run_blocking(&self.db, move |db| {
            db.create_conversation_if_absent(&cid, (&a, &b), now)
        })
        .await?;
        if created {
            debug!("Created conversation {}", id);
        }
        Ok(created)
    }

    /// Overwrite the preview after a send. Last writer wins.
    pub async fn touch(&self, id: &str, preview: &str, at: DateTime<Utc>) -> Result<(), ChatError> {
        let cid = id.to_string();
        let preview = preview.to_string();
        let updated = run_blocking(&self.db, move |db| db.touch_conversation(&cid, &preview, at)).await?;
        if !updated {
            return Err(ChatError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    /// Inbox for `uid`, most recent first. Bounded by [`DISCOVERY_TIMEOUT`];
    /// on timeout or failure this degrades to an empty list.
    pub async fn list_for(&self, uid: &str) -> Vec<Conversation> {
        let owner = uid.to_string();
        let read = run_blocking(&self.db, move |db| db.conversations_for_user(&owner));

        let rows = match tokio::time::timeout(DISCOVERY_TIMEOUT, read).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!("Inbox read for {} failed: {}", uid, e);
                return Vec::new();
            }
            Err(_) => {
                warn!("Inbox read for {} timed out after {:?}", uid, DISCOVERY_TIMEOUT);
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                row.into_conversation()
                    .map_err(|e| warn!("Skipping corrupt conversation '{}': {}", id, e))
                    .ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = store();
        assert!(store.get("u1__u2").await.unwrap().is_none());
        assert!(store.ensure("u1__u2", ("u1", "u2")).await.unwrap());
        assert!(!store.ensure("u1__u2", ("u1", "u2")).await.unwrap());

        let convo = store.get("u1__u2").await.unwrap().unwrap();
        assert_eq!(convo.participants, ["u1".to_string(), "u2".to_string()]);
        assert_eq!(convo.last_message, "");
        assert_eq!(convo.created_at, convo.last_message_at);
    }

    #[tokio::test]
    async fn test_touch_overwrites_preview() {
        let store = store();
        store.ensure("u1__u2", ("u1", "u2")).await.unwrap();
        let later = now() + chrono::Duration::seconds(3);
        store.touch("u1__u2", "hello", later).await.unwrap();
        store.touch("u1__u2", "[Image]", later).await.unwrap();

        let convo = store.get("u1__u2").await.unwrap().unwrap();
        assert_eq!(convo.last_message, "[Image]");
        assert_eq!(convo.last_message_at, later);
    }

    #[tokio::test]
    async fn test_touch_missing_is_not_found() {
        let store = store();
        assert!(matches!(
            store.touch("u8__u9", "hi", now()).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_for_only_own_conversations() {
        let store = store();
        store.ensure("u1__u2", ("u1", "u2")).await.unwrap();
        store.ensure("u2__u3", ("u2", "u3")).await.unwrap();

        let inbox = store.list_for("u1").await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "u1__u2");
        assert!(store.list_for("nobody").await.is_empty());
    }
}
