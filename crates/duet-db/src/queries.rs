use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use duet_types::models::Message;

use crate::Database;
use crate::models::{ConversationRow, MessageRow, format_ts};

const CONVERSATION_COLUMNS: &str =
    "id, participant_a, participant_b, created_at, last_message, last_message_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, kind, content, \
     media_url, status, created_at, delivered_at, sent_at, seen_at";

impl Database {
    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Atomic conditional create. Returns `true` if this call created the
    /// row, `false` if a conversation with `id` already existed.
    pub fn create_conversation_if_absent(
        &self,
        id: &str,
        participants: (&str, &str),
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_ts(now);
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversations
                    (id, participant_a, participant_b, created_at, last_message, last_message_at)
                 VALUES (?1, ?2, ?3, ?4, '', ?4)",
                rusqlite::params![id, participants.0, participants.1, now],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Overwrite the preview fields. Last writer wins.
    pub fn touch_conversation(&self, id: &str, preview: &str, now: DateTime<Utc>) -> Result<bool> {
        let now = format_ts(now);
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE conversations SET last_message = ?2, last_message_at = ?3 WHERE id = ?1",
                rusqlite::params![id, preview, now],
            )?;
            Ok(updated == 1)
        })
    }

    /// All conversations `uid` takes part in, most recently active first.
    pub fn conversations_for_user(&self, uid: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE participant_a = ?1 OR participant_b = ?1
                 ORDER BY last_message_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([uid], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &Message) -> Result<()> {
        let row = MessageRow::from_message(msg);
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, conversation_id, sender_id, receiver_id, kind, content, media_url,
                     status, created_at, delivered_at, sent_at, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    row.id,
                    row.conversation_id,
                    row.sender_id,
                    row.receiver_id,
                    row.kind,
                    row.content,
                    row.media_url,
                    row.status,
                    row.created_at,
                    row.delivered_at,
                    row.sent_at,
                    row.seen_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, conversation_id: &str, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 AND id = ?2"
            );
            let row = conn
                .query_row(&sql, [conversation_id, id], message_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Every message of a conversation, ascending by `created_at`.
    /// Equal timestamps fall back to insertion order.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// delivered -> sent. Returns `false` if the message is not (or no
    /// longer) in `delivered`.
    pub fn mark_message_sent(
        &self,
        conversation_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_ts(now);
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET status = 'sent', sent_at = ?3
                 WHERE conversation_id = ?1 AND id = ?2 AND status = 'delivered'",
                rusqlite::params![conversation_id, id, now],
            )?;
            Ok(updated == 1)
        })
    }

    /// delivered|sent -> seen. Returns `false` if already seen or missing.
    pub fn mark_message_seen(
        &self,
        conversation_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_ts(now);
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET status = 'seen', seen_at = ?3
                 WHERE conversation_id = ?1 AND id = ?2 AND status IN ('delivered', 'sent')",
                rusqlite::params![conversation_id, id, now],
            )?;
            Ok(updated == 1)
        })
    }
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
    let row = conn.query_row(&sql, [id], conversation_from_row).optional()?;
    Ok(row)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: row.get(3)?,
        last_message: row.get(4)?,
        last_message_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        kind: row.get(4)?,
        content: row.get(5)?,
        media_url: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        delivered_at: row.get(9)?,
        sent_at: row.get(10)?,
        seen_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use duet_types::models::{MessagePayload, MessageStatus};

    fn message(conversation_id: &str, created_at: DateTime<Utc>, text: &str) -> Message {
        Message::new_delivered(
            uuid::Uuid::new_v4().to_string(),
            conversation_id,
            "u1",
            "u2",
            &MessagePayload::text(text),
            created_at,
            created_at,
        )
    }

    #[test]
    fn test_conditional_create() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(db.create_conversation_if_absent("u1__u2", ("u1", "u2"), now).unwrap());
        assert!(!db.create_conversation_if_absent("u1__u2", ("u1", "u2"), now).unwrap());

        let convo = db.get_conversation("u1__u2").unwrap().unwrap().into_conversation().unwrap();
        assert_eq!(convo.participants, ["u1".to_string(), "u2".to_string()]);
        assert_eq!(convo.last_message, "");
    }

    #[test]
    fn test_message_requires_conversation() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_message(&message("u1__u2", Utc::now(), "hi")).is_err());
    }

    #[test]
    fn test_messages_sorted_by_created_at() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();
        db.create_conversation_if_absent("u1__u2", ("u1", "u2"), t0).unwrap();
        db.insert_message(&message("u1__u2", t0 + Duration::seconds(5), "third")).unwrap();
        db.insert_message(&message("u1__u2", t0, "first")).unwrap();
        db.insert_message(&message("u1__u2", t0 + Duration::seconds(1), "second")).unwrap();

        let texts: Vec<String> = db
            .get_messages("u1__u2")
            .unwrap()
            .into_iter()
            .map(|r| r.content.unwrap())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_guarded_transitions() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();
        db.create_conversation_if_absent("u1__u2", ("u1", "u2"), t0).unwrap();
        let msg = message("u1__u2", t0, "hi");
        db.insert_message(&msg).unwrap();

        let t1 = t0 + Duration::seconds(1);
        assert!(db.mark_message_sent("u1__u2", &msg.id, t1).unwrap());
        assert!(!db.mark_message_sent("u1__u2", &msg.id, t1 + Duration::seconds(1)).unwrap());

        let t2 = t0 + Duration::seconds(2);
        assert!(db.mark_message_seen("u1__u2", &msg.id, t2).unwrap());
        assert!(!db.mark_message_seen("u1__u2", &msg.id, t2).unwrap());
        assert!(!db.mark_message_sent("u1__u2", &msg.id, t2).unwrap());

        let stored = db.get_message("u1__u2", &msg.id).unwrap().unwrap().into_message().unwrap();
        assert_eq!(stored.status, MessageStatus::Seen);
        assert_eq!(stored.sent_at.map(format_ts), Some(format_ts(t1)));
        assert_eq!(stored.seen_at.map(format_ts), Some(format_ts(t2)));
        assert_eq!(stored.delivered_at.map(format_ts), Some(format_ts(t0)));
    }

    #[test]
    fn test_transition_on_missing_message_is_noop() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.mark_message_sent("u1__u2", "nope", Utc::now()).unwrap());
        assert!(!db.mark_message_seen("u1__u2", "nope", Utc::now()).unwrap());
    }

    #[test]
    fn test_conversations_for_user() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();
        db.create_conversation_if_absent("u1__u2", ("u1", "u2"), t0).unwrap();
        db.create_conversation_if_absent("u1__u3", ("u1", "u3"), t0).unwrap();
        db.create_conversation_if_absent("u2__u3", ("u2", "u3"), t0).unwrap();
        db.touch_conversation("u1__u3", "latest", t0 + Duration::seconds(1)).unwrap();

        let ids: Vec<String> = db
            .conversations_for_user("u1")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["u1__u3", "u1__u2"]);
    }
}
