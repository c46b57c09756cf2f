//! Database row types. These map directly to SQLite rows and are converted
//! into `duet-types` models at the edge of the crate.

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};

use duet_types::models::{Conversation, Message, MessageKind, MessageStatus};

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: String,
    pub last_message: String,
    pub last_message_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub kind: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub status: String,
    pub created_at: String,
    pub delivered_at: Option<String>,
    pub sent_at: Option<String>,
    pub seen_at: Option<String>,
}

/// RFC 3339 with fixed microsecond precision, so text order is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

impl ConversationRow {
    pub fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            created_at: parse_ts(&self.created_at)?,
            last_message_at: parse_ts(&self.last_message_at)?,
            id: self.id,
            participants: [self.participant_a, self.participant_b],
            last_message: self.last_message,
        })
    }
}

impl MessageRow {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
            receiver_id: msg.receiver_id.clone(),
            kind: msg.kind.as_str().to_string(),
            content: msg.content.clone(),
            media_url: msg.media_url.clone(),
            status: msg.status.as_str().to_string(),
            created_at: format_ts(msg.created_at),
            delivered_at: msg.delivered_at.map(format_ts),
            sent_at: msg.sent_at.map(format_ts),
            seen_at: msg.seen_at.map(format_ts),
        }
    }

    pub fn into_message(self) -> Result<Message> {
        let kind = MessageKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("Corrupt kind '{}' on message '{}'", self.kind, self.id))?;
        let status = MessageStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Corrupt status '{}' on message '{}'", self.status, self.id))?;

        Ok(Message {
            kind,
            status,
            created_at: parse_ts(&self.created_at)?,
            delivered_at: parse_opt_ts(self.delivered_at.as_deref())?,
            sent_at: parse_opt_ts(self.sent_at.as_deref())?,
            seen_at: parse_opt_ts(self.seen_at.as_deref())?,
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            media_url: self.media_url,
        })
    }
}
