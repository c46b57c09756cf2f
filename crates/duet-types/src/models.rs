use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The caller of a core operation, as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// A two-party conversation. `id` is derived from the participant pair,
/// see [`crate::identity::build_conversation_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Kinds of media that can be attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    File,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn message_kind(&self) -> MessageKind {
        match self {
            Self::Image => MessageKind::Image,
            Self::Video => MessageKind::Video,
            Self::File => MessageKind::File,
        }
    }
}

/// Delivery status of a message.
///
/// The only legal progression is `Delivered -> Sent -> Seen`, with the
/// `Delivered -> Seen` shortcut when the view event wins the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Delivered,
    Sent,
    Seen,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Sent => "sent",
            Self::Seen => "seen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(Self::Delivered),
            "sent" => Some(Self::Sent),
            "seen" => Some(Self::Seen),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next > *self
    }
}

/// What a sender submits: either text or a reference to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePayload {
    Text { content: String },
    Media { kind: MediaKind, path: String },
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn media(kind: MediaKind, path: impl Into<String>) -> Self {
        Self::Media {
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Media { kind, .. } => kind.message_kind(),
        }
    }

    /// Text stored in the conversation's `lastMessage` preview.
    pub fn preview(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Media { kind, .. } => match kind {
                MediaKind::Image => "[Image]".to_string(),
                MediaKind::Video => "[Video]".to_string(),
                MediaKind::File => "[File]".to_string(),
            },
        }
    }
}

/// A persisted message. `content` is set only for text, `media_url` only for
/// media, and holds the object path rather than a fetchable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a freshly delivered message from a payload.
    pub fn new_delivered(
        id: String,
        conversation_id: &str,
        sender_id: &str,
        receiver_id: &str,
        payload: &MessagePayload,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let (content, media_url) = match payload {
            MessagePayload::Text { content } => (Some(content.clone()), None),
            MessagePayload::Media { path, .. } => (None, Some(path.clone())),
        };
        Self {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            kind: payload.kind(),
            content,
            media_url,
            status: MessageStatus::Delivered,
            created_at,
            delivered_at: Some(now),
            sent_at: None,
            seen_at: None,
        }
    }

    pub fn is_addressed_to(&self, uid: &str) -> bool {
        self.receiver_id == uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        use MessageStatus::*;
        assert!(Delivered.can_advance_to(Sent));
        assert!(Delivered.can_advance_to(Seen));
        assert!(Sent.can_advance_to(Seen));
        assert!(!Sent.can_advance_to(Delivered));
        assert!(!Seen.can_advance_to(Sent));
        assert!(!Seen.can_advance_to(Seen));
    }

    #[test]
    fn test_media_message_has_no_content() {
        let now = Utc::now();
        let payload = MessagePayload::media(MediaKind::Video, "u1__u2/u1/videos/1-a.mp4");
        let msg = Message::new_delivered("m1".into(), "u1__u2", "u1", "u2", &payload, now, now);
        assert_eq!(msg.kind, MessageKind::Video);
        assert_eq!(msg.content, None);
        assert_eq!(msg.media_url.as_deref(), Some("u1__u2/u1/videos/1-a.mp4"));
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert!(msg.sent_at.is_none() && msg.seen_at.is_none());
        assert_eq!(payload.preview(), "[Video]");
    }

    #[test]
    fn test_wire_format() {
        let now = Utc::now();
        let msg = Message::new_delivered(
            "m1".into(),
            "u1__u2",
            "u1",
            "u2",
            &MessagePayload::text("hi"),
            now,
            now,
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["receiverId"], "u2");
        assert!(json["mediaUrl"].is_null());
    }
}
