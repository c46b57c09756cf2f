use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessagePayload;

// -- JWT Claims --

/// Claims of an identity token issued by the external identity provider.
/// `sub` is the user's stable uid; the core never inspects anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub payload: MessagePayload,
    /// Client-assigned creation time; the server fills in `now` if absent.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    /// False when the write was a no-op (already advanced or message gone).
    pub changed: bool,
}

// -- Media --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Object path to store in the message's `mediaUrl`.
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SignRequest {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
