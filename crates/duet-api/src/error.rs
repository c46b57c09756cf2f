use axum::http::StatusCode;
use thiserror::Error;
use tracing::{error, warn};

use duet_media::MediaError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{uid} is not a participant of {conversation_id}")]
    Authorization { uid: String, conversation_id: String },

    #[error("invalid conversation id: {0}")]
    InvalidConversationId(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store failure: {0}")]
    Transient(#[from] anyhow::Error),
}

impl ChatError {
    pub fn authorization(uid: &str, conversation_id: &str) -> Self {
        Self::Authorization {
            uid: uid.to_string(),
            conversation_id: conversation_id.to_string(),
        }
    }

    /// Network or store failures; the caller may retry with the same input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::InvalidConversationId(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Log `e` and turn it into the response status for a handler.
pub fn reject(e: ChatError) -> StatusCode {
    if e.is_transient() {
        error!("{}", e);
    } else {
        warn!("{}", e);
    }
    e.status()
}

/// Status for object-store failures surfaced through the HTTP layer.
pub fn reject_media(e: MediaError) -> StatusCode {
    let status = match &e {
        MediaError::InvalidPath(_) | MediaError::Empty | MediaError::Read(_) => StatusCode::BAD_REQUEST,
        MediaError::AlreadyExists(_) => StatusCode::CONFLICT,
        MediaError::NotFound(_) => StatusCode::NOT_FOUND,
        MediaError::Unauthorized(_) | MediaError::InvalidSignature | MediaError::Expired => {
            StatusCode::FORBIDDEN
        }
        MediaError::Signing(_) | MediaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Media error: {}", e);
    } else {
        warn!("Media error: {}", e);
    }
    status
}
