use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read local media: {0}")]
    Read(String),

    #[error("local media is empty")]
    Empty,

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage sign-in failed: {0}")]
    Unauthorized(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signed url expired")]
    Expired,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Errors worth retrying later (network, disk) as opposed to bad input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Io(_) | Self::Signing(_))
    }
}
