pub mod bridge;
pub mod error;
pub mod local;
pub mod path;
pub mod resolver;
pub mod signer;
pub mod source;
pub mod storage;

pub use error::MediaError;

use std::future::Future;
use std::time::Duration;

use bridge::StoragePrincipal;
use signer::SignedUrl;

/// Lifetime of a signed media URL.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// The object store as seen by a client: authenticated writes, and reads
/// only through short-lived signed URLs.
pub trait MediaBackend: Send + Sync {
    /// Store `bytes` at `path`. Fails if the path is already taken.
    fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        principal: &StoragePrincipal,
    ) -> impl Future<Output = Result<(), MediaError>> + Send;

    /// Ask for a URL granting read access to `path` for `ttl`.
    fn sign(&self, path: &str, ttl: Duration) -> impl Future<Output = Result<SignedUrl, MediaError>> + Send;
}
