use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use duet_types::models::{MediaKind, Message};

use crate::bridge::{StorageAuth, StorageBridge};
use crate::path::{content_type_for, extension_of, is_absolute_url, normalize_object_path, object_path};
use crate::signer::SignedUrl;
use crate::source::read_local_bytes;
use crate::{MediaBackend, MediaError, SIGNED_URL_TTL};

/// Cached URLs this close to expiry are re-signed instead of handed out.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Client-side media access: uploads local files to object paths and turns
/// object paths into signed URLs, caching them per object path for the
/// session.
pub struct MediaResolver<M, A> {
    backend: M,
    bridge: StorageBridge<A>,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, SignedUrl>>,
    ttl: Duration,
}

impl<M: MediaBackend, A: StorageAuth> MediaResolver<M, A> {
    pub fn new(backend: M, bridge: StorageBridge<A>) -> Self {
        Self {
            backend,
            bridge,
            http: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
            ttl: SIGNED_URL_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Upload the bytes behind `local_ref` and return the object path to
    /// store in the message. Never returns a URL.
    pub async fn upload(
        &self,
        local_ref: &str,
        kind: MediaKind,
        conversation_id: &str,
        uploader_id: &str,
    ) -> Result<String, MediaError> {
        let bytes = read_local_bytes(&self.http, local_ref).await?;
        let ext = extension_of(local_ref);
        let content_type = content_type_for(&ext, kind);
        let path = object_path(conversation_id, uploader_id, kind, &ext)?;

        let principal = self.bridge.principal().await?;
        let size = bytes.len();
        self.backend.put_object(&path, bytes, content_type, principal).await?;

        info!("Uploaded {} ({}, {} bytes)", path, content_type, size);
        Ok(path)
    }

    /// A fetchable URL for a stored `mediaUrl` value. Absolute URLs pass
    /// through untouched; object paths are signed once and then served from
    /// the cache until close to expiry.
    pub async fn resolve(&self, stored: &str) -> Result<String, MediaError> {
        if is_absolute_url(stored) {
            return Ok(stored.to_string());
        }

        if let Some(cached) = self.cache.read().await.get(stored) {
            if cached.is_fresh(Utc::now(), chrono::Duration::seconds(EXPIRY_MARGIN_SECS)) {
                return Ok(cached.url.clone());
            }
        }

        self.sign_and_cache(stored).await
    }

    /// Re-sign after a load failure. `stored` may be a previously resolved
    /// URL; it is reduced back to the bare object path first, so calling
    /// this repeatedly is harmless.
    pub async fn refresh(&self, stored: &str) -> Result<String, MediaError> {
        let path = normalize_object_path(stored);
        debug!("Refreshing signed url for {}", path);
        self.sign_and_cache(&path).await
    }

    /// [`refresh`](Self::refresh) for a cached message record: once signing
    /// succeeds its `media_url` is rewritten to the bare object path in place
    /// and the fresh URL is returned. On failure the record is left as it
    /// was. Text messages yield `None`.
    pub async fn recover(&self, message: &mut Message) -> Result<Option<String>, MediaError> {
        let Some(stored) = message.media_url.as_deref() else {
            return Ok(None);
        };
        let path = normalize_object_path(stored);
        let url = self.sign_and_cache(&path).await?;
        message.media_url = Some(path);
        Ok(Some(url))
    }

    /// Cached URL for an object path, if any.
    pub async fn cached(&self, path: &str) -> Option<String> {
        self.cache.read().await.get(path).map(|s| s.url.clone())
    }

    async fn sign_and_cache(&self, path: &str) -> Result<String, MediaError> {
        let signed = self.backend.sign(path, self.ttl).await?;
        let url = signed.url.clone();
        self.cache.write().await.insert(path.to_string(), signed);
        Ok(url)
    }
}
