use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::bridge::{LocalAccounts, StoragePrincipal};
use crate::signer::{HmacSigner, SignedUrl};
use crate::storage::ObjectStorage;
use crate::{MediaBackend, MediaError};

/// The bundled object store: disk storage, HMAC-signed reads, and the
/// in-process account table guarding writes.
#[derive(Clone)]
pub struct LocalMedia {
    storage: Arc<ObjectStorage>,
    signer: HmacSigner,
    accounts: Arc<LocalAccounts>,
}

impl LocalMedia {
    pub fn new(storage: Arc<ObjectStorage>, signer: HmacSigner, accounts: Arc<LocalAccounts>) -> Self {
        Self {
            storage,
            signer,
            accounts,
        }
    }

    pub fn storage(&self) -> &Arc<ObjectStorage> {
        &self.storage
    }
}

impl MediaBackend for LocalMedia {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        principal: &StoragePrincipal,
    ) -> Result<(), MediaError> {
        if !self.accounts.is_known(principal) {
            return Err(MediaError::Unauthorized(format!("unknown principal {}", principal.id)));
        }
        let size = self.storage.put(path, &bytes).await?;
        debug!("Principal {} wrote {} ({}, {} bytes)", principal.id, path, content_type, size);
        Ok(())
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<SignedUrl, MediaError> {
        let ttl = chrono::Duration::seconds(ttl.as_secs() as i64);
        self.signer.sign_until(path, Utc::now() + ttl)
    }
}
