//! Storage sign-in. Object-store writes need their own principal, separate
//! from the primary identity, obtained the first time an upload happens.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::MediaError;

/// An authenticated object-store principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrincipal {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct BridgeCredentials {
    pub login: String,
    pub secret: String,
}

/// The object store's own account system.
pub trait StorageAuth: Send + Sync {
    fn sign_in(
        &self,
        creds: &BridgeCredentials,
    ) -> impl Future<Output = Result<StoragePrincipal, MediaError>> + Send;

    fn sign_up(&self, creds: &BridgeCredentials) -> impl Future<Output = Result<(), MediaError>> + Send;
}

/// Lazily provisioned storage session.
///
/// The first call to [`StorageBridge::principal`] signs in, and if that
/// fails signs up and signs in again. The principal is then reused for the
/// bridge's lifetime.
pub struct StorageBridge<A> {
    auth: A,
    creds: BridgeCredentials,
    principal: OnceCell<StoragePrincipal>,
}

impl<A: StorageAuth> StorageBridge<A> {
    pub fn new(auth: A, creds: BridgeCredentials) -> Self {
        Self {
            auth,
            creds,
            principal: OnceCell::new(),
        }
    }

    pub async fn principal(&self) -> Result<&StoragePrincipal, MediaError> {
        self.principal
            .get_or_try_init(|| async {
                match self.auth.sign_in(&self.creds).await {
                    Ok(principal) => Ok::<_, MediaError>(principal),
                    Err(first) => {
                        warn!("Storage sign-in for {} failed ({}), signing up", self.creds.login, first);
                        self.auth.sign_up(&self.creds).await?;
                        let principal = self.auth.sign_in(&self.creds).await?;
                        info!("Provisioned storage principal for {}", self.creds.login);
                        Ok(principal)
                    }
                }
            })
            .await
    }

    pub fn is_provisioned(&self) -> bool {
        self.principal.initialized()
    }
}

/// In-process account table for the bundled object store.
#[derive(Default)]
pub struct LocalAccounts {
    accounts: Mutex<HashMap<String, (String, StoragePrincipal)>>,
}

impl LocalAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, principal: &StoragePrincipal) -> bool {
        self.accounts
            .lock()
            .map(|accounts| accounts.values().any(|(_, p)| p == principal))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, StoragePrincipal)>>, MediaError> {
        self.accounts
            .lock()
            .map_err(|e| MediaError::Unauthorized(format!("account table poisoned: {e}")))
    }
}

impl StorageAuth for LocalAccounts {
    async fn sign_in(&self, creds: &BridgeCredentials) -> Result<StoragePrincipal, MediaError> {
        let accounts = self.lock()?;
        match accounts.get(&creds.login) {
            Some((secret, principal)) if *secret == creds.secret => Ok(principal.clone()),
            Some(_) => Err(MediaError::Unauthorized("wrong secret".into())),
            None => Err(MediaError::Unauthorized(format!("unknown login {}", creds.login))),
        }
    }

    async fn sign_up(&self, creds: &BridgeCredentials) -> Result<(), MediaError> {
        let mut accounts = self.lock()?;
        if accounts.contains_key(&creds.login) {
            return Err(MediaError::Unauthorized(format!("login {} taken", creds.login)));
        }
        let principal = StoragePrincipal {
            id: uuid::Uuid::new_v4().to_string(),
        };
        accounts.insert(creds.login.clone(), (creds.secret.clone(), principal));
        Ok(())
    }
}

impl<A: StorageAuth> StorageAuth for std::sync::Arc<A> {
    fn sign_in(
        &self,
        creds: &BridgeCredentials,
    ) -> impl Future<Output = Result<StoragePrincipal, MediaError>> + Send {
        (**self).sign_in(creds)
    }

    fn sign_up(&self, creds: &BridgeCredentials) -> impl Future<Output = Result<(), MediaError>> + Send {
        (**self).sign_up(creds)
    }
}
