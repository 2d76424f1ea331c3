//! Two-tier bearer credential storage
//!
//! The durable tier is a [`KeyValueStorage`] that survives restarts; the
//! memory tier mirrors the last saved credential so the process keeps working
//! when platform storage misbehaves. Lookups walk the tiers in priority order.

use crate::error::StorageError;
use crate::storage::KeyValueStorage;
use crate::types::Session;
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Durable key for the serialized user object
pub const USER_KEY: &str = "supabase_user";
/// Durable key for the serialized session object
pub const SESSION_KEY: &str = "supabase_session";
/// Durable key for the raw access token
pub const ACCESS_TOKEN_KEY: &str = "supabase_access_token";

/// A place a bearer credential can be read from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// `Ok(None)` means "nothing here"; errors let the caller try the next tier
    async fn credential(&self) -> Result<Option<String>, StorageError>;
}

/// Return the first credential found in `sources`, in order
///
/// A failing source is logged and skipped. `None` means unauthenticated.
pub async fn resolve_credential(sources: &[&dyn CredentialSource]) -> Option<String> {
    for source in sources {
        match source.credential().await {
            Ok(Some(token)) => {
                debug!(source = source.name(), token = %redact(&token), "Resolved credential");
                return Some(token);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(source = source.name(), error = %e, "Credential source failed, trying next tier");
            }
        }
    }
    debug!("No credential available");
    None
}

/// Credential tier backed by durable storage
#[derive(Clone)]
pub struct DurableSource {
    storage: Arc<dyn KeyValueStorage>,
}

impl DurableSource {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CredentialSource for DurableSource {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn credential(&self) -> Result<Option<String>, StorageError> {
        let token = self.storage.get_item(ACCESS_TOKEN_KEY).await?;
        Ok(token.filter(|t| !t.is_empty()))
    }
}

/// Process-local credential tier
#[derive(Clone, Default)]
pub struct MemorySlot {
    token: Arc<RwLock<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl CredentialSource for MemorySlot {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn credential(&self) -> Result<Option<String>, StorageError> {
        Ok(self.get())
    }
}

/// Persisted bearer credential and last-known session
///
/// Cloning is cheap; clones share both tiers.
#[derive(Clone)]
pub struct TokenStore {
    durable: DurableSource,
    memory: MemorySlot,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            durable: DurableSource::new(storage),
            memory: MemorySlot::new(),
        }
    }

    /// Persist `credential` and `session`
    ///
    /// The memory tier is updated first and always succeeds. Durable write
    /// failures are logged and swallowed.
    pub async fn save(&self, credential: &str, session: &Session) {
        self.memory.set(credential);

        let mut entries = Vec::with_capacity(3);
        if let Some(user) = &session.user {
            match serde_json::to_string(user) {
                Ok(json) => entries.push((USER_KEY, json)),
                Err(e) => warn!(error = %e, "Failed to serialize user record"),
            }
        }
        match serde_json::to_string(session) {
            Ok(json) => entries.push((SESSION_KEY, json)),
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }
        entries.push((ACCESS_TOKEN_KEY, credential.to_string()));

        let mut persisted = true;
        for (key, value) in entries {
            if let Err(e) = self.durable.storage.set_item(key, &value).await {
                persisted = false;
                warn!(key, error = %e, "Failed to persist to durable storage, memory copy still active");
            }
        }

        if persisted {
            debug!(token = %redact(credential), "Stored access token in durable storage and memory");
        }
    }

    /// Freshest credential: durable tier first, then memory
    pub async fn load(&self) -> Option<String> {
        resolve_credential(&[&self.durable, &self.memory]).await
    }

    /// Remove the credential, session and user record from both tiers
    ///
    /// All three durable removals are attempted; the first failure is returned.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.memory.clear();

        let mut first_error = None;
        for key in [USER_KEY, SESSION_KEY, ACCESS_TOKEN_KEY] {
            if let Err(e) = self.durable.storage.remove_item(key).await {
                warn!(key, error = %e, "Failed to remove durable key");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Last persisted session, if any. A corrupt blob is treated as absent.
    pub async fn load_session(&self) -> Result<Option<Session>, StorageError> {
        let Some(blob) = self.durable.storage.get_item(SESSION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&blob) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session blob");
                Ok(None)
            }
        }
    }

    /// Copy the durable credential into the memory tier
    ///
    /// Returns the credential now held in memory, which is the previous memory
    /// value when durable storage is empty.
    pub async fn refresh_from_durable(&self) -> Result<Option<String>, StorageError> {
        match self.durable.credential().await? {
            Some(token) => {
                self.memory.set(&token);
                debug!(token = %redact(&token), "Set access token from storage");
                Ok(Some(token))
            }
            None => Ok(self.memory.get()),
        }
    }

    pub fn memory(&self) -> &MemorySlot {
        &self.memory
    }
}

/// Token prefix safe to put in logs
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}
