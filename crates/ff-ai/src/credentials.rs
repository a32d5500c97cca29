//! Provider API key storage
//!
//! Provides:
//! - An [`ApiKeyStore`] abstraction over the OS keychain (and memory, for tests)
//! - A [`CredentialStore`] cache loaded once at startup, with optional
//!   `*_API_KEY` environment fallback

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use ff_protocol::ProviderId;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Persistent backend behind the credential cache
///
/// Implementations hold at most one key per provider.
pub trait ApiKeyStore: Send + Sync {
    /// Key stored for `provider`, `None` when there is nothing stored
    fn read(&self, provider: ProviderId) -> Result<Option<SecretString>, KeyStoreError>;

    /// Replace whatever is stored for `provider`
    fn write(&self, provider: ProviderId, key: &SecretString) -> Result<(), KeyStoreError>;

    /// Forget the key for `provider`; `Ok(false)` if there was none
    fn erase(&self, provider: ProviderId) -> Result<bool, KeyStoreError>;
}

/// Key backend failure
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No usable secret service on this machine
    #[error("OS keychain unavailable: {0}")]
    Unavailable(String),

    /// The keychain rejected an operation for one provider
    #[error("keychain access for {provider} failed: {message}")]
    Access {
        /// Provider whose entry was touched
        provider: ProviderId,
        /// Backend message
        message: String,
    },
}

/// Keys held in the OS keychain, one entry per provider
///
/// Entries live under the configured service name with account
/// `api_key:<provider>`.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service: String,
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::with_service(crate::config::DEFAULT_KEYRING_SERVICE)
    }
}

impl KeychainStore {
    /// Keychain store under a custom service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, provider: ProviderId) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, &format!("api_key:{provider}"))
            .map_err(|e| classify(provider, e))
    }
}

fn classify(provider: ProviderId, err: keyring::Error) -> KeyStoreError {
    match err {
        keyring::Error::PlatformFailure(e) | keyring::Error::NoStorageAccess(e) => {
            KeyStoreError::Unavailable(e.to_string())
        }
        other => KeyStoreError::Access {
            provider,
            message: other.to_string(),
        },
    }
}

impl ApiKeyStore for KeychainStore {
    #[instrument(skip(self), fields(service = %self.service))]
    fn read(&self, provider: ProviderId) -> Result<Option<SecretString>, KeyStoreError> {
        match self.entry(provider)?.get_password() {
            Ok(key) => Ok(Some(SecretString::from(key))),
            Err(keyring::Error::NoEntry) => {
                debug!("no keychain entry");
                Ok(None)
            }
            Err(e) => Err(classify(provider, e)),
        }
    }

    #[instrument(skip(self, key), fields(service = %self.service))]
    fn write(&self, provider: ProviderId, key: &SecretString) -> Result<(), KeyStoreError> {
        self.entry(provider)?
            .set_password(key.expose_secret())
            .map_err(|e| classify(provider, e))?;
        info!("Provider key written to keychain");
        Ok(())
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn erase(&self, provider: ProviderId) -> Result<bool, KeyStoreError> {
        match self.entry(provider)?.delete_credential() {
            Ok(()) => {
                info!("Provider key erased from keychain");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(classify(provider, e)),
        }
    }
}

/// Process-local key backend; clones share the same keys
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    keys: Arc<RwLock<BTreeMap<ProviderId, SecretString>>>,
}

impl MemoryKeyStore {
    /// Backend seeded with `(provider, key)` pairs
    pub fn with_keys<'a>(keys: impl IntoIterator<Item = (ProviderId, &'a str)>) -> Self {
        let map = keys
            .into_iter()
            .map(|(p, k)| (p, SecretString::from(k)))
            .collect();
        Self {
            keys: Arc::new(RwLock::new(map)),
        }
    }
}

impl ApiKeyStore for MemoryKeyStore {
    fn read(&self, provider: ProviderId) -> Result<Option<SecretString>, KeyStoreError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.get(&provider).cloned())
    }

    fn write(&self, provider: ProviderId, key: &SecretString) -> Result<(), KeyStoreError> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(provider, key.clone());
        Ok(())
    }

    fn erase(&self, provider: ProviderId) -> Result<bool, KeyStoreError> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.remove(&provider).is_some())
    }
}

/// Environment variable consulted for a provider when fallback is enabled
pub fn env_var_for(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAI => "OPENAI_API_KEY",
        ProviderId::Anthropic => "ANTHROPIC_API_KEY",
        ProviderId::Google => "GOOGLE_API_KEY",
    }
}

/// Where a cached key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Persistent backend (keychain)
    Stored,
    /// Process environment, never written back
    Environment,
}

#[derive(Clone)]
struct CachedKey {
    secret: SecretString,
    source: KeySource,
}

/// Cached view of all provider credentials
///
/// Keys are read from the backend once in [`CredentialStore::load`]; after that
/// the store only touches the backend on explicit set or remove.
pub struct CredentialStore<K: ApiKeyStore> {
    backend: K,
    cache: RwLock<BTreeMap<ProviderId, CachedKey>>,
}

impl<K: ApiKeyStore> std::fmt::Debug for CredentialStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("configured", &self.configured_providers())
            .finish_non_exhaustive()
    }
}

impl<K: ApiKeyStore> CredentialStore<K> {
    /// Load every known provider's key from the backend
    ///
    /// Backend read failures are logged and the provider is treated as
    /// unconfigured.
    pub fn load(backend: K, env_fallback: bool) -> Self {
        Self::load_with_env(backend, env_fallback, |name| std::env::var(name).ok())
    }

    /// Like [`CredentialStore::load`] with an explicit environment lookup
    pub fn load_with_env<F>(backend: K, env_fallback: bool, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cache = BTreeMap::new();
        for provider in ProviderId::ALL {
            let stored = match backend.read(provider) {
                Ok(key) => key.filter(|k| !k.expose_secret().is_empty()),
                Err(e) => {
                    warn!(%provider, error = %e, "Failed to read API key, treating provider as unconfigured");
                    None
                }
            };
            let entry = match stored {
                Some(secret) => Some(CachedKey {
                    secret,
                    source: KeySource::Stored,
                }),
                None if env_fallback => env(env_var_for(provider))
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| CachedKey {
                        secret: SecretString::new(v.into_boxed_str()),
                        source: KeySource::Environment,
                    }),
                None => None,
            };
            if let Some(entry) = entry {
                debug!(%provider, source = ?entry.source, "Loaded API key");
                cache.insert(provider, entry);
            }
        }
        info!(count = cache.len(), "Credential store initialized");
        Self {
            backend,
            cache: RwLock::new(cache),
        }
    }

    /// Cached key for `provider`, whether it came from the keychain or the environment
    pub fn get_api_key(&self, provider: ProviderId) -> Option<SecretString> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&provider).map(|c| c.secret.clone()))
    }

    /// Where the provider's key came from
    pub fn key_source(&self, provider: ProviderId) -> Option<KeySource> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&provider).map(|c| c.source))
    }

    /// Whether a provider has a non-empty key
    pub fn is_configured(&self, provider: ProviderId) -> bool {
        self.get_api_key(provider).is_some()
    }

    /// Providers with a key, in [`ProviderId::ALL`] order
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| self.is_configured(*p))
            .collect()
    }

    /// Store or overwrite a provider key
    ///
    /// The key is opaque; no format checks are made. An empty key behaves like
    /// [`CredentialStore::remove_api_key`].
    #[instrument(skip(self, api_key))]
    pub fn set_api_key(&self, provider: ProviderId, api_key: &str) -> Result<(), KeyStoreError> {
        if api_key.is_empty() {
            return self.remove_api_key(provider);
        }
        let secret = SecretString::from(api_key);
        self.backend.write(provider, &secret)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                provider,
                CachedKey {
                    secret,
                    source: KeySource::Stored,
                },
            );
        Ok(())
    }

    /// Remove a provider key from the cache and the backend
    #[instrument(skip(self))]
    pub fn remove_api_key(&self, provider: ProviderId) -> Result<(), KeyStoreError> {
        let erased = self.backend.erase(provider)?;
        let cached = self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&provider);
        debug!(erased, was_cached = cached.is_some(), "Provider key removed");
        Ok(())
    }
}
