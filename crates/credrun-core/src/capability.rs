//! Credential lookup capability.
//!
//! The resolver depends on an injected [`CredentialLookup`] rather than
//! talking to the OS keyring directly. The implementation is chosen once at
//! process startup and never swapped mid-run:
//!
//! - [`KeyringCredentials`] — the real OS-backed store.
//! - [`DisabledCredentials`] — always reports the store as unavailable;
//!   selected with `--no-keyring` or on targets without a usable store.
//! - [`MemoryCredentials`] — an in-memory map for tests and embedding.
//!
//! A lookup distinguishes "the store works but holds no such secret"
//! (`Ok(None)`) from "the store itself failed" (`Err`). The resolver maps
//! these to different user-facing errors.

use secrecy::SecretString;
use thiserror::Error;

/// Failure of the credential store itself, as opposed to a missing secret.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The credential store could not be reached or refused the operation.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Looks up secrets by `(service, account)` pair.
///
/// Implementations must be cheap to call repeatedly; the resolver treats
/// every call as independent and makes no caching assumptions.
pub trait CredentialLookup: Send + Sync {
    /// Look up the secret stored for `service`/`account`.
    ///
    /// Returns `Ok(None)` when the store is healthy but holds no matching
    /// secret.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Unavailable`] when the store itself cannot
    /// be reached.
    fn lookup(&self, service: &str, account: &str) -> Result<Option<SecretString>, CapabilityError>;
}

/// OS keyring backed credential lookup.
#[derive(Debug, Default)]
pub struct KeyringCredentials {
    _private: (),
}

impl KeyringCredentials {
    /// Create a new OS keyring lookup.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl CredentialLookup for KeyringCredentials {
    fn lookup(&self, service: &str, account: &str) -> Result<Option<SecretString>, CapabilityError> {
        let entry = keyring::Entry::new(service, account)
            .map_err(|e| CapabilityError::Unavailable(e.to_string()))?;

        match entry.get_password() {
            Ok(secret) => Ok(Some(SecretString::from(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CapabilityError::Unavailable(e.to_string())),
        }
    }
}

/// Stub lookup that always reports the store as unavailable.
///
/// Keeps the resolver free of conditional loading: callers that cannot or
/// do not want to use the OS store inject this instead.
#[derive(Debug, Default)]
pub struct DisabledCredentials {
    _private: (),
}

impl DisabledCredentials {
    /// Create a new disabled lookup.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl CredentialLookup for DisabledCredentials {
    fn lookup(
        &self,
        _service: &str,
        _account: &str,
    ) -> Result<Option<SecretString>, CapabilityError> {
        Err(CapabilityError::Unavailable(
            "credential store disabled".to_string(),
        ))
    }
}

/// In-memory credential map for tests and embedding contexts.
///
/// Records how many lookups were performed so tests can assert that
/// malformed references never reach the store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    secrets: std::collections::HashMap<(String, String), String>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MemoryCredentials {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret for `service`/`account`.
    #[must_use]
    pub fn with_secret(
        mut self,
        service: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.secrets
            .insert((service.into(), account.into()), secret.into());
        self
    }

    /// Number of lookups performed against this store.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl CredentialLookup for MemoryCredentials {
    fn lookup(&self, service: &str, account: &str) -> Result<Option<SecretString>, CapabilityError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self
            .secrets
            .get(&(service.to_string(), account.to_string()))
            .map(|s| SecretString::from(s.clone())))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn disabled_store_is_unavailable() {
        let store = DisabledCredentials::new();
        let err = store.lookup("svc", "acct").unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn memory_store_hit_and_miss() {
        let store = MemoryCredentials::new().with_secret("svc", "acct", "s3cret");

        let hit = store.lookup("svc", "acct").unwrap();
        assert_eq!(hit.unwrap().expose_secret(), "s3cret");

        let miss = store.lookup("svc", "other").unwrap();
        assert!(miss.is_none());

        assert_eq!(store.calls(), 2);
    }
}
