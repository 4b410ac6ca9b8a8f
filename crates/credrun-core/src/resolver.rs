//! Placeholder resolution.
//!
//! Turns raw instruction values (`env:NAME`, `file:PATH`,
//! `keyring:SERVICE:ACCOUNT`, or literals) into concrete secret values via
//! the inherited environment snapshot, the filesystem, and an injected
//! [`CredentialLookup`].
//!
//! # Aggregate semantics
//!
//! [`Resolver::resolve_all`] resolves every instruction as an independent
//! concurrent unit with no ordering between keys. The aggregate succeeds
//! only if every unit succeeds. On the first observed failure the sibling
//! units are cancelled and awaited before the error is returned, so no
//! resolution I/O continues once the resolve phase has failed. The failing
//! unit's error is annotated with the variable name and the raw placeholder
//! it was resolving.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::capability::{CapabilityError, CredentialLookup};
use super::env::{EnvSnapshot, ResolvedEnv};
use super::reference::Reference;

/// Failure to resolve a single reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed placeholder syntax: empty name or path, wrong keyring
    /// field count.
    #[error("invalid reference: {reason}")]
    InvalidReference {
        /// What made the reference malformed.
        reason: String,
    },

    /// `env:` variable absent from the inherited environment. Never treated
    /// as an empty string.
    #[error("environment variable `{name}` is not set")]
    Unset {
        /// The variable that was looked up.
        name: String,
    },

    /// `file:` path does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// The path as written in the reference.
        path: String,
    },

    /// `file:` path exists but could not be read.
    #[error("failed to read `{path}`")]
    ReadFailed {
        /// The path as written in the reference.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The credential store is healthy but holds no such secret.
    #[error("no secret stored for service `{service}`, account `{account}`")]
    SecretNotFound {
        /// Keyring service name.
        service: String,
        /// Keyring account name.
        account: String,
    },

    /// The credential store itself failed.
    #[error(transparent)]
    CapabilityUnavailable(#[from] CapabilityError),
}

/// A [`ResolveError`] annotated with the instruction it belongs to.
///
/// Carries enough context to diagnose without re-running: the variable name
/// being populated and the raw placeholder string. The placeholder is the
/// unresolved reference, never a secret value.
#[derive(Debug, Error)]
#[error("failed to resolve `{variable}` from `{placeholder}`")]
pub struct ResolutionFailure {
    /// The environment variable the failing instruction was populating.
    pub variable: String,
    /// The raw, unresolved placeholder string.
    pub placeholder: String,
    /// The per-reference failure.
    #[source]
    pub source: ResolveError,
}

/// Resolves placeholder references against a fixed snapshot and an injected
/// credential capability.
#[derive(Clone)]
pub struct Resolver {
    snapshot: EnvSnapshot,
    credentials: Arc<dyn CredentialLookup>,
}

impl Resolver {
    /// Create a resolver over `snapshot` with the given credential lookup.
    #[must_use]
    pub fn new(snapshot: EnvSnapshot, credentials: Arc<dyn CredentialLookup>) -> Self {
        Self {
            snapshot,
            credentials,
        }
    }

    /// Resolve a single raw instruction value.
    ///
    /// # Errors
    ///
    /// Returns the per-kind [`ResolveError`]: `InvalidReference` for
    /// malformed syntax (in which case no capability is invoked), `Unset`
    /// for absent environment variables, `NotFound`/`ReadFailed` for file
    /// references, and `SecretNotFound`/`CapabilityUnavailable` for keyring
    /// references.
    pub async fn resolve(&self, raw: &str) -> Result<SecretString, ResolveError> {
        let reference = Reference::parse(raw)?;
        debug!(kind = reference.kind(), "resolving reference");

        match reference {
            Reference::Literal { value } => Ok(SecretString::from(value)),
            Reference::Env { name } => self
                .snapshot
                .get(&name)
                .map(|value| SecretString::from(value.to_string()))
                .ok_or(ResolveError::Unset { name }),
            Reference::File { path } => read_file_value(&path).await,
            Reference::Keyring { service, account } => {
                self.lookup_credential(service, account).await
            },
        }
    }

    /// Resolve every instruction concurrently, failing fast as a whole.
    ///
    /// Units share no mutable state; each writes its result into its own
    /// slot of the aggregate map. On the first failure the remaining units
    /// are cancelled and the join set is drained before returning, so no
    /// stray reads outlive this call.
    ///
    /// # Errors
    ///
    /// Returns the first observed unit failure, annotated with the variable
    /// name and raw placeholder it was resolving.
    pub async fn resolve_all(
        &self,
        instructions: &HashMap<String, String>,
    ) -> Result<ResolvedEnv, ResolutionFailure> {
        debug!(count = instructions.len(), "resolving instruction set");

        let cancel = CancellationToken::new();
        let mut units = JoinSet::new();

        for (variable, raw) in instructions {
            let resolver = self.clone();
            let cancel = cancel.clone();
            let variable = variable.clone();
            let raw = raw.clone();

            units.spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => None,
                    result = resolver.resolve(&raw) => Some((variable, raw, result)),
                }
            });
        }

        let mut resolved = ResolvedEnv::with_capacity(instructions.len());
        let mut failure: Option<ResolutionFailure> = None;

        // Drain the whole set even after a failure: siblings must
        // acknowledge cancellation before the aggregate error is returned.
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Some((variable, _, Ok(value)))) => {
                    if failure.is_none() {
                        resolved.insert(variable, value);
                    }
                },
                Ok(Some((variable, placeholder, Err(source)))) => {
                    if failure.is_none() {
                        cancel.cancel();
                        failure = Some(ResolutionFailure {
                            variable,
                            placeholder,
                            source,
                        });
                    }
                },
                // Unit observed cancellation before completing.
                Ok(None) => {},
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => {},
            }
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(resolved),
        }
    }

    async fn lookup_credential(
        &self,
        service: String,
        account: String,
    ) -> Result<SecretString, ResolveError> {
        let credentials = Arc::clone(&self.credentials);
        let (svc, acct) = (service.clone(), account.clone());

        // Keyring backends block on the platform secret service.
        let looked_up = tokio::task::spawn_blocking(move || credentials.lookup(&svc, &acct))
            .await
            .map_err(|e| {
                CapabilityError::Unavailable(format!("credential lookup task failed: {e}"))
            })??;

        looked_up.ok_or(ResolveError::SecretNotFound { service, account })
    }
}

/// Read a `file:` reference's value: home expansion, full read, then a trim
/// of leading and trailing whitespace only.
async fn read_file_value(path: &str) -> Result<SecretString, ResolveError> {
    let expanded = expand_home(path).ok_or_else(|| ResolveError::ReadFailed {
        path: path.to_string(),
        source: std::io::Error::other("could not resolve home directory"),
    })?;

    match tokio::fs::read_to_string(&expanded).await {
        Ok(content) => Ok(SecretString::from(content.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ResolveError::NotFound {
            path: path.to_string(),
        }),
        Err(e) => Err(ResolveError::ReadFailed {
            path: path.to_string(),
            source: e,
        }),
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Returns `None` only when the path needs expansion and no home directory
/// can be resolved.
fn expand_home(path: &str) -> Option<PathBuf> {
    if path == "~" {
        return Some(directories::BaseDirs::new()?.home_dir().to_path_buf());
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Some(directories::BaseDirs::new()?.home_dir().join(rest));
    }
    Some(PathBuf::from(path))
}
