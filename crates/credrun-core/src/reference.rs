//! Placeholder reference parsing.
//!
//! An instruction value is one of four reference kinds, determined purely by
//! a case-sensitive textual prefix:
//!
//! | Prefix     | Remainder                                      |
//! |------------|------------------------------------------------|
//! | `env:`     | name of an inherited environment variable      |
//! | `file:`    | filesystem path (`~` expands to home)          |
//! | `keyring:` | `service:account`, exactly two non-empty fields|
//! | *(none)*   | literal value, passed through unchanged        |
//!
//! Parsing is purely syntactic: it never touches the environment, the
//! filesystem, or the credential store. A string that starts with a
//! recognized prefix but has a malformed remainder is rejected here, before
//! any capability is invoked. Anything without a recognized prefix is a
//! literal, including the empty string and strings that merely contain
//! colons (for example `http://example.com`).

use super::resolver::ResolveError;

/// A parsed instruction value.
///
/// Derived from the raw string on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `env:NAME` — read `NAME` from the supervisor's inherited environment.
    Env {
        /// Environment variable name, non-empty.
        name: String,
    },
    /// `file:PATH` — read the trimmed contents of the file at `PATH`.
    File {
        /// Filesystem path as written, before home expansion.
        path: String,
    },
    /// `keyring:SERVICE:ACCOUNT` — look up a secret in the OS keyring.
    Keyring {
        /// Keyring service name, non-empty.
        service: String,
        /// Keyring account name, non-empty.
        account: String,
    },
    /// Any other string, passed through unchanged.
    Literal {
        /// The verbatim instruction value.
        value: String,
    },
}

impl Reference {
    /// Parse a raw instruction value into its typed form.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidReference`] when the value starts with
    /// a recognized prefix but the remainder is malformed: an empty `env:`
    /// name, an empty `file:` path, or a `keyring:` remainder that does not
    /// split into exactly two non-empty colon-delimited fields.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        if let Some(name) = raw.strip_prefix("env:") {
            if name.is_empty() {
                return Err(ResolveError::InvalidReference {
                    reason: "`env:` reference has an empty variable name".to_string(),
                });
            }
            return Ok(Self::Env {
                name: name.to_string(),
            });
        }

        if let Some(path) = raw.strip_prefix("file:") {
            if path.is_empty() {
                return Err(ResolveError::InvalidReference {
                    reason: "`file:` reference has an empty path".to_string(),
                });
            }
            return Ok(Self::File {
                path: path.to_string(),
            });
        }

        if let Some(rest) = raw.strip_prefix("keyring:") {
            let fields: Vec<&str> = rest.split(':').collect();
            match fields.as_slice() {
                [service, account] if !service.is_empty() && !account.is_empty() => {
                    return Ok(Self::Keyring {
                        service: (*service).to_string(),
                        account: (*account).to_string(),
                    });
                },
                _ => {
                    return Err(ResolveError::InvalidReference {
                        reason: format!(
                            "`keyring:` reference must be `keyring:SERVICE:ACCOUNT` \
                             with two non-empty fields, got `{raw}`"
                        ),
                    });
                },
            }
        }

        Ok(Self::Literal {
            value: raw.to_string(),
        })
    }

    /// The reference kind as a short label, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Env { .. } => "env",
            Self::File { .. } => "file",
            Self::Keyring { .. } => "keyring",
            Self::Literal { .. } => "literal",
        }
    }
}
