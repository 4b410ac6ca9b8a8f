//! Environment snapshot and composition.

use std::collections::HashMap;
use std::fmt;

use secrecy::SecretString;

/// Variable names to resolved values, one entry per successful instruction.
///
/// Values stay wrapped in [`SecretString`] until the child command is built,
/// so `Debug` output never reveals them.
pub type ResolvedEnv = HashMap<String, SecretString>;

/// Immutable snapshot of the supervisor's own environment.
///
/// Captured once at startup; `env:` references and composition both read
/// from this snapshot, never from the live process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit entries.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable in the snapshot.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Number of captured variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// The complete environment handed to the child process.
///
/// Produced only by [`compose`]; the supervisor clears the child's inherited
/// environment and installs exactly these entries.
#[derive(Clone, Default)]
pub struct FinalEnv {
    entries: HashMap<String, SecretString>,
}

impl FinalEnv {
    /// Look up a composed value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.entries.get(name)
    }

    /// Iterate over all composed entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretString)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of composed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the composed environment is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FinalEnv {
    // Keys only; values are secrets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("FinalEnv").field("keys", &keys).finish()
    }
}

/// Overlay `resolved` onto `inherited`.
///
/// Pure function: every resolved key overwrites any inherited value of the
/// same name, all other inherited keys pass through untouched, and nothing
/// is dropped or renamed. Performs no I/O and consults no capabilities.
#[must_use]
pub fn compose(inherited: &EnvSnapshot, resolved: ResolvedEnv) -> FinalEnv {
    let mut entries: HashMap<String, SecretString> = inherited
        .vars
        .iter()
        .map(|(k, v)| (k.clone(), SecretString::from(v.clone())))
        .collect();

    for (name, value) in resolved {
        entries.insert(name, value);
    }

    FinalEnv { entries }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn resolved(entries: &[(&str, &str)]) -> ResolvedEnv {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), SecretString::from((*v).to_string())))
            .collect()
    }

    #[test]
    fn resolved_keys_are_added() {
        let inherited = EnvSnapshot::from_entries([("PATH", "/bin")]);
        let env = compose(&inherited, resolved(&[("PORT", "9000")]));

        assert_eq!(env.len(), 2);
        assert_eq!(env.get("PATH").unwrap().expose_secret(), "/bin");
        assert_eq!(env.get("PORT").unwrap().expose_secret(), "9000");
    }

    #[test]
    fn resolved_wins_on_conflict() {
        let inherited = EnvSnapshot::from_entries([("PORT", "8080")]);
        let env = compose(&inherited, resolved(&[("PORT", "9000")]));

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("PORT").unwrap().expose_secret(), "9000");
    }

    #[test]
    fn absent_keys_stay_absent() {
        let inherited = EnvSnapshot::from_entries([("A", "1")]);
        let env = compose(&inherited, ResolvedEnv::new());

        assert_eq!(env.len(), 1);
        assert!(env.get("B").is_none());
    }

    #[test]
    fn debug_output_redacts_values() {
        let inherited = EnvSnapshot::default();
        let env = compose(&inherited, resolved(&[("API_KEY", "hunter2")]));

        let debug = format!("{env:?}");
        assert!(debug.contains("API_KEY"));
        assert!(!debug.contains("hunter2"));

        // The resolved map itself also redacts through SecretString.
        let map = resolved(&[("API_KEY", "hunter2")]);
        let debug = format!("{map:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn snapshot_lookup() {
        let snapshot = EnvSnapshot::from_entries([("FOO", "bar")]);
        assert_eq!(snapshot.get("FOO"), Some("bar"));
        assert_eq!(snapshot.get("MISSING"), None);
        assert!(!snapshot.is_empty());
    }
}
