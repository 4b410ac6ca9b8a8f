//! Profile configuration loading.
//!
//! Profiles are named instruction sets stored in a YAML file:
//!
//! ```yaml
//! profiles:
//!   dev:
//!     env:
//!       DATABASE_URL: "env:DEV_DATABASE_URL"
//!       API_KEY: "keyring:myapp:api"
//! ```
//!
//! Values are raw placeholder strings; nothing is resolved at load time, so
//! the file never holds secrets. Discovery order when no explicit path is
//! given: `$CREDRUN_CONFIG`, then `./.credrun.yaml`, then
//! `~/.config/credrun/config.yaml`. An explicitly requested file (flag or
//! environment variable) that does not exist is an error; the fallback
//! locations are optional.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "CREDRUN_CONFIG";

/// Project-local config file name.
pub const LOCAL_CONFIG_FILE: &str = ".credrun.yaml";

/// Top-level profile configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    /// Named instruction sets.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// One named instruction set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    /// Variable name → raw placeholder string.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ProfileConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document is a valid configuration with no profiles.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error for invalid YAML.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Look up a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProfile`] naming the available
    /// profiles when `name` is not defined.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            ConfigError::UnknownProfile {
                name: name.to_string(),
                available: if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                },
            }
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .path.display())]
    Missing {
        /// The requested path.
        path: PathBuf,
    },

    /// The config file exists but could not be read.
    #[error("failed to read config file {}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected schema.
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        /// The file being parsed.
        path: PathBuf,
        /// The underlying deserialization failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// The requested profile is not defined.
    #[error("unknown profile `{name}` (available: {available})")]
    UnknownProfile {
        /// The requested profile name.
        name: String,
        /// Comma-separated list of defined profiles.
        available: String,
    },
}

/// Locate the configuration file to load.
///
/// `explicit` (a `--config` flag) wins. Otherwise `$CREDRUN_CONFIG`, then
/// `./.credrun.yaml`, then `~/.config/credrun/config.yaml`. Returns
/// `Ok(None)` when nothing was explicitly requested and no fallback exists.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when the flag or the environment
/// variable names a file that does not exist.
pub fn discover_config(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(from_env) = std::env::var_os(CONFIG_PATH_VAR) {
        let path = PathBuf::from(from_env);
        if !path.exists() {
            return Err(ConfigError::Missing { path });
        }
        return Ok(Some(path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let user = base_dirs
            .home_dir()
            .join(".config")
            .join("credrun")
            .join("config.yaml");
        if user.exists() {
            return Ok(Some(user));
        }
    }

    debug!("no profile configuration found");
    Ok(None)
}

/// Assemble the instruction set to resolve.
///
/// `overrides` are applied per key on top of the profile's instructions:
/// a profile entry and an override for the same variable keep only the
/// override. With no profile the overrides form the whole set.
#[must_use]
pub fn build_instructions(
    profile: Option<&Profile>,
    overrides: &[(String, String)],
) -> HashMap<String, String> {
    let mut instructions = profile.map(|p| p.env.clone()).unwrap_or_default();
    for (name, raw) in overrides {
        instructions.insert(name.clone(), raw.clone());
    }
    instructions
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
profiles:
  dev:
    env:
      DATABASE_URL: "env:DEV_DATABASE_URL"
      API_KEY: "keyring:myapp:api"
  prod:
    env:
      API_KEY: "file:~/secrets/prod-key"
"#;

    #[test]
    fn parses_profiles() {
        let config = ProfileConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.profiles.len(), 2);

        let dev = config.profile("dev").unwrap();
        assert_eq!(dev.env["DATABASE_URL"], "env:DEV_DATABASE_URL");
        assert_eq!(dev.env["API_KEY"], "keyring:myapp:api");
    }

    #[test]
    fn unknown_profile_lists_available() {
        let config = ProfileConfig::from_yaml(SAMPLE).unwrap();
        let err = config.profile("staging").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("staging"));
        assert!(message.contains("dev, prod"));
    }

    #[test]
    fn empty_config_parses() {
        let config = ProfileConfig::from_yaml("").unwrap();
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "profiles: [not, a, map]").unwrap();

        let err = ProfileConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = discover_config(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn explicit_existing_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = discover_config(Some(file.path())).unwrap();
        assert_eq!(found, Some(file.path().to_path_buf()));
    }

    #[test]
    fn overrides_overlay_profile_per_key() {
        let config = ProfileConfig::from_yaml(SAMPLE).unwrap();
        let dev = config.profile("dev").unwrap();

        let overrides = vec![("API_KEY".to_string(), "literal-key".to_string())];
        let instructions = build_instructions(Some(dev), &overrides);

        // Overridden key replaced, untouched profile keys retained.
        assert_eq!(instructions["API_KEY"], "literal-key");
        assert_eq!(instructions["DATABASE_URL"], "env:DEV_DATABASE_URL");
        assert_eq!(instructions.len(), 2);
    }

    #[test]
    fn overrides_alone_form_the_instruction_set() {
        let overrides = vec![("PORT".to_string(), "9000".to_string())];
        let instructions = build_instructions(None, &overrides);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions["PORT"], "9000");
    }
}
