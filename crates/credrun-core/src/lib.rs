//! Core library for `credrun`: launch a command with an environment
//! assembled from heterogeneous, possibly-secret sources.
//!
//! # Pipeline
//!
//! ```text
//! instructions map ──▶ Resolver ──▶ resolved map ──▶ compose ──▶ supervise
//!                    (concurrent,                  (overlay on   (spawn, relay
//!                     fail-fast)                    snapshot)     stdio+signals)
//! ```
//!
//! - [`resolver`] parses `env:` / `file:` / `keyring:` / literal references
//!   and resolves each instruction concurrently with fail-fast aggregation.
//! - [`env`] captures the inherited environment once and overlays the
//!   resolved values onto it.
//! - [`supervisor`] spawns the child with the composed environment only,
//!   relays stdio and termination signals, and maps the child's outcome to
//!   an exit code.
//!
//! The child is spawned only after *every* instruction resolved; no partial
//! environment ever reaches a child process. Resolved values stay wrapped
//! in [`secrecy::SecretString`] until the command is built, so they never
//! leak through `Debug` or logs.

pub mod capability;
pub mod config;
pub mod env;
pub mod reference;
pub mod resolver;
pub mod supervisor;

pub use capability::{CapabilityError, CredentialLookup, DisabledCredentials, KeyringCredentials};
pub use config::{ConfigError, Profile, ProfileConfig};
pub use env::{EnvSnapshot, FinalEnv, ResolvedEnv, compose};
pub use reference::Reference;
pub use resolver::{ResolutionFailure, ResolveError, Resolver};
pub use supervisor::{GRACE_PERIOD, SpawnError, supervise};
