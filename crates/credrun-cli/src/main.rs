//! credrun - run a command with secrets resolved into its environment.
//!
//! Assembles an instruction set from a named profile and/or `--set`
//! overrides, resolves every placeholder (`env:`, `file:`, `keyring:`,
//! literal) concurrently, overlays the result onto the inherited
//! environment, and hands off to the process supervisor. The process exits
//! with the child's exit code, or `1` on resolution, configuration, or
//! spawn failure.
//!
//! ```text
//! credrun --profile dev -- npm start
//! credrun --set API_KEY=keyring:myapp:api -- ./server --port 8080
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use credrun_core::capability::{CredentialLookup, DisabledCredentials, KeyringCredentials};
use credrun_core::config::{self, ProfileConfig};
use credrun_core::env::{EnvSnapshot, compose};
use credrun_core::resolver::Resolver;
use credrun_core::supervisor;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// credrun - run a command with secrets resolved into its environment
#[derive(Parser, Debug)]
#[command(name = "credrun")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the profile configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Named profile to load from the configuration file
    #[arg(short, long, value_name = "NAME")]
    profile: Option<String>,

    /// Extra instruction, overlaid per key on the profile (repeatable)
    #[arg(short = 's', long = "set", value_name = "KEY=REFERENCE")]
    set: Vec<String>,

    /// Disable the OS credential store (keyring references will fail)
    #[arg(long)]
    no_keyring: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Command to run and its arguments
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("credrun: {err:#}");
            std::process::exit(1);
        },
    }
}

fn run(cli: Cli) -> Result<i32> {
    let (command, args) = cli
        .command
        .split_first()
        .context("no command given")?;

    let overrides = parse_overrides(&cli.set)?;
    let instructions =
        assemble_instructions(cli.config.as_deref(), cli.profile.as_deref(), &overrides)?;
    debug!(count = instructions.len(), "assembled instruction set");

    // Captured once; both `env:` references and composition read this
    // snapshot, never the live environment.
    let snapshot = EnvSnapshot::capture();

    // Credential backend is selected exactly once, here.
    let credentials: Arc<dyn CredentialLookup> = if cli.no_keyring {
        Arc::new(DisabledCredentials::new())
    } else {
        Arc::new(KeyringCredentials::new())
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(async move {
        let resolver = Resolver::new(snapshot.clone(), credentials);
        let resolved = resolver.resolve_all(&instructions).await?;
        let env = compose(&snapshot, resolved);

        let code = supervisor::supervise(command, args, &env).await?;
        Ok(code)
    })
}

/// Build the instruction set from the selected profile and `--set` overlays.
///
/// The configuration file is consulted only when a profile is requested;
/// `--set` entries alone form a complete instruction set.
fn assemble_instructions(
    config_path: Option<&Path>,
    profile_name: Option<&str>,
    overrides: &[(String, String)],
) -> Result<HashMap<String, String>> {
    let profile = match profile_name {
        Some(name) => {
            let path = config::discover_config(config_path)?.with_context(|| {
                format!("profile `{name}` requested but no configuration file was found")
            })?;
            let loaded = ProfileConfig::from_file(&path)?;
            Some(loaded.profile(name)?.clone())
        },
        None => None,
    };

    Ok(config::build_instructions(profile.as_ref(), overrides))
}

fn parse_overrides(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, raw)) if !name.is_empty() => Ok((name.to_string(), raw.to_string())),
            _ => bail!("invalid --set `{pair}`: expected KEY=REFERENCE"),
        })
        .collect()
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_command_after_separator() {
        let cli = Cli::parse_from(["credrun", "--profile", "dev", "--", "npm", "start"]);
        assert_eq!(cli.profile.as_deref(), Some("dev"));
        assert_eq!(cli.command, vec!["npm", "start"]);
    }

    #[test]
    fn command_may_carry_flags() {
        let cli = Cli::parse_from(["credrun", "--", "./server", "--port", "8080"]);
        assert_eq!(cli.command, vec!["./server", "--port", "8080"]);
    }

    #[test]
    fn parse_overrides_accepts_key_value() {
        let parsed = parse_overrides(&["PORT=9000".to_string(), "URL=env:BASE".to_string()])
            .unwrap();
        assert_eq!(parsed[0], ("PORT".to_string(), "9000".to_string()));
        assert_eq!(parsed[1], ("URL".to_string(), "env:BASE".to_string()));
    }

    #[test]
    fn parse_overrides_keeps_equals_in_value() {
        let parsed = parse_overrides(&["QUERY=a=b".to_string()]).unwrap();
        assert_eq!(parsed[0], ("QUERY".to_string(), "a=b".to_string()));
    }

    #[test]
    fn parse_overrides_rejects_malformed_pairs() {
        assert!(parse_overrides(&["NO_SEPARATOR".to_string()]).is_err());
        assert!(parse_overrides(&["=value".to_string()]).is_err());
    }

    #[test]
    fn set_alone_forms_instruction_set() {
        let overrides = vec![("PORT".to_string(), "9000".to_string())];
        let instructions = assemble_instructions(None, None, &overrides).unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions["PORT"], "9000");
    }

    #[test]
    fn set_overlays_profile_per_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "profiles:\n  dev:\n    env:\n      A: \"env:FOO\"\n      B: \"literal\"\n"
        )
        .unwrap();

        let overrides = vec![("A".to_string(), "overridden".to_string())];
        let instructions =
            assemble_instructions(Some(file.path()), Some("dev"), &overrides).unwrap();

        assert_eq!(instructions["A"], "overridden");
        assert_eq!(instructions["B"], "literal");
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "profiles:\n  dev:\n    env: {{}}\n").unwrap();

        let err = assemble_instructions(Some(file.path()), Some("missing"), &[]).unwrap_err();
        assert!(err.to_string().contains("unknown profile"));
    }
}
