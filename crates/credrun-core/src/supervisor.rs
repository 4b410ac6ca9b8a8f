//! Child process supervision.
//!
//! Spawns the target command with the composed environment as its *only*
//! environment, relays stdio byte-for-byte, relays SIGINT/SIGTERM to the
//! child, and maps the child's outcome to a single exit code:
//!
//! - normal exit with code `c` → `c`
//! - killed by a signal → `1`
//! - spawn failure → reported, `1` (the caller maps the error)
//!
//! While the child runs, a received SIGINT or SIGTERM is forwarded verbatim
//! and a 1-second grace timer is armed; if the child is still alive when the
//! timer fires it is killed unconditionally. Signal handling is scoped to
//! [`supervise`]: the signal streams are dropped when it returns.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::signal::unix::{SignalKind, signal as signal_stream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::env::FinalEnv;

/// How long a relayed termination signal may go unanswered before the child
/// is killed unconditionally.
pub const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to wait for the output relays to reach EOF after the child has
/// exited. An orphaned grandchild can keep the pipes open indefinitely.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Failure to launch the child. The child never ran.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The command does not exist on `PATH` (or at the given path).
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that could not be resolved.
        command: String,
    },

    /// Any other OS-level spawn or wait failure.
    #[error("failed to run `{command}`")]
    Io {
        /// The command that was being launched.
        command: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Signal handler registration failed before the child was spawned.
    #[error("failed to install signal handlers")]
    SignalSetup {
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Run `command` to completion under supervision and return the exit code
/// the supervisor process should terminate with.
///
/// The child receives `env` as its complete environment (the supervisor's
/// own environment is not additionally inherited). Stdin, stdout and stderr
/// are forwarded without transformation.
///
/// # Errors
///
/// Returns [`SpawnError`] only when the child could not be started; once
/// the child is running, every outcome (including death by signal) is
/// expressed through the returned exit code.
pub async fn supervise(command: &str, args: &[String], env: &FinalEnv) -> Result<i32, SpawnError> {
    // Install handlers before spawning so a signal arriving immediately
    // after the fork is not lost. The streams drop when this call returns.
    let mut sigint =
        signal_stream(SignalKind::interrupt()).map_err(|source| SpawnError::SignalSetup { source })?;
    let mut sigterm =
        signal_stream(SignalKind::terminate()).map_err(|source| SpawnError::SignalSetup { source })?;

    let mut child = spawn_child(command, args, env)?;
    let pid = child.id();
    debug!(command, pid, "child spawned");

    let stdin_relay = child.stdin.take().map(|mut child_stdin| {
        tokio::spawn(async move {
            let mut input = tokio::io::stdin();
            let _ = tokio::io::copy(&mut input, &mut child_stdin).await;
            let _ = child_stdin.shutdown().await;
        })
    });
    let stdout_relay = child.stdout.take().map(|mut child_stdout| {
        tokio::spawn(async move {
            let mut output = tokio::io::stdout();
            let _ = tokio::io::copy(&mut child_stdout, &mut output).await;
            let _ = output.flush().await;
        })
    });
    let stderr_relay = child.stderr.take().map(|mut child_stderr| {
        tokio::spawn(async move {
            let mut output = tokio::io::stderr();
            let _ = tokio::io::copy(&mut child_stderr, &mut output).await;
            let _ = output.flush().await;
        })
    });

    let grace = tokio::time::sleep(GRACE_PERIOD);
    tokio::pin!(grace);
    let mut grace_armed = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|source| SpawnError::Io {
                    command: command.to_string(),
                    source,
                })?;
            },
            _ = sigint.recv() => {
                relay_signal(pid, Signal::SIGINT);
                if !grace_armed {
                    grace.as_mut().reset(tokio::time::Instant::now() + GRACE_PERIOD);
                    grace_armed = true;
                }
            },
            _ = sigterm.recv() => {
                relay_signal(pid, Signal::SIGTERM);
                if !grace_armed {
                    grace.as_mut().reset(tokio::time::Instant::now() + GRACE_PERIOD);
                    grace_armed = true;
                }
            },
            () = &mut grace, if grace_armed => {
                grace_armed = false;
                warn!(pid, "child ignored relayed signal, killing");
                if let Err(err) = child.start_kill() {
                    // Lost the race with a normal exit.
                    debug!(%err, "force kill failed; child already exited");
                }
            },
        }
    };

    // The child is gone: stop feeding its stdin, let the output relays
    // drain to EOF so nothing the child wrote is dropped. The drain is
    // bounded: a surviving grandchild may hold the pipes open.
    if let Some(task) = stdin_relay {
        task.abort();
    }
    drain(stdout_relay).await;
    drain(stderr_relay).await;

    Ok(exit_code(status))
}

fn spawn_child(command: &str, args: &[String], env: &FinalEnv) -> Result<Child, SpawnError> {
    let mut cmd = Command::new(command);

    cmd.args(args)
        .env_clear()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    for (name, value) in env.iter() {
        cmd.env(name, value.expose_secret());
    }

    cmd.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SpawnError::CommandNotFound {
                command: command.to_string(),
            }
        } else {
            SpawnError::Io {
                command: command.to_string(),
                source,
            }
        }
    })
}

/// Forward a received signal verbatim to the child.
fn relay_signal(pid: Option<u32>, sig: Signal) {
    let Some(pid) = pid else {
        debug!(signal = %sig, "signal received after child exit, nothing to relay");
        return;
    };

    debug!(signal = %sig, pid, "relaying signal to child");
    #[allow(clippy::cast_possible_wrap)]
    if let Err(err) = signal::kill(Pid::from_raw(pid as i32), sig) {
        warn!(%err, pid, "failed to relay signal to child");
    }
}

async fn drain(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, &mut task)
            .await
            .is_err()
        {
            debug!("output relay still open after child exit, abandoning");
            task.abort();
        }
    }
}

/// Map the child's exit status to the supervisor's exit code.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        return code;
    }
    if let Some(sig) = status.signal() {
        debug!(signal = signal_name(sig), "child terminated by signal");
    }
    1
}

const fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGKILL => "SIGKILL",
        libc::SIGHUP => "SIGHUP",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        _ => "UNKNOWN",
    }
}
