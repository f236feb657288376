//! Runtime environment adapters
//!
//! A runtime environment is the controllable emulated host an account's app
//! runs inside. The supervisor core only sees the [`RuntimeAdapter`]
//! capability surface; concrete adapters are selected by the `type` tag of
//! the account's runtime descriptor at registry build time and the core
//! never inspects the concrete type.
//!
//! Two adapters ship in-tree:
//! - `console`: drives a fixed-grammar console binary addressing instances
//!   by name, with adb-based per-device service setup
//! - `shell`: fully template-driven shell commands for products without a
//!   console grammar we understand

mod console;
mod shell;

pub use console::ConsoleRuntime;
pub use shell::ShellRuntime;

use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RuntimeDescriptor;

/// Errors from adapter command execution.
///
/// These are always caught and logged at the call site — an adapter failure
/// never propagates into the state machine (recovery is re-evaluated on the
/// next tick regardless of outcome).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("no {0} command configured for this runtime")]
    NotConfigured(&'static str),
}

/// Capability surface of a controllable runtime environment.
///
/// Every method may fail (external tool missing, process not found); callers
/// treat every call as "started", never "completed" — success is only ever
/// inferred from the next liveness report.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Human-readable label for dashboards.
    fn label(&self) -> &str;

    /// Launch the guest app inside the environment.
    async fn start_app(&self) -> Result<(), RuntimeError>;

    /// Terminate the guest app.
    async fn kill_app(&self) -> Result<(), RuntimeError>;

    /// Boot the environment and bring up its service layer.
    async fn start_environment(&self) -> Result<(), RuntimeError>;

    /// Shut the environment down.
    async fn kill_environment(&self) -> Result<(), RuntimeError>;

    /// Minimize the environment window.
    async fn minimize(&self) -> Result<(), RuntimeError>;

    /// Restore the environment window.
    async fn restore(&self) -> Result<(), RuntimeError>;

    /// Re-run the per-device service setup.
    async fn run_setup(&self) -> Result<(), RuntimeError>;

    /// Run the configured one-time post-start command.
    async fn run_post_start(&self) -> Result<(), RuntimeError>;

    /// Change a runtime parameter (e.g. a physics setting).
    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RuntimeError>;
}

/// Build an adapter from its configuration descriptor.
pub fn build(descriptor: &RuntimeDescriptor) -> Arc<dyn RuntimeAdapter> {
    match descriptor {
        RuntimeDescriptor::Console(cfg) => Arc::new(ConsoleRuntime::new(cfg.clone())),
        RuntimeDescriptor::Shell(cfg) => Arc::new(ShellRuntime::new(cfg.clone())),
    }
}

/// Run one shell command line and map a non-zero exit into an error.
///
/// Output is captured, not inherited — adapter noise goes through tracing,
/// never straight to the supervisor's stdio.
pub(crate) async fn run_shell(command: &str) -> Result<(), RuntimeError> {
    debug!(%command, "running adapter command");

    let output = shell_command(command).output().await?;
    check_output(command, output)
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn check_output(command: &str, output: Output) -> Result<(), RuntimeError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!(%command, status = %output.status, %stderr, "adapter command failed");
    Err(RuntimeError::CommandFailed {
        status: output.status.to_string(),
        stderr,
    })
}
