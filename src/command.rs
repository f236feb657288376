//! Manual command intake
//!
//! Commands arrive from a chat or socket front-end as a command token plus a
//! target account (or `"all"` for broadcast-capable commands) and an
//! optional payload. Aliases live in one static table instead of being
//! string-matched at call sites; unknown commands and unknown accounts are
//! rejected with typed errors and logged, never fatal.

use std::str::FromStr;

use tracing::{info, warn};

use crate::registry::Registry;

/// Canonical manual commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    KillApp,
    StartApp,
    RestartApp,
    KillEnvironment,
    StartEnvironment,
    RestartEnvironment,
    Minimize,
    Restore,
    TogglePause,
    RunSetup,
    SetParameter,
}

/// Canonical name → recognized tokens (all matched case-insensitively).
const COMMAND_ALIASES: &[(Command, &[&str])] = &[
    (Command::KillApp, &["kill-app", "killapp", "ka"]),
    (Command::StartApp, &["start-app", "startapp", "sa"]),
    (Command::RestartApp, &["restart-app", "restartapp", "ra"]),
    (Command::KillEnvironment, &["kill-env", "killenvironment", "ke"]),
    (Command::StartEnvironment, &["start-env", "startenvironment", "se"]),
    (Command::RestartEnvironment, &["restart-env", "restartenvironment", "re"]),
    (Command::Minimize, &["minimize", "min"]),
    (Command::Restore, &["restore", "res"]),
    (Command::TogglePause, &["toggle-pause", "togglepause", "pause", "tp"]),
    (Command::RunSetup, &["run-setup", "runsetup", "setup"]),
    (Command::SetParameter, &["set-param", "setparameter", "param", "sp"]),
];

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),
    #[error("unknown account \"{0}\"")]
    UnknownAccount(String),
    #[error("command \"{0}\" does not support the \"all\" target")]
    BroadcastUnsupported(&'static str),
    #[error("command \"{0}\" requires a name=value payload")]
    MissingParameter(&'static str),
}

impl Command {
    pub fn canonical(&self) -> &'static str {
        COMMAND_ALIASES
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, aliases)| aliases[0])
            .unwrap_or("unknown")
    }

    /// Only window management commands fan out to the whole fleet; lifecycle
    /// commands always address a single account.
    pub fn supports_broadcast(&self) -> bool {
        matches!(self, Command::Minimize | Command::Restore)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().trim_start_matches('!').to_ascii_lowercase();
        COMMAND_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&token.as_str()))
            .map(|(command, _)| *command)
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Execute one command against the current registry generation.
pub async fn dispatch(
    registry: &Registry,
    command: Command,
    target: &str,
    value: Option<&str>,
) -> Result<(), CommandError> {
    if target.eq_ignore_ascii_case("all") {
        if !command.supports_broadcast() {
            warn!(%command, "broadcast requested for non-broadcast command");
            return Err(CommandError::BroadcastUnsupported(command.canonical()));
        }
        info!(%command, "broadcasting to all accounts");
        for entry in registry.accounts() {
            let mut account = entry.lock().await;
            apply(&mut account, command, value)?;
        }
        return Ok(());
    }

    let entry = registry
        .get(target)
        .map_err(|_| CommandError::UnknownAccount(target.to_string()))?;
    let mut account = entry.lock().await;
    info!(%command, account = %account.name, "executing command");
    apply(&mut account, command, value)
}

fn apply(
    account: &mut crate::account::Account,
    command: Command,
    value: Option<&str>,
) -> Result<(), CommandError> {
    match command {
        Command::KillApp => account.kill_app(),
        Command::StartApp => account.start_app(),
        Command::RestartApp => account.restart_app(true),
        Command::KillEnvironment => account.kill_environment(),
        Command::StartEnvironment => account.start_environment(),
        Command::RestartEnvironment => account.restart_environment(true),
        Command::Minimize => account.minimize(),
        Command::Restore => account.restore(),
        Command::TogglePause => {
            // Refusal is logged by the account; not an intake error.
            account.toggle_pause();
        }
        Command::RunSetup => account.run_setup(),
        Command::SetParameter => {
            let payload = value.ok_or(CommandError::MissingParameter(command.canonical()))?;
            let (name, value) = payload
                .split_once('=')
                .ok_or(CommandError::MissingParameter(command.canonical()))?;
            account.set_parameter(name.trim(), value.trim());
        }
    }
    Ok(())
}
