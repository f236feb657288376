//! Supervisor configuration
//!
//! Declarative TOML describing the monitored fleet: one `[[accounts]]` entry
//! per unit, each with optional runtime-environment descriptor, notification
//! target, and recovery budgets. Every tunable has a default matching the
//! observed production values, so a minimal config is just account names.
//!
//! ## Loading order
//!
//! 1. `--config` CLI flag
//! 2. `WARDEN_CONFIG` environment variable
//! 3. `./warden.toml` in the current working directory
//!
//! Reload never mutates accounts in place: the watcher (see `watcher.rs`)
//! triggers a fresh [`SupervisorConfig`] load, a new registry is built from
//! it, and the old one is swapped out atomically.

pub mod watcher;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "warden.toml";

/// Errors from loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found (tried --config, $WARDEN_CONFIG, ./warden.toml)")]
    NotFound,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("duplicate account name \"{0}\"")]
    DuplicateAccount(String),
    #[error("account \"{account}\": {problem}")]
    InvalidAccount { account: String, problem: String },
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one supervisor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Tick loop settings
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Escalation notification settings
    #[serde(default)]
    pub notifier: NotifierSettings,

    /// The monitored fleet
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Seconds between supervisor ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// HTTP bind address
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Webhook endpoint for escalation messages. When unset, escalations
    /// are logged only.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// ============================================================================
// Per-Account Config
// ============================================================================

/// One monitored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Unique identifier; also the key the liveness probe reports with
    pub name: String,

    /// Operator identity handed to the notification sink on escalation
    #[serde(default)]
    pub notify_target: Option<String>,

    /// Minutes of silence before the account is considered dead
    #[serde(default = "default_death_threshold_minutes")]
    pub death_threshold_minutes: f64,

    /// App restart attempts before falling back to an environment restart
    #[serde(default = "default_max_restarts")]
    pub max_app_restarts: u32,

    /// Environment restart attempts before escalating to a human
    #[serde(default = "default_max_restarts")]
    pub max_environment_restarts: u32,

    /// Minutes an app start may take before it is declared failed
    #[serde(default = "default_app_start_limit_minutes")]
    pub app_start_limit_minutes: f64,

    /// Minutes an environment start may take before it is declared failed
    #[serde(default = "default_environment_start_limit_minutes")]
    pub environment_start_limit_minutes: f64,

    /// Controllable runtime environment, when the account has one
    #[serde(default)]
    pub runtime: Option<RuntimeDescriptor>,

    /// Periodic parameter reapplication while Online
    #[serde(default)]
    pub maintenance: Option<MaintenanceConfig>,
}

impl AccountConfig {
    /// Minimal entry with all defaults — mostly for tests.
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            notify_target: None,
            death_threshold_minutes: default_death_threshold_minutes(),
            max_app_restarts: default_max_restarts(),
            max_environment_restarts: default_max_restarts(),
            app_start_limit_minutes: default_app_start_limit_minutes(),
            environment_start_limit_minutes: default_environment_start_limit_minutes(),
            runtime: None,
            maintenance: None,
        }
    }
}

/// Periodic reapplication of a runtime parameter while the account is Online.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Parameter name passed to the adapter
    pub parameter: String,
    /// Value to apply
    pub value: String,
    /// Minutes between reapplications
    #[serde(default = "default_reapply_minutes")]
    pub reapply_minutes: f64,
}

// ============================================================================
// Runtime Descriptors
// ============================================================================

/// Adapter selection by `type` tag. The core never inspects the concrete
/// adapter beyond this construction point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeDescriptor {
    Console(ConsoleRuntimeConfig),
    Shell(ShellRuntimeConfig),
}

/// Name-addressed console-tool emulator (see `runtime::console`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleRuntimeConfig {
    /// Dashboard label; defaults to `console:<instance_name>`
    #[serde(default)]
    pub label: Option<String>,

    /// Console binary path
    pub console_path: String,

    /// adb binary path for service setup
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Instance name the console addresses
    pub instance_name: String,

    /// Guest app package
    pub app_package: String,

    /// adb device serials for service setup
    #[serde(default)]
    pub device_names: Vec<String>,

    /// Seconds to wait after launch before running service setup
    #[serde(default = "default_boot_wait_secs")]
    pub boot_wait_secs: u64,

    /// In-guest service setup command template (run per device)
    #[serde(default)]
    pub setup_command: Option<String>,

    /// One-time command after a confirmed app start
    #[serde(default)]
    pub post_start_command: Option<String>,
}

/// Fully template-driven adapter (see `runtime::shell`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRuntimeConfig {
    /// Dashboard label; defaults to `shell:<instance>`
    #[serde(default)]
    pub label: Option<String>,

    /// Substituted for `<install_path>` in templates
    #[serde(default)]
    pub install_path: String,

    /// Substituted for `<instance>` in templates
    #[serde(default)]
    pub instance: String,

    /// Seconds to wait after environment start before running setup
    #[serde(default = "default_boot_wait_secs")]
    pub boot_wait_secs: u64,

    /// Command templates per capability
    #[serde(default)]
    pub commands: ShellCommandSet,
}

/// Command templates for each [`crate::runtime::RuntimeAdapter`] capability.
/// Unset entries make the capability report itself as not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellCommandSet {
    #[serde(default)]
    pub start_app: Option<String>,
    #[serde(default)]
    pub kill_app: Option<String>,
    #[serde(default)]
    pub start_environment: Option<String>,
    #[serde(default)]
    pub kill_environment: Option<String>,
    #[serde(default)]
    pub minimize: Option<String>,
    #[serde(default)]
    pub restore: Option<String>,
    #[serde(default)]
    pub set_parameter: Option<String>,
    #[serde(default)]
    pub post_start: Option<String>,
    #[serde(default)]
    pub setup: Vec<String>,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_server_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_death_threshold_minutes() -> f64 {
    15.0
}

fn default_max_restarts() -> u32 {
    3
}

fn default_app_start_limit_minutes() -> f64 {
    3.0
}

fn default_environment_start_limit_minutes() -> f64 {
    2.0
}

fn default_reapply_minutes() -> f64 {
    30.0
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_boot_wait_secs() -> u64 {
    20
}

// ============================================================================
// Loading & Validation
// ============================================================================

impl SupervisorConfig {
    /// Resolve the config path using the standard search order.
    pub fn resolve_path(cli_path: Option<&str>) -> Result<PathBuf, ConfigError> {
        if let Some(p) = cli_path {
            return Ok(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            if !p.is_empty() {
                return Ok(PathBuf::from(p));
            }
        }
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Ok(default.to_path_buf());
        }
        Err(ConfigError::NotFound)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            tick_interval_secs = config.supervisor.tick_interval_secs,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject configs the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(ConfigError::InvalidAccount {
                    account: account.name.clone(),
                    problem: "name must not be empty".to_string(),
                });
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ConfigError::DuplicateAccount(account.name.clone()));
            }
            if account.death_threshold_minutes <= 0.0 {
                return Err(ConfigError::InvalidAccount {
                    account: account.name.clone(),
                    problem: "death_threshold_minutes must be positive".to_string(),
                });
            }
            if account.app_start_limit_minutes <= 0.0
                || account.environment_start_limit_minutes <= 0.0
            {
                return Err(ConfigError::InvalidAccount {
                    account: account.name.clone(),
                    problem: "start time limits must be positive".to_string(),
                });
            }
            if let Some(RuntimeDescriptor::Console(c)) = &account.runtime {
                if c.console_path.trim().is_empty() {
                    return Err(ConfigError::InvalidAccount {
                        account: account.name.clone(),
                        problem: "console_path must not be empty".to_string(),
                    });
                }
            }
            if let Some(m) = &account.maintenance {
                if m.reapply_minutes <= 0.0 {
                    return Err(ConfigError::InvalidAccount {
                        account: account.name.clone(),
                        problem: "maintenance reapply_minutes must be positive".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
