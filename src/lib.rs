//! Warden: fleet liveness supervisor
//!
//! Liveness monitoring and self-healing for a fleet of independently managed
//! accounts, each optionally bound to a controllable emulated runtime
//! environment.
//!
//! ## Architecture
//!
//! - **Account state machine**: per-account lifecycle, timers, retry
//!   counters, pause flag (`account`)
//! - **Supervisor loop**: periodic tick driving failure detection, bounded
//!   retries, and human escalation (`supervisor`)
//! - **Runtime adapters**: pluggable capability surface over emulator
//!   products (`runtime`)
//! - **Registry**: versioned account collection, atomically swapped on
//!   config reload (`registry`)
//! - **Transport**: HTTP intake and dashboard snapshots (`api`), escalation
//!   webhooks (`notify`)

pub mod account;
pub mod api;
pub mod command;
pub mod config;
pub mod notify;
pub mod registry;
pub mod runtime;
pub mod supervisor;
pub mod types;

// Re-export the core types
pub use account::Account;
pub use command::{Command, CommandError};
pub use config::{AccountConfig, SupervisorConfig};
pub use notify::Notifier;
pub use registry::{Registry, RegistryError, SharedRegistry};
pub use runtime::{RuntimeAdapter, RuntimeError};
pub use types::{AccountSnapshot, AccountStatus, StatusEvent};
