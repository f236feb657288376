//! Shared data structures for the fleet liveness supervisor
//!
//! This module defines the types that cross module boundaries:
//! - `AccountStatus`: lifecycle state of one monitored account
//! - `StatusEvent`: transition event broadcast to observers
//! - `AccountSnapshot`: dashboard-facing view of one account
//! - elapsed-minutes helpers used by every staleness predicate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Account Lifecycle Status
// ============================================================================

/// Lifecycle state of a monitored account.
///
/// `Unknown` is the state at creation, before the first liveness report.
/// The `Starting*` / `Restarting*` states are only reachable for accounts
/// that have a runtime environment bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum AccountStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Paused,
    StartingApp,
    StartingEnvironment,
    RestartingApp,
    RestartingEnvironment,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Unknown => write!(f, "Unknown"),
            AccountStatus::Online => write!(f, "Online"),
            AccountStatus::Offline => write!(f, "Offline"),
            AccountStatus::Paused => write!(f, "Paused"),
            AccountStatus::StartingApp => write!(f, "Starting App"),
            AccountStatus::StartingEnvironment => write!(f, "Starting Environment"),
            AccountStatus::RestartingApp => write!(f, "Restarting App"),
            AccountStatus::RestartingEnvironment => write!(f, "Restarting Environment"),
        }
    }
}

// ============================================================================
// Status Transition Events
// ============================================================================

/// Emitted on every account status transition.
///
/// The state machine is the producer; transport layers (event logger,
/// dashboards) subscribe via a `tokio::sync::broadcast` channel and must
/// tolerate lag — slow subscribers drop events, they are never buffered
/// unbounded.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    /// Account the transition belongs to
    pub account: String,
    /// Status the account left
    pub from: AccountStatus,
    /// Status the account entered
    pub to: AccountStatus,
    /// Transition timestamp
    pub at: DateTime<Utc>,
}

// ============================================================================
// Dashboard Snapshot
// ============================================================================

/// Point-in-time view of one account, served by `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    /// Account identifier
    pub name: String,
    /// Label of the bound runtime environment, or "None"
    pub runtime: String,
    /// Current lifecycle status
    pub status: AccountStatus,
    /// Timestamp of the last status transition
    pub last_update: DateTime<Utc>,
    /// Timestamp of the most recent liveness report, if any
    pub last_alive: Option<DateTime<Utc>>,
    /// Whether death detection and scheduled recovery are suppressed
    pub paused: bool,
    /// Whether a death escalation has fired for the current episode
    pub notified_death: bool,
    /// App restart attempts since the last reset
    pub app_restart_attempts: u32,
    /// Environment restart attempts since the last reset
    pub environment_restart_attempts: u32,
    /// Last applied maintenance parameter value, if any
    pub parameter_value: Option<String>,
}

// ============================================================================
// Time Helpers
// ============================================================================

/// Fractional minutes between two timestamps (`later - earlier`).
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// Fractional minutes elapsed since `t`.
pub fn minutes_since(t: DateTime<Utc>) -> f64 {
    minutes_between(t, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn minutes_between_is_fractional() {
        let start = Utc::now();
        let end = start + Duration::seconds(90);
        let minutes = minutes_between(start, end);
        assert!((minutes - 1.5).abs() < 1e-9);
    }

    #[test]
    fn minutes_since_backdated_timestamp() {
        let t = Utc::now() - Duration::minutes(21);
        assert!(minutes_since(t) > 20.0);
        assert!(minutes_since(t) < 22.0);
    }

    #[test]
    fn status_display_is_human_readable() {
        assert_eq!(AccountStatus::StartingEnvironment.to_string(), "Starting Environment");
        assert_eq!(AccountStatus::Online.to_string(), "Online");
    }
}
