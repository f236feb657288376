//! Account state machine — the core of the supervisor
//!
//! One `Account` owns the full lifecycle of one monitored unit: its liveness
//! clock, in-flight start timers, retry counters, pause flag, and status.
//! Action methods delegate process control to the bound [`RuntimeAdapter`];
//! adapter calls are spawned and never awaited here — the begin-timestamp
//! plus time-limit pair stands in for a completion signal, and success is
//! only ever inferred from the next liveness report.
//!
//! Every status transition is emitted on a broadcast channel so transport
//! layers can observe the fleet without the state machine knowing about them.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{AccountConfig, MaintenanceConfig};
use crate::runtime::{RuntimeAdapter, RuntimeError};
use crate::types::{minutes_since, AccountSnapshot, AccountStatus, StatusEvent};

/// State machine for one monitored account.
pub struct Account {
    /// Unique identifier, immutable after creation.
    pub name: String,
    status: AccountStatus,
    /// Most recent liveness report; `None` means never reported or cleared
    /// by a recovery action.
    pub last_alive_at: Option<DateTime<Utc>>,
    /// Timestamp of the last status transition (observability only).
    pub last_status_change_at: DateTime<Utc>,
    /// Staleness bound: exceeding it with no start in flight marks the
    /// account dead.
    pub death_threshold_minutes: f64,
    /// While true, death detection and scheduled recovery are suppressed.
    pub paused: bool,
    /// Set once escalation fires; cleared only by a fresh liveness report.
    pub notified_death: bool,
    /// In-flight app start attempt, if any.
    pub app_start_begin_at: Option<DateTime<Utc>>,
    /// In-flight environment start attempt, if any.
    pub environment_start_begin_at: Option<DateTime<Utc>>,
    pub app_start_limit_minutes: f64,
    pub environment_start_limit_minutes: f64,
    pub app_restart_attempts: u32,
    pub environment_restart_attempts: u32,
    pub max_app_restarts: u32,
    pub max_environment_restarts: u32,
    /// Escalation target handed to the notification sink.
    pub notify_target: Option<String>,
    /// Optional periodic parameter reapplication.
    pub maintenance: Option<MaintenanceConfig>,
    /// When the maintenance parameter was last applied.
    pub last_maintenance_at: Option<DateTime<Utc>>,
    /// Last applied parameter value (dashboard visibility).
    pub parameter_value: Option<String>,
    runtime: Option<Arc<dyn RuntimeAdapter>>,
    events: broadcast::Sender<StatusEvent>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("last_alive_at", &self.last_alive_at)
            .field("last_status_change_at", &self.last_status_change_at)
            .field("death_threshold_minutes", &self.death_threshold_minutes)
            .field("paused", &self.paused)
            .field("notified_death", &self.notified_death)
            .field("app_start_begin_at", &self.app_start_begin_at)
            .field("environment_start_begin_at", &self.environment_start_begin_at)
            .field("app_start_limit_minutes", &self.app_start_limit_minutes)
            .field("environment_start_limit_minutes", &self.environment_start_limit_minutes)
            .field("app_restart_attempts", &self.app_restart_attempts)
            .field("environment_restart_attempts", &self.environment_restart_attempts)
            .field("max_app_restarts", &self.max_app_restarts)
            .field("max_environment_restarts", &self.max_environment_restarts)
            .field("notify_target", &self.notify_target)
            .field("maintenance", &self.maintenance)
            .field("last_maintenance_at", &self.last_maintenance_at)
            .field("parameter_value", &self.parameter_value)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Build an account from its configuration entry.
    pub fn new(
        cfg: &AccountConfig,
        runtime: Option<Arc<dyn RuntimeAdapter>>,
        events: broadcast::Sender<StatusEvent>,
    ) -> Self {
        Self {
            name: cfg.name.clone(),
            status: AccountStatus::Unknown,
            last_alive_at: None,
            last_status_change_at: Utc::now(),
            death_threshold_minutes: cfg.death_threshold_minutes,
            paused: false,
            notified_death: false,
            app_start_begin_at: None,
            environment_start_begin_at: None,
            app_start_limit_minutes: cfg.app_start_limit_minutes,
            environment_start_limit_minutes: cfg.environment_start_limit_minutes,
            app_restart_attempts: 0,
            environment_restart_attempts: 0,
            max_app_restarts: cfg.max_app_restarts,
            max_environment_restarts: cfg.max_environment_restarts,
            notify_target: cfg.notify_target.clone(),
            maintenance: cfg.maintenance.clone(),
            last_maintenance_at: None,
            parameter_value: None,
            runtime,
            events,
        }
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn has_runtime(&self) -> bool {
        self.runtime.is_some()
    }

    /// Staleness verdict. Always false while paused or before the first
    /// liveness report.
    pub fn is_dead(&self) -> bool {
        if self.paused {
            return false;
        }
        match self.last_alive_at {
            Some(t) => minutes_since(t) > self.death_threshold_minutes,
            None => false,
        }
    }

    pub fn is_starting_app(&self) -> bool {
        self.app_start_begin_at.is_some()
    }

    pub fn is_starting_environment(&self) -> bool {
        self.environment_start_begin_at.is_some()
    }

    /// In-flight app start has outlived its time budget.
    pub fn app_start_failed(&self) -> bool {
        match self.app_start_begin_at {
            Some(t) => minutes_since(t) > self.app_start_limit_minutes,
            None => false,
        }
    }

    /// In-flight environment start has outlived its time budget.
    pub fn environment_start_failed(&self) -> bool {
        match self.environment_start_begin_at {
            Some(t) => minutes_since(t) > self.environment_start_limit_minutes,
            None => false,
        }
    }

    /// Maintenance parameter is configured and its reapply interval elapsed.
    pub fn maintenance_due(&self) -> bool {
        let Some(m) = &self.maintenance else {
            return false;
        };
        match self.last_maintenance_at {
            Some(t) => minutes_since(t) >= m.reapply_minutes,
            None => true,
        }
    }

    // ========================================================================
    // Liveness intake
    // ========================================================================

    /// Process one liveness report from the external probe.
    ///
    /// Three intake cases, mirroring the transition table:
    /// - environment start in flight: the probe only runs once the
    ///   environment's service layer is up, so a report confirms the
    ///   environment — clear its timer and move on to starting the app
    /// - app start in flight: the report confirms the app — clear the timer
    ///   and fire the one-time post-start action
    /// - otherwise: plain liveness; refresh the clock and clear any pending
    ///   escalation flag
    pub fn report_alive(&mut self) {
        if self.is_starting_environment() {
            self.environment_start_begin_at = None;
            self.environment_restart_attempts = 0;
            info!(
                account = %self.name,
                "environment started successfully, starting app now"
            );
            self.start_app();
            return;
        }

        if self.is_starting_app() {
            self.app_start_begin_at = None;
            self.app_restart_attempts = 0;
            info!(account = %self.name, "app started successfully");
            self.run_post_start_action();
        } else if self.is_dead() {
            info!(account = %self.name, "back online");
        } else {
            debug!(account = %self.name, "reported alive");
        }

        self.last_alive_at = Some(Utc::now());
        self.notified_death = false;
        self.set_status(AccountStatus::Online);
    }

    // ========================================================================
    // App lifecycle actions
    // ========================================================================

    /// Terminate the guest app. No-op without a bound runtime.
    pub fn kill_app(&mut self) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "kill app ignored, no runtime bound");
            return;
        };
        self.last_alive_at = None;
        self.app_start_begin_at = None;
        self.set_status(AccountStatus::Offline);
        self.spawn_adapter("kill app", async move { rt.kill_app().await });
    }

    /// Launch the guest app and arm the start timer.
    pub fn start_app(&mut self) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "start app ignored, no runtime bound");
            return;
        };
        self.app_start_begin_at = Some(Utc::now());
        self.set_status(AccountStatus::StartingApp);
        self.spawn_adapter("start app", async move { rt.start_app().await });
    }

    /// Kill then relaunch the guest app.
    ///
    /// `manual` restarts reset the retry counter; supervisor-driven restarts
    /// increment it by exactly one.
    pub fn restart_app(&mut self, manual: bool) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "restart app ignored, no runtime bound");
            return;
        };
        if manual {
            self.app_restart_attempts = 0;
        } else {
            self.app_restart_attempts += 1;
        }
        self.set_status(AccountStatus::RestartingApp);
        self.last_alive_at = None;
        self.app_start_begin_at = Some(Utc::now());
        self.set_status(AccountStatus::StartingApp);
        self.spawn_adapter("restart app", async move {
            if let Err(e) = rt.kill_app().await {
                warn!(error = %e, "kill before app restart failed, starting anyway");
            }
            rt.start_app().await
        });
    }

    // ========================================================================
    // Environment lifecycle actions
    // ========================================================================

    /// Shut the environment down. Clears both start timers — nothing can be
    /// mid-start inside an environment that is going away.
    pub fn kill_environment(&mut self) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "kill environment ignored, no runtime bound");
            return;
        };
        self.last_alive_at = None;
        self.app_start_begin_at = None;
        self.environment_start_begin_at = None;
        self.set_status(AccountStatus::Offline);
        self.spawn_adapter("kill environment", async move { rt.kill_environment().await });
    }

    /// Boot the environment and arm the start timer.
    pub fn start_environment(&mut self) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "start environment ignored, no runtime bound");
            return;
        };
        self.app_start_begin_at = None;
        self.environment_start_begin_at = Some(Utc::now());
        self.set_status(AccountStatus::StartingEnvironment);
        self.spawn_adapter("start environment", async move { rt.start_environment().await });
    }

    /// Kill then reboot the environment.
    pub fn restart_environment(&mut self, manual: bool) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "restart environment ignored, no runtime bound");
            return;
        };
        if manual {
            self.environment_restart_attempts = 0;
        } else {
            self.environment_restart_attempts += 1;
        }
        self.set_status(AccountStatus::RestartingEnvironment);
        self.last_alive_at = None;
        self.app_start_begin_at = None;
        self.environment_start_begin_at = Some(Utc::now());
        self.set_status(AccountStatus::StartingEnvironment);
        self.spawn_adapter("restart environment", async move {
            if let Err(e) = rt.kill_environment().await {
                warn!(error = %e, "kill before environment restart failed, starting anyway");
            }
            rt.start_environment().await
        });
    }

    // ========================================================================
    // Window / setup / parameter actions
    // ========================================================================

    pub fn minimize(&self) {
        if let Some(rt) = self.runtime.clone() {
            self.spawn_adapter("minimize", async move { rt.minimize().await });
        }
    }

    pub fn restore(&self) {
        if let Some(rt) = self.runtime.clone() {
            self.spawn_adapter("restore", async move { rt.restore().await });
        }
    }

    /// Re-run the in-guest service setup on demand.
    pub fn run_setup(&self) {
        if let Some(rt) = self.runtime.clone() {
            self.spawn_adapter("service setup", async move { rt.run_setup().await });
        }
    }

    /// One-time action after a confirmed app start. Fire-and-forget; errors
    /// are logged in the spawned task and never propagated.
    fn run_post_start_action(&self) {
        if let Some(rt) = self.runtime.clone() {
            self.spawn_adapter("post-start action", async move {
                match rt.run_post_start().await {
                    // Not having one configured is the common case.
                    Err(RuntimeError::NotConfigured(_)) => Ok(()),
                    other => other,
                }
            });
        }
    }

    /// Change a runtime parameter now. The new value also replaces the
    /// maintenance value for that parameter, so periodic reapplication keeps
    /// applying what the operator last asked for.
    pub fn set_parameter(&mut self, name: &str, value: &str) {
        let Some(rt) = self.runtime.clone() else {
            warn!(account = %self.name, "set parameter ignored, no runtime bound");
            return;
        };
        self.parameter_value = Some(format!("{}={}", name, value));
        self.last_maintenance_at = Some(Utc::now());
        if let Some(m) = &mut self.maintenance {
            if m.parameter == name {
                m.value = value.to_string();
            }
        }
        let (name, value) = (name.to_string(), value.to_string());
        self.spawn_adapter("set parameter", async move {
            rt.set_parameter(&name, &value).await
        });
    }

    /// Reapply the configured maintenance parameter.
    pub fn apply_maintenance(&mut self) {
        let Some(m) = self.maintenance.clone() else {
            return;
        };
        info!(
            account = %self.name,
            parameter = %m.parameter,
            value = %m.value,
            "reapplying maintenance parameter"
        );
        self.set_parameter(&m.parameter, &m.value);
    }

    // ========================================================================
    // Pause
    // ========================================================================

    /// Toggle the pause flag.
    ///
    /// Pausing is refused while the account is Unknown or Offline — there is
    /// nothing meaningful to pause. Resuming re-bases any in-flight start
    /// timer and the liveness clock to now, granting a fresh budget instead
    /// of resuming the old clock, and resets both retry counters.
    ///
    /// Returns whether the flag actually flipped.
    pub fn toggle_pause(&mut self) -> bool {
        if !self.paused {
            if matches!(self.status, AccountStatus::Unknown | AccountStatus::Offline) {
                warn!(
                    account = %self.name,
                    status = %self.status,
                    "refusing to pause account in this status"
                );
                return false;
            }
            self.paused = true;
            self.set_status(AccountStatus::Paused);
            info!(account = %self.name, "paused");
            return true;
        }

        self.paused = false;
        self.app_restart_attempts = 0;
        self.environment_restart_attempts = 0;
        let now = Utc::now();
        if self.environment_start_begin_at.is_some() {
            self.environment_start_begin_at = Some(now);
            self.set_status(AccountStatus::StartingEnvironment);
        } else if self.app_start_begin_at.is_some() {
            self.app_start_begin_at = Some(now);
            self.set_status(AccountStatus::StartingApp);
        } else {
            self.last_alive_at = Some(now);
            self.set_status(AccountStatus::Online);
        }
        info!(account = %self.name, "resumed");
        true
    }

    // ========================================================================
    // Escalation
    // ========================================================================

    /// Record that escalation fired for the current death episode: the
    /// account is conclusively Offline until the next liveness report, and
    /// no further notification may fire until then.
    pub fn record_escalation(&mut self) {
        self.notified_death = true;
        self.app_start_begin_at = None;
        self.environment_start_begin_at = None;
        self.set_status(AccountStatus::Offline);
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Dashboard-facing snapshot.
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            name: self.name.clone(),
            runtime: self
                .runtime
                .as_ref()
                .map(|r| r.label().to_string())
                .unwrap_or_else(|| "None".to_string()),
            status: self.status,
            last_update: self.last_status_change_at,
            last_alive: self.last_alive_at,
            paused: self.paused,
            notified_death: self.notified_death,
            app_restart_attempts: self.app_restart_attempts,
            environment_restart_attempts: self.environment_restart_attempts,
            parameter_value: self.parameter_value.clone(),
        }
    }

    fn set_status(&mut self, status: AccountStatus) {
        // While paused the visible status stays Paused even as timers keep
        // moving underneath (e.g. a report mid-environment-start chains into
        // the app start); resume re-derives the real status from the timers.
        if self.paused && status != AccountStatus::Paused {
            return;
        }
        if self.status == status {
            return;
        }
        let event = StatusEvent {
            account: self.name.clone(),
            from: self.status,
            to: status,
            at: Utc::now(),
        };
        self.status = status;
        self.last_status_change_at = event.at;
        debug!(account = %self.name, from = %event.from, to = %event.to, "status transition");
        // Send fails only when nobody subscribes, which is fine.
        let _ = self.events.send(event);
    }

    /// Fire an adapter call without awaiting it. The begin-timestamp plus
    /// time-limit pair is the failure detector; the task only logs.
    fn spawn_adapter<F>(&self, action: &'static str, fut: F)
    where
        F: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        let account = self.name.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!(account = %account, %action, error = %e, "adapter call failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use chrono::Duration;

    fn bare_account(name: &str) -> Account {
        let cfg = AccountConfig::with_name(name);
        let (tx, _rx) = broadcast::channel(16);
        Account::new(&cfg, None, tx)
    }

    #[test]
    fn new_account_is_unknown_and_not_dead() {
        let account = bare_account("a1");
        assert_eq!(account.status(), AccountStatus::Unknown);
        assert!(!account.is_dead());
        assert!(!account.is_starting_app());
        assert!(!account.is_starting_environment());
    }

    #[test]
    fn report_alive_sets_online_and_clears_notified() {
        let mut account = bare_account("a1");
        account.notified_death = true;
        account.report_alive();
        assert_eq!(account.status(), AccountStatus::Online);
        assert!(!account.notified_death);
        assert!(account.last_alive_at.is_some());
    }

    #[test]
    fn report_alive_is_idempotent() {
        let mut account = bare_account("a1");
        account.report_alive();
        let first = account.status();
        account.report_alive();
        assert_eq!(account.status(), first);
        assert_eq!(account.status(), AccountStatus::Online);
        assert!(!account.notified_death);
        assert!(!account.is_starting_app());
        assert!(!account.is_starting_environment());
    }

    #[test]
    fn stale_account_is_dead_unless_paused() {
        let mut account = bare_account("a1");
        account.report_alive();
        account.last_alive_at = Some(Utc::now() - Duration::minutes(1000));
        assert!(account.is_dead());

        assert!(account.toggle_pause());
        assert!(account.paused);
        assert!(!account.is_dead());
    }

    #[test]
    fn death_threshold_boundary() {
        let mut account = bare_account("a1");
        account.death_threshold_minutes = 20.0;
        account.last_alive_at = Some(Utc::now() - Duration::minutes(19));
        assert!(!account.is_dead());
        account.last_alive_at = Some(Utc::now() - Duration::minutes(21));
        assert!(account.is_dead());
    }

    #[test]
    fn pause_refused_from_unknown_and_offline() {
        let mut account = bare_account("a1");
        assert!(!account.toggle_pause());
        assert_eq!(account.status(), AccountStatus::Unknown);
        assert!(!account.paused);

        account.report_alive();
        account.record_escalation();
        assert_eq!(account.status(), AccountStatus::Offline);
        assert!(!account.toggle_pause());
        assert!(!account.paused);
        assert_eq!(account.status(), AccountStatus::Offline);
    }

    #[test]
    fn resume_without_start_in_flight_rebases_liveness() {
        let mut account = bare_account("a1");
        account.report_alive();
        account.last_alive_at = Some(Utc::now() - Duration::minutes(1000));
        assert!(account.toggle_pause());
        assert!(account.toggle_pause());
        assert!(!account.paused);
        assert_eq!(account.status(), AccountStatus::Online);
        assert!(!account.is_dead());
    }

    #[test]
    fn start_limits_use_fractional_minutes() {
        let mut account = bare_account("a1");
        account.app_start_limit_minutes = 0.5;
        account.app_start_begin_at = Some(Utc::now() - Duration::seconds(45));
        assert!(account.app_start_failed());
        account.app_start_begin_at = Some(Utc::now() - Duration::seconds(15));
        assert!(!account.app_start_failed());
    }

    #[test]
    fn record_escalation_marks_offline_once() {
        let mut account = bare_account("a1");
        account.report_alive();
        account.record_escalation();
        assert!(account.notified_death);
        assert_eq!(account.status(), AccountStatus::Offline);
        assert!(!account.is_starting_app());
        assert!(!account.is_starting_environment());

        // Cleared only by a fresh report.
        account.report_alive();
        assert!(!account.notified_death);
        assert_eq!(account.status(), AccountStatus::Online);
    }

    #[test]
    fn actions_without_runtime_are_noops() {
        let mut account = bare_account("a1");
        account.report_alive();
        account.start_app();
        assert!(!account.is_starting_app());
        account.restart_environment(false);
        assert_eq!(account.environment_restart_attempts, 0);
        assert_eq!(account.status(), AccountStatus::Online);
    }

    #[test]
    fn maintenance_due_respects_interval() {
        let mut account = bare_account("a1");
        assert!(!account.maintenance_due());

        account.maintenance = Some(MaintenanceConfig {
            parameter: "fps".to_string(),
            value: "60".to_string(),
            reapply_minutes: 30.0,
        });
        assert!(account.maintenance_due());

        account.last_maintenance_at = Some(Utc::now() - Duration::minutes(10));
        assert!(!account.maintenance_due());
        account.last_maintenance_at = Some(Utc::now() - Duration::minutes(31));
        assert!(account.maintenance_due());
    }
}
