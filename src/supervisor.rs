//! Supervisor tick loop — staleness detection and bounded recovery
//!
//! Once per interval the loop scans every account of the current registry
//! generation and takes at most one corrective action per account. The
//! checks run in strict priority order:
//!
//! 1. environment start in flight (grace / retry / escalate)
//! 2. app start in flight (grace / retry / fall back to environment restart)
//! 3. staleness (restart app, or escalate when no runtime is bound)
//! 4. periodic maintenance (Online accounts only)
//!
//! An account mid-environment-start must never be judged dead by the
//! staleness rule — its liveness clock is stale by definition during a
//! start, which is why the ordering matters.
//!
//! The loop awaits each full scan before the next `interval.tick()`, so
//! ticks cannot overlap. Per-account mutexes serialize the scan against
//! liveness reports and manual commands.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::notify::Notifier;
use crate::registry::SharedRegistry;

/// Run the periodic supervisor loop until cancelled.
pub async fn run_supervisor(
    registry: SharedRegistry,
    notifier: std::sync::Arc<dyn Notifier>,
    tick_interval_secs: u64,
    cancel_token: CancellationToken,
) {
    info!(tick_interval_secs, "supervisor loop started");

    let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_secs));
    // A slow scan delays the next tick instead of bursting to catch up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("supervisor loop received shutdown signal");
                return;
            }
            _ = interval.tick() => {}
        }

        let generation = registry.load_full();
        debug!(
            version = generation.version(),
            accounts = generation.len(),
            "supervisor tick"
        );

        for entry in generation.accounts() {
            let mut account = entry.lock().await;
            evaluate_account(&mut account, notifier.as_ref());
        }
    }
}

/// Evaluate one account and take at most one corrective action.
///
/// Pure state-machine driving: adapter side effects are spawned inside the
/// account's action methods, notification delivery is fire-and-forget, so
/// this never stalls the scan.
pub fn evaluate_account(account: &mut Account, notifier: &dyn Notifier) {
    if account.paused {
        debug!(account = %account.name, "paused, skipping");
        return;
    }

    if account.is_starting_environment() {
        if !account.environment_start_failed() {
            debug!(account = %account.name, "still starting environment");
            return;
        }
        if account.environment_restart_attempts < account.max_environment_restarts {
            warn!(
                account = %account.name,
                attempt = account.environment_restart_attempts + 1,
                max = account.max_environment_restarts,
                "environment start timed out, retrying"
            );
            account.restart_environment(false);
        } else if !account.notified_death {
            let message = format!(
                "{} failed to start its environment after {} attempts, giving up.",
                account.name, account.environment_restart_attempts
            );
            escalate(account, notifier, message);
        }
        return;
    }

    if account.is_starting_app() {
        if !account.app_start_failed() {
            debug!(account = %account.name, "still starting app");
            return;
        }
        if account.app_restart_attempts < account.max_app_restarts {
            warn!(
                account = %account.name,
                attempt = account.app_restart_attempts + 1,
                max = account.max_app_restarts,
                "app start timed out, retrying"
            );
            account.restart_app(false);
        } else {
            // A deeper reset is assumed recoverable where the app alone
            // was not: exhausting the app budget escalates to the
            // environment level, not to a human.
            warn!(
                account = %account.name,
                "app restart budget exhausted, restarting environment"
            );
            account.app_restart_attempts = 0;
            account.app_start_begin_at = None;
            account.restart_environment(false);
        }
        return;
    }

    if account.is_dead() && !account.notified_death {
        if account.has_runtime() {
            warn!(account = %account.name, "lost connection, restarting app");
            account.restart_app(false);
        } else {
            let last_alive = account
                .last_alive_at
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            let message = format!("{} lost connection, last alive: {}", account.name, last_alive);
            escalate(account, notifier, message);
        }
        return;
    }

    if account.status() == crate::types::AccountStatus::Online && account.maintenance_due() {
        account.apply_maintenance();
    }
}

/// Escalate a death episode to a human operator, at most once.
///
/// The escalation flag is set regardless of delivery success — the sink is
/// at-most-once per episode and delivery failures only show up in logs.
fn escalate(account: &mut Account, notifier: &dyn Notifier, message: String) {
    error!(account = %account.name, %message, "escalating to operator");
    if let Some(target) = account.notify_target.clone() {
        notifier.notify(&target, &message);
    }
    account.record_escalation();
}
