//! Supervisor tick scenarios
//!
//! Drives `supervisor::evaluate_account` against single accounts with
//! backdated timestamps, covering staleness escalation, bounded start
//! retries, the app→environment fallback, pause suppression, and the
//! at-most-once escalation guarantee.

mod common;

use chrono::{Duration, Utc};
use common::{account_without_runtime, account_with_runtime, RecordingNotifier};
use warden::supervisor::evaluate_account;
use warden::types::{minutes_since, AccountStatus};

/// Stale account with no environment bound: exactly one notification,
/// Offline, notified.
#[tokio::test]
async fn stale_account_without_runtime_escalates_once() {
    let mut account = account_without_runtime("a1");
    account.death_threshold_minutes = 20.0;
    account.report_alive();
    account.last_alive_at = Some(Utc::now() - Duration::minutes(21));

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "ops");
    assert!(messages[0].1.contains("a1"));
    assert!(messages[0].1.contains("lost connection"));
    assert_eq!(account.status(), AccountStatus::Offline);
    assert!(account.notified_death);

    // Still dead on the next tick, but already notified: no second message.
    evaluate_account(&mut account, &notifier);
    assert_eq!(notifier.messages().len(), 1);
}

/// Environment start timed out under budget: retry, counter +1, timer
/// re-armed to now.
#[tokio::test]
async fn environment_start_timeout_retries_under_budget() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.environment_start_limit_minutes = 2.0;
    account.start_environment();
    account.environment_start_begin_at = Some(Utc::now() - Duration::minutes(3));

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert_eq!(account.environment_restart_attempts, 1);
    assert_eq!(account.status(), AccountStatus::StartingEnvironment);
    let begin = account.environment_start_begin_at.expect("timer re-armed");
    assert!(minutes_since(begin) < 0.1, "begin timestamp reset to now");
    assert!(notifier.messages().is_empty());
}

/// Environment budget exhausted: one notification, Offline, no retry.
#[tokio::test]
async fn environment_budget_exhausted_escalates() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.environment_start_limit_minutes = 2.0;
    account.max_environment_restarts = 3;
    account.start_environment();
    account.environment_start_begin_at = Some(Utc::now() - Duration::minutes(3));
    account.environment_restart_attempts = 3;

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert_eq!(notifier.messages().len(), 1);
    assert!(notifier.messages()[0].1.contains("giving up"));
    assert_eq!(account.status(), AccountStatus::Offline);
    assert!(account.notified_death);
    assert_eq!(account.environment_restart_attempts, 3, "no further retry");
    assert!(!account.is_starting_environment());

    evaluate_account(&mut account, &notifier);
    assert_eq!(notifier.messages().len(), 1, "escalation fires at most once");
}

/// App budget exhausted: fall back to an environment restart, not a human.
#[tokio::test]
async fn app_budget_exhausted_falls_back_to_environment_restart() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.app_start_limit_minutes = 3.0;
    account.max_app_restarts = 3;
    account.start_app();
    account.app_start_begin_at = Some(Utc::now() - Duration::minutes(4));
    account.app_restart_attempts = 3;

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert!(notifier.messages().is_empty());
    assert_eq!(account.app_restart_attempts, 0, "app counter reset");
    assert_eq!(account.environment_restart_attempts, 1);
    assert_eq!(account.status(), AccountStatus::StartingEnvironment);
    assert!(!account.is_starting_app());
    assert!(account.is_starting_environment());
}

/// App start timed out under budget: retry increments by exactly one.
#[tokio::test]
async fn app_start_timeout_retries_under_budget() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.start_app();
    account.app_start_begin_at = Some(Utc::now() - Duration::minutes(4));

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);
    assert_eq!(account.app_restart_attempts, 1);
    assert_eq!(account.status(), AccountStatus::StartingApp);

    account.app_start_begin_at = Some(Utc::now() - Duration::minutes(4));
    evaluate_account(&mut account, &notifier);
    assert_eq!(account.app_restart_attempts, 2);
}

/// Paused accounts are never dead and never acted upon.
#[tokio::test]
async fn paused_account_is_skipped_entirely() {
    let mut account = account_without_runtime("a1");
    account.report_alive();
    assert!(account.toggle_pause());
    account.last_alive_at = Some(Utc::now() - Duration::minutes(1000));

    assert!(!account.is_dead());

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert!(notifier.messages().is_empty());
    assert_eq!(account.status(), AccountStatus::Paused);
    assert!(!account.notified_death);
}

/// A paused account mid-start gets a fresh time budget on resume.
#[tokio::test]
async fn resume_rebases_in_flight_start_timer() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.report_alive();
    account.start_app();
    account.app_start_begin_at = Some(Utc::now() - Duration::minutes(2));

    assert!(account.toggle_pause());
    assert!(account.toggle_pause());

    let begin = account.app_start_begin_at.expect("still starting app");
    assert!(minutes_since(begin) < 0.1, "timer re-armed on resume");
    assert_eq!(account.status(), AccountStatus::StartingApp);
    assert_eq!(account.app_restart_attempts, 0);
}

/// A report arriving while paused mid-environment-start still chains into
/// the app start, but the visible status stays Paused until resume.
#[tokio::test]
async fn report_while_paused_mid_environment_start_keeps_paused_status() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.report_alive();
    account.start_environment();
    assert!(account.toggle_pause());

    account.report_alive();
    assert!(account.paused);
    assert_eq!(account.status(), AccountStatus::Paused);
    assert!(!account.is_starting_environment());
    assert!(account.is_starting_app(), "chained app start is armed");

    // Resume re-derives the real status from the in-flight timer.
    assert!(account.toggle_pause());
    assert_eq!(account.status(), AccountStatus::StartingApp);
}

/// Dead account with a runtime bound gets an app restart, not a human.
#[tokio::test]
async fn dead_account_with_runtime_restarts_app() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.report_alive();
    account.last_alive_at = Some(Utc::now() - Duration::minutes(30));
    assert!(account.is_dead());

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert!(notifier.messages().is_empty());
    assert_eq!(account.app_restart_attempts, 1);
    assert_eq!(account.status(), AccountStatus::StartingApp);
    assert!(account.last_alive_at.is_none(), "liveness clock cleared");

    // While the fresh start is in its grace period the staleness rule
    // must not fire again.
    evaluate_account(&mut account, &notifier);
    assert_eq!(account.app_restart_attempts, 1);
    assert!(notifier.messages().is_empty());
}

/// A liveness report mid-environment-start confirms the environment and
/// chains into the app start; the next report confirms the app.
#[tokio::test]
async fn report_chain_confirms_environment_then_app() {
    let (mut account, runtime) = account_with_runtime("a1");
    account.start_environment();
    account.environment_restart_attempts = 2;

    account.report_alive();
    assert!(!account.is_starting_environment());
    assert!(account.is_starting_app());
    assert_eq!(account.environment_restart_attempts, 0);
    assert_eq!(account.status(), AccountStatus::StartingApp);

    account.app_restart_attempts = 1;
    account.report_alive();
    assert!(!account.is_starting_app());
    assert_eq!(account.app_restart_attempts, 0);
    assert_eq!(account.status(), AccountStatus::Online);
    assert!(!account.notified_death);

    // Let spawned adapter calls drain, then check the post-start action ran.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let calls = runtime.calls();
    assert!(calls.contains(&"run_post_start".to_string()));
}

/// Maintenance parameter reapplied only when Online and due.
#[tokio::test]
async fn maintenance_reapplies_when_online_and_due() {
    let (mut account, runtime) = account_with_runtime("a1");
    account.maintenance = Some(warden::config::MaintenanceConfig {
        parameter: "gravity".to_string(),
        value: "9.81".to_string(),
        reapply_minutes: 30.0,
    });
    account.report_alive();

    let notifier = RecordingNotifier::default();
    evaluate_account(&mut account, &notifier);

    assert_eq!(account.parameter_value.as_deref(), Some("gravity=9.81"));
    assert!(account.last_maintenance_at.is_some());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(runtime
        .calls()
        .contains(&"set_parameter:gravity=9.81".to_string()));

    // Not due again immediately.
    let applied_at = account.last_maintenance_at;
    evaluate_account(&mut account, &notifier);
    assert_eq!(account.last_maintenance_at, applied_at);
}

/// Manual restarts reset the retry counter instead of incrementing it.
#[tokio::test]
async fn manual_restart_resets_counter() {
    let (mut account, _runtime) = account_with_runtime("a1");
    account.report_alive();
    account.restart_app(false);
    account.restart_app(false);
    assert_eq!(account.app_restart_attempts, 2);

    account.restart_app(true);
    assert_eq!(account.app_restart_attempts, 0);
    assert_eq!(account.status(), AccountStatus::StartingApp);
}
