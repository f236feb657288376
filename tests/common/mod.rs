//! Shared test doubles: a recording runtime adapter and a recording
//! notification sink. Both record synchronously so assertions are
//! deterministic.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use warden::account::Account;
use warden::config::AccountConfig;
use warden::notify::Notifier;
use warden::runtime::{RuntimeAdapter, RuntimeError};
use warden::types::StatusEvent;

/// Runtime adapter that records every call and always succeeds.
#[derive(Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<String>>,
}

impl RecordingRuntime {
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RuntimeAdapter for RecordingRuntime {
    fn label(&self) -> &str {
        "recording"
    }

    async fn start_app(&self) -> Result<(), RuntimeError> {
        self.record("start_app");
        Ok(())
    }

    async fn kill_app(&self) -> Result<(), RuntimeError> {
        self.record("kill_app");
        Ok(())
    }

    async fn start_environment(&self) -> Result<(), RuntimeError> {
        self.record("start_environment");
        Ok(())
    }

    async fn kill_environment(&self) -> Result<(), RuntimeError> {
        self.record("kill_environment");
        Ok(())
    }

    async fn minimize(&self) -> Result<(), RuntimeError> {
        self.record("minimize");
        Ok(())
    }

    async fn restore(&self) -> Result<(), RuntimeError> {
        self.record("restore");
        Ok(())
    }

    async fn run_setup(&self) -> Result<(), RuntimeError> {
        self.record("run_setup");
        Ok(())
    }

    async fn run_post_start(&self) -> Result<(), RuntimeError> {
        self.record("run_post_start");
        Ok(())
    }

    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RuntimeError> {
        self.record(format!("set_parameter:{}={}", name, value));
        Ok(())
    }
}

/// Notification sink that records deliveries synchronously.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, target: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((target.to_string(), message.to_string()));
    }
}

/// Account wired to a recording runtime and a throwaway event channel.
#[allow(dead_code)]
pub fn account_with_runtime(name: &str) -> (Account, Arc<RecordingRuntime>) {
    let runtime = Arc::new(RecordingRuntime::default());
    let mut cfg = AccountConfig::with_name(name);
    cfg.notify_target = Some("ops".to_string());
    let (tx, _rx) = broadcast::channel::<StatusEvent>(64);
    let account = Account::new(&cfg, Some(runtime.clone()), tx);
    (account, runtime)
}

/// Account with no runtime environment bound.
#[allow(dead_code)]
pub fn account_without_runtime(name: &str) -> Account {
    let mut cfg = AccountConfig::with_name(name);
    cfg.notify_target = Some("ops".to_string());
    let (tx, _rx) = broadcast::channel::<StatusEvent>(64);
    Account::new(&cfg, None, tx)
}
