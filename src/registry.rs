//! Versioned account registry
//!
//! The registry owns the account collection for one configuration
//! generation. It is immutable after build — reload constructs a new
//! registry from the fresh config and atomically swaps it into the shared
//! `ArcSwap` handle; ticks or requests still holding the old generation
//! finish against abandoned accounts and their work is simply discarded.
//!
//! Per-account `tokio::sync::Mutex` serializes the three writers (tick
//! loop, liveness intake, command handlers) on one account's state.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::account::Account;
use crate::config::SupervisorConfig;
use crate::runtime;
use crate::types::StatusEvent;

/// Shared handle to the current registry generation.
pub type SharedRegistry = Arc<ArcSwap<Registry>>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown account \"{0}\"")]
    UnknownAccount(String),
}

/// One generation of the monitored fleet.
pub struct Registry {
    version: u64,
    accounts: Vec<Arc<Mutex<Account>>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry from configuration. Adapter construction happens
    /// here; the rest of the system only ever sees trait objects.
    ///
    /// Assumes the config already passed validation (unique, non-empty
    /// names) — duplicates would silently shadow in the index otherwise.
    pub fn build(
        config: &SupervisorConfig,
        events: broadcast::Sender<StatusEvent>,
        version: u64,
    ) -> Self {
        let mut accounts = Vec::with_capacity(config.accounts.len());
        let mut index = HashMap::with_capacity(config.accounts.len());

        for cfg in &config.accounts {
            let adapter = cfg.runtime.as_ref().map(runtime::build);
            let account = Account::new(cfg, adapter, events.clone());
            index.insert(account.name.clone(), accounts.len());
            accounts.push(Arc::new(Mutex::new(account)));
        }

        info!(version, accounts = accounts.len(), "registry built");
        Registry {
            version,
            accounts,
            index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All accounts in configuration order.
    pub fn accounts(&self) -> &[Arc<Mutex<Account>>] {
        &self.accounts
    }

    /// Look an account up by name.
    pub fn get(&self, name: &str) -> Result<Arc<Mutex<Account>>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.accounts[i]))
            .ok_or_else(|| RegistryError::UnknownAccount(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;

    fn registry_with(names: &[&str]) -> Registry {
        let config = SupervisorConfig {
            supervisor: Default::default(),
            server: Default::default(),
            notifier: Default::default(),
            accounts: names.iter().map(|n| AccountConfig::with_name(n)).collect(),
        };
        let (tx, _rx) = broadcast::channel(16);
        Registry::build(&config, tx, 1)
    }

    #[test]
    fn lookup_by_name() {
        let registry = registry_with(&["alpha", "beta"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.version(), 1);

        let account = registry.get("beta").unwrap();
        let name = tokio_test::block_on(async { account.lock().await.name.clone() });
        assert_eq!(name, "beta");
    }

    #[test]
    fn unknown_account_is_an_error() {
        let registry = registry_with(&["alpha"]);
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAccount(name) if name == "missing"));
    }
}
