//! Polling-based config file watcher.
//!
//! Checks the config file's mtime every 2 seconds. When a change is
//! detected, debounces for 500ms (editors often write in stages), then
//! signals the reload task via an mpsc channel. The watcher itself never
//! touches the registry — reload and swap happen in one place, in the
//! reload task, so a broken file can never half-apply.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;

/// Events emitted by the config watcher.
#[derive(Debug)]
pub enum ConfigEvent {
    /// The config file changed on disk and settled.
    Changed,
}

/// Interval between mtime checks.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Debounce delay after detecting a change.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Run the config file watcher loop.
///
/// Polls `path` for mtime changes and sends [`ConfigEvent::Changed`] on
/// `tx`. Returns when the channel is closed.
pub async fn run_config_watcher(path: PathBuf, tx: mpsc::Sender<ConfigEvent>) {
    tracing::info!(path = %path.display(), "config watcher started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let current = match get_mtime(&path) {
            Some(t) => t,
            None => {
                // Only warn on the transition to missing.
                if last_mtime.is_some() {
                    tracing::warn!(
                        path = %path.display(),
                        "config file not accessible, keeping current config"
                    );
                    last_mtime = None;
                }
                continue;
            }
        };

        let changed = match last_mtime {
            Some(prev) => current != prev,
            None => true, // File reappeared
        };

        if !changed {
            continue;
        }

        // Debounce: wait, then re-check mtime to ensure the write settled.
        tokio::time::sleep(DEBOUNCE_DELAY).await;

        if get_mtime(&path) != Some(current) {
            // Still changing, catch it on the next poll cycle.
            continue;
        }

        last_mtime = Some(current);

        if tx.send(ConfigEvent::Changed).await.is_err() {
            tracing::debug!("config watcher channel closed, stopping");
            return;
        }
    }
}

/// Read the modification time of a file, returning None on any error.
fn get_mtime(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
