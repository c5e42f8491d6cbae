use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::error::Result;

use super::SessionStore;

/// Manager responsible for sweeping idle sessions off disk.
#[derive(Clone)]
pub struct SessionJanitor {
    store: Arc<SessionStore>,
    interval_secs: u64,
}

impl SessionJanitor {
    pub fn new(store: Arc<SessionStore>, interval_secs: u64) -> Self {
        Self {
            store,
            interval_secs,
        }
    }

    /// Run a single sweep. Returns the number of sessions removed.
    pub async fn run_once(&self) -> Result<u64> {
        let removed = self.store.janitor_sweep(Utc::now()).await;

        match &removed {
            Ok(count) if *count > 0 => info!("Session janitor removed {count} idle sessions"),
            Ok(_) => {}
            Err(e) => error!("Session janitor failed: {e}"),
        }

        removed
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_once_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SessionStore::new(&SessionConfig {
                storage_path: dir.path().to_string_lossy().to_string(),
                recent_turns: 3,
                max_idle_hours: 24,
                janitor_interval_secs: 60,
            })
            .unwrap(),
        );

        let janitor = SessionJanitor::new(store, 60);
        assert_eq!(janitor.run_once().await.unwrap(), 0);
        assert_eq!(janitor.interval_secs(), 60);
    }
}
