//! Relational update checker.
//!
//! No filesystem watch: each check queries the store's update metadata on
//! demand and compares second-truncated timestamps, raising the same
//! events as the file-backed variant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::codec::SqlStore;

use super::{truncate_to_seconds, Listeners, UpdateChecker, UpdateEvent, UpdateListener, UpdateSource};

struct CheckCore {
    store: Arc<SqlStore>,
    last_known: RwLock<Option<DateTime<Utc>>>,
    listeners: Listeners,
}

impl CheckCore {
    fn run_check(&self) -> bool {
        self.listeners.emit(&UpdateEvent::CheckStarted);

        let latest = match self.store.last_update() {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!(error = %e, "Error checking for database updates");
                None
            }
        };

        let last_known = self
            .last_known
            .read()
            .map(truncate_to_seconds)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let update_available = latest
            .map(|stamp| truncate_to_seconds(stamp) > last_known)
            .unwrap_or(false);

        if update_available {
            if let Some(timestamp) = latest {
                self.listeners.emit(&UpdateEvent::UpdateAvailable {
                    source: UpdateSource::Database,
                    timestamp,
                });
            }
        }
        self.listeners
            .emit(&UpdateEvent::CheckFinished { update_available });
        update_available
    }
}

pub struct SqlUpdateChecker {
    core: Arc<CheckCore>,
}

impl SqlUpdateChecker {
    pub fn new(store: Arc<SqlStore>) -> Self {
        Self {
            core: Arc::new(CheckCore {
                store,
                last_known: RwLock::new(None),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Record a known-good timestamp so this process's own writes are not
    /// reported back as foreign changes.
    pub fn acknowledge(&self, timestamp: DateTime<Utc>) {
        *self.core.last_known.write() = Some(timestamp);
    }
}

impl UpdateChecker for SqlUpdateChecker {
    fn is_update_available(&self) -> bool {
        self.core.run_check()
    }

    fn check_async(&self) {
        let core = self.core.clone();
        std::thread::spawn(move || {
            core.run_check();
        });
    }

    fn subscribe(&self, listener: UpdateListener) {
        self.core.listeners.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{SaveFilter, SqlStore};
    use crate::crypto::CryptoProvider;
    use crate::tree::RecordTree;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn saved_store() -> Arc<SqlStore> {
        let store = SqlStore::open_in_memory().unwrap();
        let mut tree = RecordTree::new();
        tree.add_root("Connections");
        store
            .save_tree(
                &tree,
                &SaveFilter::default(),
                &CryptoProvider::with_iterations(1),
                None,
            )
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_detects_foreign_write() {
        let checker = SqlUpdateChecker::new(saved_store());
        assert!(checker.is_update_available());
    }

    #[test]
    fn test_acknowledge_suppresses_own_write() {
        let store = saved_store();
        let stamp = store.last_update().unwrap().unwrap();
        let checker = SqlUpdateChecker::new(store);
        checker.acknowledge(stamp);
        assert!(!checker.is_update_available());
    }

    #[test]
    fn test_empty_store_has_no_update() {
        let store = Arc::new(SqlStore::open_in_memory().unwrap());
        let checker = SqlUpdateChecker::new(store);
        assert!(!checker.is_update_available());
    }

    #[test]
    fn test_events_fire_for_async_check() {
        let checker = SqlUpdateChecker::new(saved_store());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        checker.subscribe(Box::new(move |event| sink.lock().push(event.clone())));

        checker.check_async();

        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if events
                .lock()
                .iter()
                .any(|e| matches!(e, UpdateEvent::CheckFinished { update_available: true }))
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(25));
        }

        let recorded = events.lock();
        assert!(matches!(recorded.first(), Some(UpdateEvent::CheckStarted)));
        assert!(recorded.iter().any(|e| matches!(
            e,
            UpdateEvent::UpdateAvailable { source: UpdateSource::Database, .. }
        )));
    }
}
