//! File-backed update checker.
//!
//! A filesystem watcher records write/create notifications for the backing
//! file; a background flush thread collapses bursts into a single check
//! fired after a quiet period (default 1 s). The check compares the file's
//! last-write timestamp against the last-known-update timestamp, both
//! truncated to whole seconds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::store::StoreError;

use super::{truncate_to_seconds, Listeners, UpdateChecker, UpdateEvent, UpdateListener, UpdateSource};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// State shared between the caller, the watch callback and the flush
/// thread.
struct CheckCore {
    path: PathBuf,
    last_known: RwLock<Option<DateTime<Utc>>>,
    listeners: Listeners,
    /// Instant of the most recent raw notification; the flush thread fires
    /// once it has been quiet long enough.
    pending: RwLock<Option<Instant>>,
    quiet_period: Duration,
    running: AtomicBool,
}

impl CheckCore {
    fn run_check(&self) -> bool {
        self.listeners.emit(&UpdateEvent::CheckStarted);
        let result = self.check_file();
        let update_available = result.unwrap_or(false);
        if let Some(timestamp) = result.filter(|available| *available).and(self.file_mtime()) {
            self.listeners.emit(&UpdateEvent::UpdateAvailable {
                source: UpdateSource::File,
                timestamp,
            });
        }
        self.listeners
            .emit(&UpdateEvent::CheckFinished { update_available });
        update_available
    }

    fn file_mtime(&self) -> Option<DateTime<Utc>> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    /// `None` means the check itself failed; a missed check is recoverable
    /// on the next poll, so failures log a warning instead of crashing the
    /// watch loop.
    fn check_file(&self) -> Option<bool> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(false),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Error checking for file updates");
                return None;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Error reading file timestamp");
                return None;
            }
        };

        let current = truncate_to_seconds(modified);
        let last_known = self
            .last_known
            .read()
            .map(truncate_to_seconds)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Some(current > last_known)
    }
}

pub struct FileUpdateChecker {
    core: Arc<CheckCore>,
    watcher: Option<RecommendedWatcher>,
    flush_handle: Option<JoinHandle<()>>,
}

impl FileUpdateChecker {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_quiet_period(path, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(
        path: impl AsRef<Path>,
        quiet_period: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let core = Arc::new(CheckCore {
            path: path.clone(),
            last_known: RwLock::new(None),
            listeners: Listeners::new(),
            pending: RwLock::new(None),
            quiet_period,
            running: AtomicBool::new(true),
        });

        let file_name = path.file_name().map(|n| n.to_os_string());
        let callback_core = core.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    let concerns_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if concerns_file {
                        *callback_core.pending.write() = Some(Instant::now());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Watch error");
                }
            },
            Config::default(),
        )
        .map_err(|e| StoreError::Watch(e.to_string()))?;

        // Watch the containing directory so saves that replace the file
        // (temp + rename) are still seen.
        let watch_target = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .map_err(|e| StoreError::Watch(e.to_string()))?;

        let flush_core = core.clone();
        let flush_handle = std::thread::spawn(move || {
            let poll = Duration::from_millis(50).min(flush_core.quiet_period);
            while flush_core.running.load(Ordering::Relaxed) {
                std::thread::sleep(poll);
                let due = flush_core
                    .pending
                    .read()
                    .map(|t| t.elapsed() >= flush_core.quiet_period)
                    .unwrap_or(false);
                if due {
                    *flush_core.pending.write() = None;
                    flush_core.run_check();
                }
            }
            tracing::debug!("File update flush loop stopped");
        });

        Ok(Self {
            core,
            watcher: Some(watcher),
            flush_handle: Some(flush_handle),
        })
    }

    /// Record a known-good timestamp (e.g. right after this process saved
    /// or loaded the file) so it is not reported back as a foreign change.
    pub fn acknowledge(&self, timestamp: DateTime<Utc>) {
        *self.core.last_known.write() = Some(timestamp);
    }

    /// Stop the watch and the debounce thread. No events fire after this
    /// returns.
    pub fn stop(&mut self) {
        self.core.running.store(false, Ordering::Relaxed);
        *self.core.pending.write() = None;
        self.watcher.take();
        if let Some(handle) = self.flush_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileUpdateChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl UpdateChecker for FileUpdateChecker {
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
    use parking_lot::Mutex;
    use tempfile::tempdir;

    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    fn recorded_events(checker: &FileUpdateChecker) -> Arc<Mutex<Vec<UpdateEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        checker.subscribe(Box::new(move |event| sink.lock().push(event.clone())));
        events
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        condition()
    }

    #[test]
    fn test_sync_check_detects_existing_file() {
        init_tracing();
        let dir = tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "{}").unwrap();

        let checker = FileUpdateChecker::new(&path).unwrap();
        let events = recorded_events(&checker);

        // Nothing known yet: any existing file counts as an update.
        assert!(checker.is_update_available());

        let recorded = events.lock();
        assert!(matches!(recorded.first(), Some(UpdateEvent::CheckStarted)));
        assert!(recorded
            .iter()
            .any(|e| matches!(e, UpdateEvent::UpdateAvailable { source: UpdateSource::File, .. })));
        assert!(matches!(
            recorded.last(),
            Some(UpdateEvent::CheckFinished { update_available: true })
        ));
    }

    #[test]
    fn test_acknowledged_timestamp_suppresses_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "{}").unwrap();

        let checker = FileUpdateChecker::new(&path).unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        checker.acknowledge(DateTime::<Utc>::from(mtime));

        assert!(!checker.is_update_available());
    }

    #[test]
    fn test_missing_file_is_not_an_update() {
        let dir = tempdir().unwrap();
        let checker = FileUpdateChecker::new(dir.path().join("absent.json")).unwrap();
        assert!(!checker.is_update_available());
    }

    #[test]
    fn test_async_check_raises_same_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "{}").unwrap();

        let checker = FileUpdateChecker::new(&path).unwrap();
        let events = recorded_events(&checker);

        checker.check_async();
        assert!(wait_until(Duration::from_secs(3), || {
            events
                .lock()
                .iter()
                .any(|e| matches!(e, UpdateEvent::CheckFinished { .. }))
        }));
    }

    #[test]
    fn test_burst_of_writes_debounces_into_one_check() {
        init_tracing();
        let dir = tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "v0").unwrap();

        let checker =
            FileUpdateChecker::with_quiet_period(&path, Duration::from_millis(150)).unwrap();
        let events = recorded_events(&checker);

        for i in 0..5 {
            std::fs::write(&path, format!("v{i}")).unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(wait_until(Duration::from_secs(5), || {
            events
                .lock()
                .iter()
                .any(|e| matches!(e, UpdateEvent::UpdateAvailable { .. }))
        }));

        // The burst fell inside one quiet window: exactly one check ran.
        std::thread::sleep(Duration::from_millis(400));
        let starts = events
            .lock()
            .iter()
            .filter(|e| matches!(e, UpdateEvent::CheckStarted))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_stop_silences_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "v0").unwrap();

        let mut checker =
            FileUpdateChecker::with_quiet_period(&path, Duration::from_millis(100)).unwrap();
        let events = recorded_events(&checker);
        checker.stop();

        std::fs::write(&path, "v1").unwrap();
        std::thread::sleep(Duration::from_millis(400));
        assert!(events.lock().is_empty());
    }
}
