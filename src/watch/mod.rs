//! Change Detection Module
//!
//! Watches a persisted store for modifications made by other processes and
//! raises an availability signal. Two variants share one contract: a
//! file-backed watcher with debounced filesystem notifications, and a
//! relational variant that queries store metadata on demand.

pub mod file;
pub mod sql;

pub use file::FileUpdateChecker;
pub use sql::SqlUpdateChecker;

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    File,
    Database,
}

#[derive(Debug, Clone)]
pub enum UpdateEvent {
    CheckStarted,
    CheckFinished { update_available: bool },
    UpdateAvailable {
        source: UpdateSource,
        timestamp: DateTime<Utc>,
    },
}

pub type UpdateListener = Box<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Shared contract of both checker variants. The asynchronous check never
/// blocks its caller and delivers the same events as the synchronous path.
pub trait UpdateChecker {
    fn is_update_available(&self) -> bool;
    fn check_async(&self);
    fn subscribe(&self, listener: UpdateListener);
}

/// Listener registry shared between the caller and background contexts.
#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<RwLock<Vec<UpdateListener>>>);

impl Listeners {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, listener: UpdateListener) {
        self.0.write().push(listener);
    }

    pub(crate) fn emit(&self, event: &UpdateEvent) {
        for listener in self.0.read().iter() {
            listener(event);
        }
    }
}

/// Different file systems report sub-second precision inconsistently, so
/// comparisons run on whole seconds.
pub(crate) fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncation_drops_subsecond_noise() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 42).unwrap();
        let noisy = base + chrono::Duration::milliseconds(738);
        assert_eq!(truncate_to_seconds(noisy), base);
        assert!(truncate_to_seconds(noisy) <= truncate_to_seconds(base));
    }
}
