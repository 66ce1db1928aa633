//! Observer registry used for every engine notification.
//!
//! Subscribers register a callback and hold the returned [`Subscription`].
//! Dropping the subscription unregisters the callback, so a torn-down document
//! view never receives events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use lintel_types::{CycleId, SnapshotVersion, TextRange};

use crate::context::AnalysisSummary;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<E>)>>,
}

/// A set of callbacks notified with events of type `E`.
pub struct Observers<E> {
    inner: Arc<Registry<E>>,
}

impl<E: 'static> Observers<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `callback`. It stays registered while the returned guard lives.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let registry: Arc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            registry: Arc::downgrade(&registry),
            id,
        }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// The subscriber list is copied before delivery, so callbacks may
    /// subscribe, unsubscribe, or query the notifier without deadlocking.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64);
}

impl<E> Unsubscribe for Registry<E> {
    fn remove(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry, _)| *entry != id);
    }
}

/// Keeps a callback registered; unsubscribes on drop.
pub struct Subscription {
    registry: Weak<dyn Unsubscribe>,
    id: u64,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// The diagnostic store changed. Carries no payload: re-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChanged;

/// Rendered markers inside `range` may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagsChanged {
    pub range: TextRange,
}

/// How an analysis cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Superseded by a newer request; results were discarded.
    Canceled,
}

/// Published once per analysis cycle when it finishes or is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: CycleId,
    pub version: SnapshotVersion,
    pub outcome: CycleOutcome,
    /// Empty when the cycle was canceled before launching anything.
    pub summary: AnalysisSummary,
}
