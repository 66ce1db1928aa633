//! Tag projection: diagnostics of one open document as renderable ranges.
//!
//! The tagger resolves each diagnostic of its document to a range once, when
//! the document's diagnostic set changes, and from then on carries those
//! ranges forward through buffer edits as [`TrackingSpan`]s. Queries only
//! intersect the tracked ranges with what is visible.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use lintel_types::{BufferChange, Diagnostic, DocumentPath, TextRange, TextSnapshot};

use crate::observer::{CycleOutcome, Observers, Subscription, TagsChanged};
use crate::scheduler::ReanalysisScheduler;
use crate::span::resolve_span;
use crate::store::DiagnosticStore;
use crate::tracking::TrackingSpan;

/// A diagnostic marker positioned in the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan {
    pub range: TextRange,
    pub diagnostic: Diagnostic,
}

struct Tag {
    span: TrackingSpan,
    diagnostic: Diagnostic,
}

struct TaggerState {
    snapshot: Arc<dyn TextSnapshot>,
    tags: Vec<Tag>,
    /// The store's diagnostics for this document when `tags` were built.
    source: Vec<Diagnostic>,
}

struct Inner {
    document: DocumentPath,
    store: Arc<DiagnosticStore>,
    state: Mutex<TaggerState>,
    tags_changed: Observers<TagsChanged>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, TaggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild tags from the store's current diagnostics for this document.
    /// Returns the full range of the snapshot when the tags were rebuilt.
    ///
    /// The store is read while the state lock is held, so concurrent refreshes
    /// serialize and the last one always sees the latest published set.
    fn refresh(&self, force: bool) -> Option<TextRange> {
        let mut state = self.state();
        let current = self.store.get_errors(self.document.as_str());
        if !force && state.source == current {
            return None;
        }
        let snapshot = Arc::clone(&state.snapshot);
        state.tags = current
            .iter()
            .filter_map(|d| {
                let range = resolve_span(snapshot.as_ref(), d.line() as usize, d.column() as usize)?;
                Some(Tag {
                    span: TrackingSpan::new(range),
                    diagnostic: d.clone(),
                })
            })
            .collect();
        let dropped = current.len() - state.tags.len();
        if dropped > 0 {
            tracing::trace!(document = %self.document, dropped, "Diagnostics past end of snapshot");
        }
        state.source = current;
        Some(snapshot.full_range())
    }

    fn on_store_changed(&self) {
        if let Some(range) = self.refresh(false) {
            self.tags_changed.notify(&TagsChanged { range });
        }
    }

    fn on_cycle_completed(&self) {
        if let Some(range) = self.refresh(true) {
            self.tags_changed.notify(&TagsChanged { range });
        }
    }
}

/// Projects the store's diagnostics for one document onto its live buffer.
///
/// Owns its subscriptions: dropping the tagger stops all notifications to it
/// and cancels its scheduler's live cycle.
pub struct DiagnosticTagger {
    inner: Arc<Inner>,
    scheduler: Option<ReanalysisScheduler>,
    subscriptions: Vec<Subscription>,
}

impl DiagnosticTagger {
    #[must_use]
    pub fn new(
        document: impl Into<DocumentPath>,
        snapshot: Arc<dyn TextSnapshot>,
        store: Arc<DiagnosticStore>,
    ) -> Self {
        let inner = Arc::new(Inner {
            document: document.into(),
            store: Arc::clone(&store),
            state: Mutex::new(TaggerState {
                snapshot,
                tags: Vec::new(),
                source: Vec::new(),
            }),
            tags_changed: Observers::new(),
        });
        inner.refresh(true);

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let store_subscription = store.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.on_store_changed();
            }
        });

        Self {
            inner,
            scheduler: None,
            subscriptions: vec![store_subscription],
        }
    }

    /// Drive re-analysis from this tagger's buffer changes through
    /// `scheduler`, and refresh the tags after every completed cycle.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: ReanalysisScheduler) -> Self {
        let weak = Arc::downgrade(&self.inner);
        let subscription = scheduler.subscribe(move |report| {
            if report.outcome != CycleOutcome::Completed {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.on_cycle_completed();
            }
        });
        self.scheduler = Some(scheduler);
        self.subscriptions.push(subscription);
        self
    }

    #[must_use]
    pub fn document(&self) -> &DocumentPath {
        &self.inner.document
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<dyn TextSnapshot> {
        Arc::clone(&self.inner.state().snapshot)
    }

    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.inner.state().tags.len()
    }

    /// Register for render invalidations.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&TagsChanged) + Send + Sync + 'static) -> Subscription {
        self.inner.tags_changed.subscribe(callback)
    }

    /// Carry every tracked range through `change` and request re-analysis.
    pub fn on_buffer_changed(&self, change: &BufferChange) {
        {
            let mut state = self.inner.state();
            let len = change.after.len();
            for tag in &mut state.tags {
                tag.span.map_through(&change.changes);
                tag.span = TrackingSpan::new(tag.span.range().clamp_to(len));
            }
            state.snapshot = Arc::clone(&change.after);
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.request(change.after.version());
        }
    }

    /// Markers intersecting any of `visible`. Touching counts as intersecting;
    /// a marker is reported once even if several ranges hit it.
    #[must_use]
    pub fn get_tags(&self, visible: &[TextRange]) -> Vec<TagSpan> {
        let state = self.inner.state();
        let mut hit = vec![false; state.tags.len()];
        let mut out = Vec::new();
        for range in visible {
            for (i, tag) in state.tags.iter().enumerate() {
                let tag_range = tag.span.range();
                if !hit[i] && tag_range.intersects_with(range) {
                    hit[i] = true;
                    out.push(TagSpan {
                        range: tag_range,
                        diagnostic: tag.diagnostic.clone(),
                    });
                }
            }
        }
        out
    }

    /// Activate a marker's diagnostic. Best-effort.
    pub fn on_navigate(&self, diagnostic: &Diagnostic) -> bool {
        self.inner.store.navigate(diagnostic)
    }
}

impl Drop for DiagnosticTagger {
    fn drop(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel();
        }
    }
}

impl std::fmt::Debug for DiagnosticTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticTagger")
            .field("document", &self.inner.document)
            .field("tags", &self.tag_count())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
