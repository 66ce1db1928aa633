//! Diagnostic store: the single shared mutable resource of the engine.
//!
//! Writers are serialized through one mutex that guards a staging copy of the
//! diagnostics. Readers never take that mutex; they clone the last published
//! set. A [`Batch`] holds the writer lock for its whole lifetime and publishes
//! once on drop, so observers see either the state before the batch or the
//! state after it, never anything in between.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use lintel_types::{Diagnostic, DocumentPath, Severity};

use crate::navigation::NavigationHandler;
use crate::observer::{Observers, StoreChanged, Subscription};

/// Anything diagnostics can be written into.
///
/// Implemented by [`Batch`] (the store, under an explicit batch) and by
/// `Vec<Diagnostic>` (a plain collector).
pub trait DiagnosticSink {
    /// Append `diagnostics`. No de-duplication.
    fn add_errors(&mut self, diagnostics: Vec<Diagnostic>);

    /// Remove every diagnostic whose document matches one of `documents`
    /// (case-insensitively). An empty slice clears everything.
    fn clear_errors(&mut self, documents: &[DocumentPath]);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn add_errors(&mut self, diagnostics: Vec<Diagnostic>) {
        self.extend(diagnostics);
    }

    fn clear_errors(&mut self, documents: &[DocumentPath]) {
        if documents.is_empty() {
            self.clear();
        } else {
            self.retain(|d| !documents.contains(d.document()));
        }
    }
}

#[derive(Default)]
struct Staging {
    items: Vec<Diagnostic>,
    /// Set when the staged items differ from the published ones.
    dirty: bool,
}

impl Staging {
    fn add(&mut self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.items.extend(diagnostics);
        self.dirty = true;
    }

    fn clear(&mut self, documents: &[DocumentPath]) {
        if documents.is_empty() {
            self.retain(|_| false);
        } else {
            self.retain(|d| !documents.contains(d.document()));
        }
    }

    fn retain(&mut self, keep: impl Fn(&Diagnostic) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|d| keep(d));
        let removed = before - self.items.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }
}

/// Concurrent collection of diagnostics with batched mutation and change
/// notification.
///
/// Created once by the host and shared behind an `Arc` with every component
/// that reads or writes diagnostics.
pub struct DiagnosticStore {
    writer: Mutex<Staging>,
    published: RwLock<Arc<Vec<Diagnostic>>>,
    changed: Observers<StoreChanged>,
    navigation: RwLock<Option<Arc<dyn NavigationHandler>>>,
}

impl DiagnosticStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(Staging::default()),
            published: RwLock::new(Arc::new(Vec::new())),
            changed: Observers::new(),
            navigation: RwLock::new(None),
        }
    }

    /// Convenience for the common shared-ownership case.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open a batch. Mutations made through it become visible, with a single
    /// change notification, when the batch is dropped.
    ///
    /// The batch holds the writer lock. Nest further work through
    /// [`Batch::begin_batch`] or the batch's own methods; calling mutating
    /// store methods on the same thread while a batch is open deadlocks.
    #[must_use = "mutations are committed when the batch is dropped"]
    pub fn batch(&self) -> Batch<'_> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        Batch {
            inner: BatchInner::Outer {
                guard: Some(guard),
                store: self,
            },
        }
    }

    /// Append diagnostics in an implicit batch. An empty list changes nothing
    /// and does not notify.
    pub fn add_errors(&self, diagnostics: Vec<Diagnostic>) {
        self.batch().add_errors(diagnostics);
    }

    /// Remove diagnostics for `documents` (all diagnostics when empty). Does
    /// not notify when nothing matched.
    pub fn clear_errors(&self, documents: &[DocumentPath]) {
        self.batch().clear_errors(documents);
    }

    /// Diagnostics for one document (case-insensitive). A copy, not a view.
    #[must_use]
    pub fn get_errors(&self, document: &str) -> Vec<Diagnostic> {
        self.current()
            .iter()
            .filter(|d| d.document().matches(document))
            .cloned()
            .collect()
    }

    /// Every diagnostic, as a copy.
    #[must_use]
    pub fn get_errors_all(&self) -> Vec<Diagnostic> {
        self.current().as_ref().clone()
    }

    /// Diagnostics for documents under `root`.
    #[must_use]
    pub fn errors_under(&self, root: &Path) -> Vec<Diagnostic> {
        self.current()
            .iter()
            .filter(|d| d.document().is_under(root))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Number of error-severity diagnostics.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.current()
            .iter()
            .filter(|d| d.severity().is_error())
            .count()
    }

    /// Grouped, sorted view for reporting.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot::from_diagnostics(self.current().as_ref())
    }

    /// Register for change notifications.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&StoreChanged) + Send + Sync + 'static) -> Subscription {
        self.changed.subscribe(callback)
    }

    pub fn set_navigation_handler(&self, handler: Arc<dyn NavigationHandler>) {
        *self
            .navigation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Route a diagnostic activation through the installed handler. Returns
    /// whether navigation happened; without a handler it never does.
    pub fn navigate(&self, diagnostic: &Diagnostic) -> bool {
        let handler = self
            .navigation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler.navigate(diagnostic),
            None => false,
        }
    }

    fn current(&self) -> Arc<Vec<Diagnostic>> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Publish the staged set. Called with the writer lock held.
    fn publish(&self, staging: &mut Staging) -> bool {
        if !staging.dirty {
            return false;
        }
        staging.dirty = false;
        let next = Arc::new(staging.items.clone());
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
        true
    }
}

impl Default for DiagnosticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiagnosticStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticStore")
            .field("len", &self.len())
            .field("observers", &self.changed.len())
            .finish_non_exhaustive()
    }
}

enum BatchInner<'a> {
    Outer {
        /// Taken in `drop` so the lock is released before notifying.
        guard: Option<MutexGuard<'a, Staging>>,
        store: &'a DiagnosticStore,
    },
    Nested(Option<&'a mut Staging>),
}

/// Scoped mutation of the store. Commits on drop of the outermost batch,
/// including on early return or unwinding.
pub struct Batch<'a> {
    inner: BatchInner<'a>,
}

impl Batch<'_> {
    /// Nest a batch. Its drop commits nothing; the outermost batch does.
    #[must_use]
    pub fn begin_batch(&mut self) -> Batch<'_> {
        Batch {
            inner: BatchInner::Nested(self.staging()),
        }
    }

    /// Remove every diagnostic matching `predicate`; returns how many.
    pub fn clear_where(&mut self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.staging().map_or(0, |s| s.retain(|d| !predicate(d)))
    }

    /// The staged diagnostics, including uncommitted changes.
    #[must_use]
    pub fn pending(&self) -> &[Diagnostic] {
        let staging = match &self.inner {
            BatchInner::Outer { guard, .. } => guard.as_deref(),
            BatchInner::Nested(staging) => staging.as_deref(),
        };
        staging.map_or(&[], |s| &s.items)
    }

    fn staging(&mut self) -> Option<&mut Staging> {
        match &mut self.inner {
            BatchInner::Outer { guard, .. } => guard.as_deref_mut(),
            BatchInner::Nested(staging) => staging.as_deref_mut(),
        }
    }
}

impl DiagnosticSink for Batch<'_> {
    fn add_errors(&mut self, diagnostics: Vec<Diagnostic>) {
        if let Some(staging) = self.staging() {
            staging.add(diagnostics);
        }
    }

    fn clear_errors(&mut self, documents: &[DocumentPath]) {
        if let Some(staging) = self.staging() {
            staging.clear(documents);
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        let BatchInner::Outer { guard, store } = &mut self.inner else {
            return;
        };
        let Some(mut staging) = guard.take() else {
            return;
        };
        let changed = store.publish(&mut staging);
        // Release the writer lock before notifying so observers can query
        // or even mutate the store from their callback.
        drop(staging);
        if changed {
            store.changed.notify(&StoreChanged);
        }
    }
}

/// Immutable per-document grouping of the store's diagnostics.
///
/// Documents containing errors come first, then alphabetical order.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    files: Vec<(DocumentPath, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    fn from_diagnostics(items: &[Diagnostic]) -> Self {
        let mut files: Vec<(DocumentPath, Vec<Diagnostic>)> = Vec::new();
        for diag in items {
            match files.iter_mut().find(|(doc, _)| doc == diag.document()) {
                Some((_, bucket)) => bucket.push(diag.clone()),
                None => files.push((diag.document().clone(), vec![diag.clone()])),
            }
        }
        for (_, bucket) in &mut files {
            bucket.sort_by_key(|d| (d.line(), d.column()));
        }

        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| {
                a.0.as_str()
                    .to_lowercase()
                    .cmp(&b.0.as_str().to_lowercase())
            })
        });

        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(DocumentPath, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: Severity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(Severity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(Severity::Warning)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status like "E:3 W:5"; empty when there is nothing to report.
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lintel_types::{AnalyzerKind, Diagnostic, DocumentPath, Severity};

    use super::{DiagnosticSink, DiagnosticStore};
    use crate::navigation::NavigationHandler;

    fn diag(doc: &str, line: u32) -> Diagnostic {
        Diagnostic::new(AnalyzerKind::Script, doc, line, 0, "msg")
    }

    fn counting(store: &DiagnosticStore) -> (Arc<AtomicUsize>, crate::observer::Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = store.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn add_errors_notifies_once() {
        let store = DiagnosticStore::new();
        let (hits, _sub) = counting(&store);
        store.add_errors(vec![diag("a.ts", 1), diag("a.ts", 2)]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_add_is_silent() {
        let store = DiagnosticStore::new();
        let (hits, _sub) = counting(&store);
        store.add_errors(Vec::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_without_match_is_silent() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![diag("a.ts", 1)]);
        let (hits, _sub) = counting(&store);
        store.clear_errors(&[DocumentPath::new("b.ts")]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_with_empty_set_clears_everything() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![diag("a.ts", 1), diag("b.ts", 1)]);
        let (hits, _sub) = counting(&store);
        store.clear_errors(&[]);
        assert!(store.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_matches_case_insensitively() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![diag("Src/A.ts", 1), diag("b.ts", 1)]);
        store.clear_errors(&[DocumentPath::new("src/a.TS")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_errors_all()[0].document().as_str(), "b.ts");
    }

    #[test]
    fn get_errors_folds_case() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![diag("foo.ts", 1), diag("FOO.TS", 2), diag("bar.ts", 3)]);
        assert_eq!(store.get_errors("Foo.ts").len(), 2);
    }

    #[test]
    fn get_errors_returns_a_copy() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![diag("a.ts", 1)]);
        let before = store.get_errors("a.ts");
        store.add_errors(vec![diag("a.ts", 2)]);
        assert_eq!(before.len(), 1);
        assert_eq!(store.get_errors("a.ts").len(), 2);
    }

    #[test]
    fn nested_batches_notify_once_at_outermost_drop() {
        let store = DiagnosticStore::new();
        let (hits, _sub) = counting(&store);
        {
            let mut outer = store.batch();
            outer.add_errors(vec![diag("a.ts", 1)]);
            {
                let mut inner = outer.begin_batch();
                inner.clear_errors(&[DocumentPath::new("a.ts")]);
                inner.add_errors(vec![diag("a.ts", 2)]);
            }
            assert_eq!(hits.load(Ordering::SeqCst), 0);
            assert!(store.is_empty());
            assert_eq!(outer.pending().len(), 1);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_errors("a.ts")[0].line(), 2);
    }

    #[test]
    fn batch_with_no_net_change_is_silent() {
        let store = DiagnosticStore::new();
        let (hits, _sub) = counting(&store);
        {
            let mut batch = store.batch();
            batch.clear_errors(&[DocumentPath::new("missing.ts")]);
            batch.add_errors(Vec::new());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn observer_may_query_store_during_notify() {
        let store = Arc::new(DiagnosticStore::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let (s, weak) = (Arc::clone(&seen), Arc::downgrade(&store));
        let _sub = store.subscribe(move |_| {
            if let Some(store) = weak.upgrade() {
                s.store(store.len(), Ordering::SeqCst);
            }
        });
        store.add_errors(vec![diag("a.ts", 1), diag("b.ts", 1)]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_where_filters_by_predicate() {
        let store = DiagnosticStore::new();
        store.add_errors(vec![
            diag("a.ts", 1),
            Diagnostic::new(AnalyzerKind::Style, "a.scss", 1, 0, "m"),
        ]);
        let removed = store
            .batch()
            .clear_where(|d| d.source() == AnalyzerKind::Style);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn errors_under_scopes_by_root() {
        let store = DiagnosticStore::new();
        let root = std::path::PathBuf::from("proj");
        store.add_errors(vec![
            diag(&root.join("a.ts").to_string_lossy(), 1),
            diag("other.ts", 1),
        ]);
        assert_eq!(store.errors_under(&root).len(), 1);
    }

    #[test]
    fn snapshot_sorts_errors_first_and_counts() {
        let store = DiagnosticStore::new();
        assert_eq!(store.snapshot().status_string(), "");
        store.add_errors(vec![
            diag("b.ts", 1),
            diag("a.ts", 3),
            diag("c.ts", 1).with_severity(Severity::Error),
            diag("a.ts", 1),
        ]);
        let snap = store.snapshot();
        let order: Vec<&str> = snap.files().iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(order, ["c.ts", "a.ts", "b.ts"]);
        assert_eq!(snap.files()[1].1[0].line(), 1);
        assert_eq!(snap.total_count(), 4);
        assert_eq!(snap.status_string(), "E:1 W:3");
        assert_eq!(store.error_count(), 1);
    }

    #[test]
    fn vec_sink_mirrors_store_semantics() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.add_errors(vec![diag("a.ts", 1), diag("b.ts", 1)]);
        sink.clear_errors(&[DocumentPath::new("A.TS")]);
        assert_eq!(sink.len(), 1);
        sink.clear_errors(&[]);
        assert!(sink.is_empty());
    }

    struct Recorder(AtomicUsize);

    impl NavigationHandler for Recorder {
        fn navigate(&self, _diagnostic: &Diagnostic) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn navigate_routes_through_handler() {
        let store = DiagnosticStore::new();
        let d = diag("a.ts", 1);
        assert!(!store.navigate(&d));
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
        store.set_navigation_handler(recorder.clone());
        assert!(store.navigate(&d));
        assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
    }
}
