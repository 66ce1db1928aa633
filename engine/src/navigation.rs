//! Diagnostic activation: move the editor caret to a finding.
//!
//! The store owns one [`NavigationHandler`]; activating any diagnostic routes
//! through it regardless of which analyzer produced the finding.

use std::sync::Arc;

use lintel_types::{BufferId, Diagnostic, DocumentPath, ViewId};

/// Handles diagnostic activation.
pub trait NavigationHandler: Send + Sync {
    /// Returns whether the caret was moved. Failures are not errors.
    fn navigate(&self, diagnostic: &Diagnostic) -> bool;
}

/// Host editor services needed to open a document and place the caret.
pub trait EditorHost: Send + Sync {
    /// Find or open a view for `document`.
    fn open_view(&self, document: &DocumentPath) -> Option<ViewId>;

    /// The text buffer behind a view.
    fn text_buffer(&self, view: ViewId) -> Option<BufferId>;

    /// Select `start..end`, each a `(line, column)` pair, and reveal it.
    fn navigate_to(&self, buffer: BufferId, start: (u32, u32), end: (u32, u32)) -> bool;
}

/// Best-effort navigation through an [`EditorHost`].
pub struct EditorNavigator {
    host: Arc<dyn EditorHost>,
}

impl EditorNavigator {
    #[must_use]
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        Self { host }
    }
}

impl NavigationHandler for EditorNavigator {
    fn navigate(&self, diagnostic: &Diagnostic) -> bool {
        let Some(view) = self.host.open_view(diagnostic.document()) else {
            tracing::debug!(document = %diagnostic.document(), "Navigation skipped: no view");
            return false;
        };
        let Some(buffer) = self.host.text_buffer(view) else {
            tracing::debug!(document = %diagnostic.document(), "Navigation skipped: no text buffer");
            return false;
        };
        let position = (diagnostic.line(), diagnostic.column());
        self.host.navigate_to(buffer, position, position)
    }
}
