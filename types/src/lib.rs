//! Core domain types for Lintel.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod diagnostic;
mod ids;
mod text;

pub use diagnostic::{AnalyzerKind, Diagnostic, DocumentPath, Severity};
pub use ids::{BufferId, CycleId, SnapshotVersion, ViewId};
pub use text::{
    BufferChange, SnapshotLine, StringSnapshot, TextChange, TextRange, TextSnapshot,
};
