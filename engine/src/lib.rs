//! Live diagnostics engine for Lintel.
//!
//! External analyzers run against projects; their findings land in a shared
//! [`DiagnosticStore`]; open documents project those findings onto their live
//! buffers through a [`DiagnosticTagger`], which also drives debounced
//! re-analysis through a [`ReanalysisScheduler`] as the user types.
//!
//! ```text
//! buffer edit ─▶ DiagnosticTagger::on_buffer_changed ─▶ ReanalysisScheduler::request
//!     (debounce, cancel superseded) ─▶ AnalysisContext::analyze_all
//!     ─▶ Analyzer::run ─▶ ProcessRunner ─▶ Analyzer::parse ─▶ DiagnosticStore (batched)
//!     ─▶ StoreChanged ─▶ DiagnosticTagger ─▶ TagsChanged ─▶ host re-renders
//! ```

mod analyzer;
mod context;
mod navigation;
mod observer;
mod project;
mod scheduler;
mod span;
mod store;
mod tagger;
mod tracking;

pub use analyzer::{
    Analyzer, AnalyzerError, AnalyzerFut, AnalyzerRegistry, AnalyzerSettings, RegistryError,
    RunContext, RunOutcome, ScriptAnalyzer, StyleAnalyzer, run_tool, spawn_run,
};
pub use context::{AnalysisContext, AnalysisSummary};
pub use navigation::{EditorHost, EditorNavigator, NavigationHandler};
pub use observer::{
    CycleOutcome, CycleReport, Observers, StoreChanged, Subscription, TagsChanged,
};
pub use project::{DiscoveryPolicy, Project, ProjectSource, StaticProjects};
pub use scheduler::{DEFAULT_QUIET_PERIOD, ReanalysisScheduler, SchedulerConfig, SchedulerPhase};
pub use span::resolve_span;
pub use store::{Batch, DiagnosticSink, DiagnosticStore, DiagnosticsSnapshot};
pub use tagger::{DiagnosticTagger, TagSpan};
pub use tracking::{PointTrackingMode, TrackingSpan, map_point};

pub use tokio_util::sync::CancellationToken;
