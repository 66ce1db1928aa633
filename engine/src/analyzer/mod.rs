//! Analyzer contract and the shared run pipeline.
//!
//! An analyzer knows two things: the command line that runs its tool on a
//! project, and how to turn that tool's output into [`Diagnostic`]s. Launching,
//! exit-code interpretation, cancellation checkpoints, and publishing into the
//! store are shared by every analyzer through [`run_tool`].

mod script;
mod style;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use lintel_runner::{ProcessOutput, RunError, RunnerSettings};
use lintel_types::{AnalyzerKind, CycleId, Diagnostic, DocumentPath};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::project::Project;
use crate::store::{DiagnosticSink, DiagnosticStore};

pub use script::ScriptAnalyzer;
pub use style::StyleAnalyzer;

/// Analyzer run future type alias.
pub type AnalyzerFut<'a> =
    Pin<Box<dyn Future<Output = Result<RunOutcome, AnalyzerError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Launch(#[from] RunError),
    #[error("{analyzer} failed with exit code {exit_code:?}: {stderr}")]
    ToolFailed {
        analyzer: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{analyzer} produced unreadable output: {message}")]
    MalformedOutput { analyzer: String, message: String },
    #[error("{analyzer} run panicked")]
    Panicked { analyzer: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate analyzer registered: {name}")]
    DuplicateAnalyzer { name: String },
    /// Published diagnostics are owned per kind, so two analyzers of one kind
    /// would replace each other's results.
    #[error("{name} has the same kind as already registered {existing}")]
    DuplicateKind { name: String, existing: String },
}

/// How a single analyzer run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Results replaced this analyzer's previous diagnostics for the project.
    Published { count: usize },
    /// The run was superseded; nothing was written.
    Canceled,
}

/// Per-analyzer settings: what to run and what to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    /// Literal shell command run in the project root.
    pub command: String,
    /// Marker files that identify a project using this tool.
    pub config_files: Vec<String>,
    /// Rule ids whose findings are dropped.
    pub ignored_rules: Vec<String>,
}

impl AnalyzerSettings {
    #[must_use]
    pub fn for_kind(kind: AnalyzerKind) -> Self {
        match kind {
            AnalyzerKind::Style => Self {
                command: "stylelint **/*.scss --formatter json".to_string(),
                config_files: vec![
                    ".stylelintrc".to_string(),
                    ".stylelintrc.json".to_string(),
                    "stylelint.config.js".to_string(),
                ],
                ignored_rules: Vec::new(),
            },
            AnalyzerKind::Script => Self {
                command: "tslint --format json --project .".to_string(),
                config_files: vec!["tslint.json".to_string()],
                ignored_rules: Vec::new(),
            },
        }
    }

    fn keeps(&self, diagnostic: &Diagnostic) -> bool {
        diagnostic
            .rule_id()
            .is_none_or(|rule| !self.ignored_rules.iter().any(|r| r == rule))
    }
}

/// One external analysis tool.
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Registry key. Defaults to the tool label.
    fn name(&self) -> &str {
        self.kind().label()
    }

    fn settings(&self) -> &AnalyzerSettings;

    /// Command line for `project`, run with the project root as working
    /// directory.
    fn command(&self, _project: &Project) -> String {
        self.settings().command.clone()
    }

    /// Parse the tool's stdout. Malformed entries are skipped; only output
    /// that is not a JSON array at all is an error.
    fn parse(&self, output: &str) -> Result<Vec<Diagnostic>, AnalyzerError>;

    /// Parse `output` and add the result to `sink`. Never fails: unreadable
    /// output is logged and contributes nothing.
    ///
    /// Entry point for hosts that already hold a tool's output (a saved
    /// report, a run they launched themselves) and feed it into a store batch
    /// or a collector. [`run_tool`] does not use it, since a scheduled run must
    /// report unreadable output as a failure.
    fn parse_errors(&self, output: &str, sink: &mut dyn DiagnosticSink) {
        match self.parse(output) {
            Ok(diagnostics) => sink.add_errors(diagnostics),
            Err(e) => tracing::warn!(analyzer = self.name(), "Ignoring analyzer output: {e}"),
        }
    }

    /// Run the tool on `project` and publish its diagnostics.
    fn run<'a>(&'a self, project: &'a Project, ctx: &'a RunContext) -> AnalyzerFut<'a> {
        Box::pin(run_tool(self, project, ctx))
    }
}

/// Everything a run needs besides the analyzer and project.
#[derive(Debug, Clone)]
pub struct RunContext {
    store: Arc<DiagnosticStore>,
    runner: RunnerSettings,
    token: CancellationToken,
    cycle: Option<CycleId>,
}

impl RunContext {
    #[must_use]
    pub fn new(store: Arc<DiagnosticStore>, runner: RunnerSettings, token: CancellationToken) -> Self {
        Self {
            store,
            runner,
            token,
            cycle: None,
        }
    }

    #[must_use]
    pub fn with_cycle(mut self, cycle: CycleId) -> Self {
        self.cycle = Some(cycle);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DiagnosticStore> {
        &self.store
    }

    #[must_use]
    pub fn runner(&self) -> &RunnerSettings {
        &self.runner
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Replace `kind`'s diagnostics under `project` with `diagnostics`, as one
    /// batch. The cancellation check happens while the batch holds the
    /// writer lock, so a superseded run can never interleave with a newer one.
    pub fn publish(
        &self,
        kind: AnalyzerKind,
        project: &Project,
        diagnostics: Vec<Diagnostic>,
    ) -> RunOutcome {
        let mut batch = self.store.batch();
        if self.token.is_cancelled() {
            return RunOutcome::Canceled;
        }
        batch.clear_where(|d| d.source() == kind && d.document().is_under(project.root()));
        let count = diagnostics.len();
        batch.add_errors(diagnostics);
        RunOutcome::Published { count }
    }
}

/// The shared run pipeline: check, launch, interpret, resolve, publish.
///
/// The external process always runs to completion once launched; a canceled
/// token only discards its result.
pub async fn run_tool<A: Analyzer + ?Sized>(
    analyzer: &A,
    project: &Project,
    ctx: &RunContext,
) -> Result<RunOutcome, AnalyzerError> {
    if ctx.is_canceled() {
        return Ok(RunOutcome::Canceled);
    }

    let started = Instant::now();
    let command = analyzer.command(project);
    tracing::debug!(
        analyzer = analyzer.name(),
        project = %project.root().display(),
        cycle = ?ctx.cycle,
        "Launching `{command}`"
    );

    let output = ctx
        .runner
        .runner()
        .execute(project.root(), &command)
        .await?;
    let diagnostics = interpret(analyzer, &output)?
        .into_iter()
        .map(|d| resolve_document(d, project))
        .collect::<Vec<_>>();

    let outcome = ctx.publish(analyzer.kind(), project, diagnostics);
    match outcome {
        RunOutcome::Published { count } => tracing::debug!(
            analyzer = analyzer.name(),
            project = %project.root().display(),
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Published diagnostics"
        ),
        RunOutcome::Canceled => tracing::debug!(
            analyzer = analyzer.name(),
            project = %project.root().display(),
            "Discarding superseded result"
        ),
    }
    Ok(outcome)
}

/// Apply the exit-code policy to a finished process.
///
/// Tools commonly exit non-zero when they find problems, so a non-zero exit
/// with a readable report is still a report. A non-zero exit with nothing
/// readable is a tool failure.
fn interpret<A: Analyzer + ?Sized>(
    analyzer: &A,
    output: &ProcessOutput,
) -> Result<Vec<Diagnostic>, AnalyzerError> {
    let failed = || AnalyzerError::ToolFailed {
        analyzer: analyzer.name().to_string(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    };

    let stdout = output.stdout.trim();
    if stdout.is_empty() {
        return if output.success() {
            Ok(Vec::new())
        } else {
            Err(failed())
        };
    }
    match analyzer.parse(stdout) {
        Ok(diagnostics) => Ok(diagnostics),
        Err(e) if output.success() => Err(e),
        Err(_) => Err(failed()),
    }
}

fn resolve_document(diagnostic: Diagnostic, project: &Project) -> Diagnostic {
    let reported = diagnostic.document().as_path();
    if reported.is_absolute() {
        return diagnostic;
    }
    let resolved = DocumentPath::from(project.resolve(reported));
    diagnostic.with_document(resolved)
}

/// Start `analyzer` on `project` in the background and return immediately.
pub fn spawn_run(
    analyzer: Arc<dyn Analyzer>,
    project: Project,
    ctx: RunContext,
) -> JoinHandle<Result<RunOutcome, AnalyzerError>> {
    tokio::spawn(async move { analyzer.run(&project, &ctx).await })
}

/// Collect the entries of a top-level JSON array, or describe why the output
/// is not one.
pub(crate) fn json_entries(
    analyzer: &str,
    output: &str,
) -> Result<Vec<serde_json::Value>, AnalyzerError> {
    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(serde_json::Value::Array(entries)) => Ok(entries),
        Ok(other) => Err(AnalyzerError::MalformedOutput {
            analyzer: analyzer.to_string(),
            message: format!("expected a JSON array, got {}", json_kind(&other)),
        }),
        Err(e) => Err(AnalyzerError::MalformedOutput {
            analyzer: analyzer.to_string(),
            message: e.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Analyzers by name. Duplicate names and duplicate kinds are rejected.
#[derive(Default, Clone)]
pub struct AnalyzerRegistry {
    analyzers: Vec<Arc<dyn Analyzer>>,
    by_name: HashMap<String, usize>,
}

impl AnalyzerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in style and script analyzers with default settings.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.analyzers.push(Arc::new(StyleAnalyzer::default()));
        registry.analyzers.push(Arc::new(ScriptAnalyzer::default()));
        registry.reindex();
        registry
    }

    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Result<(), RegistryError> {
        let name = analyzer.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateAnalyzer { name });
        }
        if let Some(existing) = self.analyzers.iter().find(|a| a.kind() == analyzer.kind()) {
            return Err(RegistryError::DuplicateKind {
                name,
                existing: existing.name().to_string(),
            });
        }
        self.by_name.insert(name, self.analyzers.len());
        self.analyzers.push(analyzer);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Analyzer>> {
        self.by_name.get(name).map(|&i| &self.analyzers[i])
    }

    /// Analyzers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Analyzer>> {
        self.analyzers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    fn reindex(&mut self) {
        self.by_name = self
            .analyzers
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name().to_string(), i))
            .collect();
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.analyzers.iter().map(|a| a.name()))
            .finish()
    }
}

/// Normalize a tool-reported path: forward slashes become the host separator.
pub(crate) fn tool_path(raw: &str) -> Option<DocumentPath> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(DocumentPath::from_tool_output(raw))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lintel_runner::ProcessOutput;
    use lintel_types::{AnalyzerKind, Diagnostic, DocumentPath};
    use tokio_util::sync::CancellationToken;

    use super::{
        Analyzer, AnalyzerError, AnalyzerRegistry, AnalyzerSettings, RegistryError, RunContext, RunOutcome,
        StyleAnalyzer, interpret,
    };
    use crate::project::Project;
    use crate::store::DiagnosticStore;

    fn output(stdout: &str, exit_code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: "boom".to_string(),
            exit_code: Some(exit_code),
        }
    }

    const REPORT: &str = r#"[{"source":"a.scss","warnings":[{"line":1,"column":1,"text":"t","rule":"r"}]}]"#;

    #[test]
    fn empty_stdout_with_success_is_no_diagnostics() {
        let analyzer = StyleAnalyzer::default();
        assert!(interpret(&analyzer, &output("  \n", 0)).unwrap().is_empty());
    }

    #[test]
    fn empty_stdout_with_failure_is_tool_failure() {
        let analyzer = StyleAnalyzer::default();
        let err = interpret(&analyzer, &output("", 127)).unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::ToolFailed { exit_code: Some(127), ref stderr, .. } if stderr == "boom"
        ));
    }

    #[test]
    fn non_zero_exit_with_report_is_a_report() {
        let analyzer = StyleAnalyzer::default();
        assert_eq!(interpret(&analyzer, &output(REPORT, 2)).unwrap().len(), 1);
    }

    #[test]
    fn garbage_with_failure_is_tool_failure() {
        let analyzer = StyleAnalyzer::default();
        let err = interpret(&analyzer, &output("command not found", 1)).unwrap_err();
        assert!(matches!(err, AnalyzerError::ToolFailed { .. }));
    }

    #[test]
    fn garbage_with_success_is_malformed() {
        let analyzer = StyleAnalyzer::default();
        let err = interpret(&analyzer, &output("{\"not\": \"an array\"}", 0)).unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedOutput { .. }), "{err}");
    }

    #[test]
    fn publish_replaces_only_own_source_under_project() {
        let store = Arc::new(DiagnosticStore::new());
        let root = std::env::temp_dir().join("lintel-publish");
        let project = Project::new(&root);
        let inside = DocumentPath::from(root.join("a.scss"));
        let outside = DocumentPath::from(std::env::temp_dir().join("elsewhere.scss"));

        store.add_errors(vec![
            Diagnostic::new(AnalyzerKind::Style, inside.clone(), 0, 0, "old"),
            Diagnostic::new(AnalyzerKind::Style, outside, 0, 0, "keep"),
            Diagnostic::new(AnalyzerKind::Script, inside.clone(), 0, 0, "keep"),
        ]);

        let ctx = RunContext::new(Arc::clone(&store), Default::default(), CancellationToken::new());
        let fresh = vec![Diagnostic::new(AnalyzerKind::Style, inside, 1, 0, "new")];
        assert_eq!(
            ctx.publish(AnalyzerKind::Style, &project, fresh),
            RunOutcome::Published { count: 1 }
        );

        let messages: Vec<String> = store
            .get_errors_all()
            .iter()
            .map(|d| d.message().to_string())
            .collect();
        assert_eq!(messages, ["keep", "keep", "new"]);
    }

    #[test]
    fn publish_after_cancel_writes_nothing() {
        let store = Arc::new(DiagnosticStore::new());
        let token = CancellationToken::new();
        let ctx = RunContext::new(Arc::clone(&store), Default::default(), token.clone());
        token.cancel();
        let outcome = ctx.publish(
            AnalyzerKind::Script,
            &Project::new("p"),
            vec![Diagnostic::new(AnalyzerKind::Script, "p/a.ts", 0, 0, "m")],
        );
        assert_eq!(outcome, RunOutcome::Canceled);
        assert!(store.is_empty());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = AnalyzerRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        let err = registry
            .register(Arc::new(StyleAnalyzer::default()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAnalyzer { ref name } if name == "stylelint"));
        assert!(registry.get("tslint").is_some());
        assert!(registry.get("eslint").is_none());
    }

    struct Renamed(StyleAnalyzer);

    impl Analyzer for Renamed {
        fn kind(&self) -> AnalyzerKind {
            self.0.kind()
        }

        fn name(&self) -> &str {
            "stylelint-legacy"
        }

        fn settings(&self) -> &AnalyzerSettings {
            self.0.settings()
        }

        fn parse(&self, output: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
            self.0.parse(output)
        }
    }

    #[test]
    fn registry_rejects_a_second_analyzer_of_one_kind() {
        let mut registry = AnalyzerRegistry::with_defaults();
        let err = registry
            .register(Arc::new(Renamed(StyleAnalyzer::default())))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateKind { ref name, ref existing }
                if name == "stylelint-legacy" && existing == "stylelint"
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn parse_errors_feeds_a_batch() {
        let store = DiagnosticStore::new();
        let analyzer = StyleAnalyzer::default();
        {
            let mut batch = store.batch();
            analyzer.parse_errors(REPORT, &mut batch);
            analyzer.parse_errors("not json", &mut batch);
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_errors_all()[0].rule_id(), Some("r"));
    }

    #[test]
    fn ignored_rules_are_dropped() {
        let mut settings = AnalyzerSettings::for_kind(AnalyzerKind::Style);
        settings.ignored_rules = vec!["r".to_string()];
        let analyzer = StyleAnalyzer::new(settings);
        assert!(interpret(&analyzer, &output(REPORT, 0)).unwrap().is_empty());
    }
}
