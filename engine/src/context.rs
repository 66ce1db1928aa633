//! The explicitly passed analysis context.
//!
//! Holds shared ownership of the store plus everything needed to start one
//! full analysis pass: the analyzers, the project source, runner settings, and
//! the discovery policy. The scheduler and the CLI both drive analysis through
//! [`AnalysisContext::analyze_all`].

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use lintel_runner::RunnerSettings;
use lintel_types::CycleId;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{AnalyzerError, AnalyzerRegistry, RunContext, RunOutcome, spawn_run};
use crate::project::{DiscoveryPolicy, ProjectSource};
use crate::store::DiagnosticStore;

/// Totals for one pass over every project and analyzer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    /// Analyzer invocations started.
    pub runs: usize,
    /// Diagnostics written by runs that published.
    pub published: usize,
    /// Runs that failed to launch, failed, or produced unreadable output.
    pub failures: usize,
    /// Runs whose result was discarded because the pass was superseded.
    pub discarded: usize,
}

pub struct AnalysisContext {
    store: Arc<DiagnosticStore>,
    analyzers: AnalyzerRegistry,
    projects: Arc<dyn ProjectSource>,
    runner: RunnerSettings,
    discovery: DiscoveryPolicy,
}

impl AnalysisContext {
    #[must_use]
    pub fn new(
        store: Arc<DiagnosticStore>,
        analyzers: AnalyzerRegistry,
        projects: Arc<dyn ProjectSource>,
    ) -> Self {
        Self {
            store,
            analyzers,
            projects,
            runner: RunnerSettings::default(),
            discovery: DiscoveryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: RunnerSettings) -> Self {
        self.runner = runner;
        self
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: DiscoveryPolicy) -> Self {
        self.discovery = discovery;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DiagnosticStore> {
        &self.store
    }

    #[must_use]
    pub fn analyzers(&self) -> &AnalyzerRegistry {
        &self.analyzers
    }

    /// Run every applicable analyzer on every project concurrently and wait
    /// for all of them.
    ///
    /// Each run publishes its own results as it finishes; this call returns
    /// only after the last one has. Failures leave that analyzer's previous
    /// diagnostics in place.
    pub async fn analyze_all(&self, token: &CancellationToken, cycle: Option<CycleId>) -> AnalysisSummary {
        let started = Instant::now();
        let mut ctx = RunContext::new(Arc::clone(&self.store), self.runner.clone(), token.clone());
        if let Some(cycle) = cycle {
            ctx = ctx.with_cycle(cycle);
        }

        let mut labels = Vec::new();
        let mut handles = Vec::new();
        for project in self.projects.projects() {
            for analyzer in self.analyzers.iter() {
                if !self
                    .discovery
                    .applies(&analyzer.settings().config_files, &project)
                {
                    tracing::trace!(
                        analyzer = analyzer.name(),
                        project = %project.root().display(),
                        "No marker config file; skipping"
                    );
                    continue;
                }
                labels.push((analyzer.name().to_string(), project.root().display().to_string()));
                handles.push(spawn_run(Arc::clone(analyzer), project.clone(), ctx.clone()));
            }
        }

        let mut summary = AnalysisSummary {
            runs: handles.len(),
            ..AnalysisSummary::default()
        };
        for ((analyzer, project), joined) in labels.into_iter().zip(join_all(handles).await) {
            let result = joined.unwrap_or_else(|e| {
                if e.is_panic() {
                    Err(AnalyzerError::Panicked {
                        analyzer: analyzer.clone(),
                    })
                } else {
                    Ok(RunOutcome::Canceled)
                }
            });
            match result {
                Ok(RunOutcome::Published { count }) => summary.published += count,
                Ok(RunOutcome::Canceled) => summary.discarded += 1,
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(%analyzer, %project, "Analyzer run failed: {e}");
                }
            }
        }

        tracing::debug!(
            cycle = ?cycle,
            runs = summary.runs,
            count = summary.published,
            failures = summary.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis pass finished"
        );
        summary
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("analyzers", &self.analyzers)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}
