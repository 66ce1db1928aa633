//! Debounced, cooperatively cancelled re-analysis.
//!
//! Every buffer change calls [`ReanalysisScheduler::request`]. The request
//! cancels whatever cycle is live and arms a new one that waits out the quiet
//! period before analyzing. Only the last edit of a burst survives the wait.
//!
//! ```text
//! Idle ──request──▶ Pending ──quiet period──▶ Running ──done──▶ Idle
//!                    │  ▲                        │
//!                    └──┘ request (re-armed)     └─ request: token cancelled,
//!                                                   results discarded
//! ```
//!
//! Cancellation never kills a launched analyzer process. The token is checked
//! before launch and again, under the store's writer lock, before publishing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lintel_types::{CycleId, SnapshotVersion};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::context::{AnalysisContext, AnalysisSummary};
use crate::observer::{CycleOutcome, CycleReport, Observers, Subscription};

/// Quiet period after the last edit before analysis starts.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub quiet_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

/// Where the live cycle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    /// Waiting out the quiet period.
    Pending,
    /// Analyzers are running.
    Running,
}

struct LiveCycle {
    id: CycleId,
    token: CancellationToken,
    phase: SchedulerPhase,
}

#[derive(Default)]
struct SchedulerState {
    live: Option<LiveCycle>,
    next_id: u64,
}

struct Shared {
    context: AnalysisContext,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    completions: Observers<CycleReport>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `id` as running unless it was superseded meanwhile.
    fn start_running(&self, id: CycleId, token: &CancellationToken) -> bool {
        let mut state = self.state();
        if token.is_cancelled() {
            return false;
        }
        match state.live.as_mut() {
            Some(live) if live.id == id => {
                live.phase = SchedulerPhase::Running;
                true
            }
            _ => false,
        }
    }

    fn finish(
        &self,
        id: CycleId,
        version: SnapshotVersion,
        outcome: CycleOutcome,
        summary: AnalysisSummary,
    ) {
        {
            let mut state = self.state();
            if state.live.as_ref().is_some_and(|live| live.id == id) {
                state.live = None;
            }
        }
        match outcome {
            CycleOutcome::Completed => tracing::debug!(
                cycle = %id,
                %version,
                runs = summary.runs,
                count = summary.published,
                "Analysis cycle completed"
            ),
            CycleOutcome::Canceled => {
                tracing::debug!(cycle = %id, %version, "Analysis cycle superseded");
            }
        }
        self.completions.notify(&CycleReport {
            cycle: id,
            version,
            outcome,
            summary,
        });
    }
}

/// Debounces re-analysis requests for one document view.
///
/// Cheap to clone; clones share the same live cycle.
#[derive(Clone)]
pub struct ReanalysisScheduler {
    shared: Arc<Shared>,
    handle: Handle,
}

impl ReanalysisScheduler {
    /// Cycles are spawned onto `handle`.
    #[must_use]
    pub fn new(context: AnalysisContext, config: SchedulerConfig, handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                context,
                config,
                state: Mutex::new(SchedulerState::default()),
                completions: Observers::new(),
            }),
            handle,
        }
    }

    /// Request analysis of the buffer at `version`. Supersedes any live cycle.
    pub fn request(&self, version: SnapshotVersion) -> CycleId {
        let (id, token) = {
            let mut state = self.shared.state();
            if let Some(previous) = state.live.take() {
                previous.token.cancel();
            }
            state.next_id += 1;
            let id = CycleId::new(state.next_id);
            let token = CancellationToken::new();
            state.live = Some(LiveCycle {
                id,
                token: token.clone(),
                phase: SchedulerPhase::Pending,
            });
            (id, token)
        };

        self.handle
            .spawn(run_cycle(Arc::clone(&self.shared), id, version, token));
        id
    }

    /// Cancel the live cycle, if any, without starting another.
    pub fn cancel(&self) {
        if let Some(live) = self.shared.state().live.take() {
            live.token.cancel();
        }
    }

    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.shared
            .state()
            .live
            .as_ref()
            .map_or(SchedulerPhase::Idle, |live| live.phase)
    }

    #[must_use]
    pub fn live_cycle(&self) -> Option<CycleId> {
        self.shared.state().live.as_ref().map(|live| live.id)
    }

    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    #[must_use]
    pub fn context(&self) -> &AnalysisContext {
        &self.shared.context
    }

    /// Called once per cycle, completed or canceled.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&CycleReport) + Send + Sync + 'static) -> Subscription {
        self.shared.completions.subscribe(callback)
    }
}

impl std::fmt::Debug for ReanalysisScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReanalysisScheduler")
            .field("config", &self.shared.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

async fn run_cycle(
    shared: Arc<Shared>,
    id: CycleId,
    version: SnapshotVersion,
    token: CancellationToken,
) {
    tokio::select! {
        () = token.cancelled() => {
            shared.finish(id, version, CycleOutcome::Canceled, AnalysisSummary::default());
            return;
        }
        () = tokio::time::sleep(shared.config.quiet_period) => {}
    }

    if !shared.start_running(id, &token) {
        shared.finish(id, version, CycleOutcome::Canceled, AnalysisSummary::default());
        return;
    }

    let summary = shared.context.analyze_all(&token, Some(id)).await;
    let outcome = if token.is_cancelled() {
        CycleOutcome::Canceled
    } else {
        CycleOutcome::Completed
    };
    shared.finish(id, version, outcome, summary);
}
