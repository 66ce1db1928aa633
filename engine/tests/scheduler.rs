//! Debounce, cancellation, and tag refresh driven by the re-analysis scheduler.
//!
//! Runs on a paused clock; the analyzer is an in-process fake that publishes
//! one diagnostic per run, labelled with the run number.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lintel_engine::{
    AnalysisContext, Analyzer, AnalyzerError, AnalyzerFut, AnalyzerRegistry, AnalyzerSettings,
    CycleOutcome, CycleReport, DiagnosticStore, DiagnosticTagger, Project, ReanalysisScheduler,
    RunContext, SchedulerConfig, SchedulerPhase, StaticProjects, Subscription,
};
use lintel_types::{
    AnalyzerKind, BufferChange, Diagnostic, SnapshotVersion, StringSnapshot, TextSnapshot,
};
use tokio::runtime::Handle;

struct FakeAnalyzer {
    settings: AnalyzerSettings,
    delay: Duration,
    runs: AtomicUsize,
}

impl FakeAnalyzer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            settings: AnalyzerSettings::for_kind(AnalyzerKind::Script),
            delay,
            runs: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Analyzer for FakeAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Script
    }

    fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    fn parse(&self, _output: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
        Ok(Vec::new())
    }

    fn run<'a>(&'a self, project: &'a Project, ctx: &'a RunContext) -> AnalyzerFut<'a> {
        Box::pin(async move {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let diagnostic = Diagnostic::new(
                AnalyzerKind::Script,
                document_in(project),
                0,
                0,
                format!("run {n}"),
            );
            Ok(ctx.publish(self.kind(), project, vec![diagnostic]))
        })
    }
}

fn root() -> PathBuf {
    std::env::temp_dir().join("lintel-scheduler-test")
}

fn document_in(project: &Project) -> PathBuf {
    project.root().join("a.ts")
}

struct Harness {
    store: Arc<DiagnosticStore>,
    fake: Arc<FakeAnalyzer>,
    scheduler: ReanalysisScheduler,
    reports: Arc<Mutex<Vec<CycleReport>>>,
    _subscription: Subscription,
}

impl Harness {
    fn new(delay: Duration) -> Self {
        let store = DiagnosticStore::shared();
        let fake = FakeAnalyzer::new(delay);
        let mut analyzers = AnalyzerRegistry::new();
        analyzers.register(Arc::clone(&fake) as Arc<dyn Analyzer>).unwrap();
        let context = AnalysisContext::new(
            Arc::clone(&store),
            analyzers,
            StaticProjects::shared(vec![Project::new(root())]),
        );
        let scheduler =
            ReanalysisScheduler::new(context, SchedulerConfig::default(), Handle::current());

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let subscription = scheduler.subscribe(move |report| sink.lock().unwrap().push(*report));

        Self {
            store,
            fake,
            scheduler,
            reports,
            _subscription: subscription,
        }
    }

    fn outcomes(&self) -> Vec<CycleOutcome> {
        self.reports.lock().unwrap().iter().map(|r| r.outcome).collect()
    }

    fn completed(&self) -> Vec<CycleReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.outcome == CycleOutcome::Completed)
            .copied()
            .collect()
    }

    fn messages(&self) -> Vec<String> {
        self.store
            .get_errors_all()
            .iter()
            .map(|d| d.message().to_string())
            .collect()
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn burst_within_quiet_period_runs_once() {
    let h = Harness::new(Duration::ZERO);
    for v in 1..=5 {
        h.scheduler.request(SnapshotVersion::new(v));
        tokio::time::sleep(ms(100)).await;
    }
    tokio::time::sleep(ms(2_000)).await;

    assert_eq!(h.fake.runs(), 1);
    let completed = h.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].version, SnapshotVersion::new(5));
    assert_eq!(completed[0].summary.runs, 1);
    assert_eq!(
        h.outcomes().iter().filter(|o| **o == CycleOutcome::Canceled).count(),
        4
    );
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn requests_spaced_beyond_quiet_period_each_run() {
    let h = Harness::new(Duration::ZERO);
    for v in 1..=3 {
        h.scheduler.request(SnapshotVersion::new(v));
        tokio::time::sleep(ms(1_000)).await;
    }

    assert_eq!(h.fake.runs(), 3);
    assert_eq!(h.completed().len(), 3);
    assert_eq!(h.messages(), ["run 3"]);
}

#[tokio::test(start_paused = true)]
async fn superseded_running_cycle_is_discarded() {
    let h = Harness::new(ms(1_000));

    h.scheduler.request(SnapshotVersion::new(1));
    tokio::time::sleep(ms(600)).await;
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Running);

    h.scheduler.request(SnapshotVersion::new(2));
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Pending);
    tokio::time::sleep(ms(3_000)).await;

    // The superseded run was not killed, only ignored.
    assert_eq!(h.fake.runs(), 2);
    assert_eq!(h.messages(), ["run 2"]);
    assert_eq!(h.outcomes(), [CycleOutcome::Canceled, CycleOutcome::Completed]);
    assert_eq!(h.completed()[0].summary.discarded, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_launch_runs_nothing() {
    let h = Harness::new(Duration::ZERO);
    h.scheduler.request(SnapshotVersion::new(1));
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Pending);
    h.scheduler.cancel();
    tokio::time::sleep(ms(2_000)).await;

    assert_eq!(h.fake.runs(), 0);
    assert_eq!(h.outcomes(), [CycleOutcome::Canceled]);
    assert!(h.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn completed_cycle_refreshes_tagger() {
    let h = Harness::new(Duration::ZERO);
    let document = document_in(&Project::new(root()));
    let before = StringSnapshot::new(SnapshotVersion::new(1), "let a = 1;");
    let tagger = DiagnosticTagger::new(
        document.as_path(),
        Arc::new(before.clone()),
        Arc::clone(&h.store),
    )
    .with_scheduler(h.scheduler.clone());

    let invalidations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invalidations);
    let _sub = tagger.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (after, change) = before.edit(0, 0, "\n");
    let after: Arc<dyn TextSnapshot> = Arc::new(after);
    tagger.on_buffer_changed(&BufferChange {
        changes: vec![change],
        after: Arc::clone(&after),
    });
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Pending);

    tokio::time::sleep(ms(1_000)).await;

    assert_eq!(h.fake.runs(), 1);
    assert!(invalidations.load(Ordering::SeqCst) >= 1);
    let tags = tagger.get_tags(&[after.full_range()]);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].diagnostic.message(), "run 1");
    assert!(tags[0].range.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_tagger_cancels_pending_cycle() {
    let h = Harness::new(Duration::ZERO);
    let snapshot = StringSnapshot::new(SnapshotVersion::new(1), "x");
    let tagger = DiagnosticTagger::new("a.ts", Arc::new(snapshot.clone()), Arc::clone(&h.store))
        .with_scheduler(h.scheduler.clone());

    let (after, change) = snapshot.edit(1, 0, "y");
    tagger.on_buffer_changed(&BufferChange {
        changes: vec![change],
        after: Arc::new(after),
    });
    drop(tagger);
    tokio::time::sleep(ms(1_000)).await;

    assert_eq!(h.fake.runs(), 0);
    assert_eq!(h.scheduler.phase(), SchedulerPhase::Idle);
}
