//! Dispatcher tests on private instances (the global one is covered by the
//! integration tests).

use std::sync::atomic::AtomicUsize;
use std::sync::mpsc;

use parking_lot::Mutex;

use super::*;
use crate::execution::{
    JobContext, JobError, JobOutcome, SequentialExecutor, TaskQueueExecutor,
};
use crate::online::{
    ClientConnection, FilterOutcome, RequestFilter, RequestHandler, ServiceParamFilter,
};

#[derive(Default)]
struct RecordingClient {
    rejections: Mutex<Vec<String>>,
}

impl ClientConnection for RecordingClient {
    fn descriptor(&self) -> i64 {
        42
    }

    fn reject(&self, reason: &str) {
        self.rejections.lock().push(reason.to_string());
    }
}

struct RecordingHandler {
    name: &'static str,
    fail: bool,
    calls: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingHandler {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RequestHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(
        &self,
        _request: &Request,
        _client: &dyn ClientConnection,
        _ctx: &JobContext<'_>,
    ) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(JobError::failed("tile out of range"));
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct AlwaysReject(&'static str);

impl RequestFilter for AlwaysReject {
    fn name(&self) -> &'static str {
        "always-reject"
    }

    fn apply(&self, _request: Request) -> FilterOutcome {
        FilterOutcome::reject(self.0)
    }
}

struct Handlers {
    tiles: Arc<RecordingHandler>,
    conversion: Arc<RecordingHandler>,
    pretiling: Arc<RecordingHandler>,
    services: Arc<RecordingHandler>,
}

impl Handlers {
    fn new() -> Self {
        Self {
            tiles: RecordingHandler::new("tiles"),
            conversion: RecordingHandler::new("conversion"),
            pretiling: RecordingHandler::new("pretiling"),
            services: RecordingHandler::new("services"),
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            tile_extractor: self.tiles.clone(),
            raw_converter: self.conversion.clone(),
            pre_tiler: self.pretiling.clone(),
            services: self.services.clone(),
        }
    }

    fn total_calls(&self) -> usize {
        self.tiles.calls() + self.conversion.calls() + self.pretiling.calls() + self.services.calls()
    }
}

fn sequential() -> SequentialExecutor {
    let strategy = SequentialExecutor::new();
    strategy.init().unwrap();
    strategy
}

struct ScriptedTask {
    id: &'static str,
    result: Result<(), JobError>,
    finished: Mutex<Vec<JobOutcome>>,
}

impl ScriptedTask {
    fn new(id: &'static str, result: Result<(), JobError>) -> Arc<Self> {
        Arc::new(Self {
            id,
            result,
            finished: Mutex::new(Vec::new()),
        })
    }
}

impl Task for ScriptedTask {
    fn id(&self) -> &str {
        self.id
    }

    fn run(&self, _ctx: &JobContext<'_>) -> Result<(), JobError> {
        self.result.clone()
    }

    fn on_finished(&self, outcome: &JobOutcome) {
        self.finished.lock().push(outcome.clone());
    }
}

#[test]
fn test_second_filter_rejection_reaches_caller_and_client() {
    let handlers = Handlers::new();
    let filters = FilterChain::new()
        .with(ServiceParamFilter)
        .with(AlwaysReject("R"));
    let executor = OnlineExecutor::new(filters, handlers.collaborators());
    let client = Arc::new(RecordingClient::default());

    let outcome = executor
        .execute(&sequential(), "service=tiling", client.clone())
        .unwrap();

    assert_eq!(outcome.rejection_reason(), Some("R"));
    assert!(matches!(outcome, DispatchOutcome::Rejected { filter: "always-reject", .. }));
    assert_eq!(handlers.total_calls(), 0);
    assert_eq!(*client.rejections.lock(), vec!["R".to_string()]);
    assert_eq!(executor.stats().requests_rejected, 1);
}

#[test]
fn test_unclassified_request_rejected() {
    let handlers = Handlers::new();
    let executor = OnlineExecutor::new(FilterChain::standard(4096), handlers.collaborators());
    let client = Arc::new(RecordingClient::default());

    let outcome = executor
        .execute(&sequential(), "dataset=brain", client.clone())
        .unwrap();

    assert_eq!(outcome.rejection_reason(), Some("unable to determine request kind"));
    assert_eq!(handlers.total_calls(), 0);
    assert_eq!(client.rejections.lock().len(), 1);
}

#[test]
fn test_routes_each_kind_to_one_collaborator() {
    let handlers = Handlers::new();
    let executor = OnlineExecutor::new(FilterChain::standard(4096), handlers.collaborators());
    let strategy = sequential();

    for (query, kind) in [
        ("service=tiling&dataset=1", RequestKind::TileExtraction),
        ("service=image&dataset=1", RequestKind::TileExtraction),
        ("service=conversion&file=a.mnc", RequestKind::RawConversion),
        ("service=pretiling&file=a.raw", RequestKind::PreTiling),
        ("service=datasets", RequestKind::Service),
    ] {
        let client = Arc::new(RecordingClient::default());
        let outcome = executor.execute(&strategy, query, client).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched { kind: k, .. } if k == kind));
    }

    assert_eq!(handlers.tiles.calls(), 2);
    assert_eq!(handlers.conversion.calls(), 1);
    assert_eq!(handlers.pretiling.calls(), 1);
    assert_eq!(handlers.services.calls(), 1);
    assert_eq!(executor.stats().requests_dispatched, 5);
}

#[test]
fn test_handler_failure_is_reported_to_client() {
    let handlers = Handlers::new();
    let mut collaborators = handlers.collaborators();
    collaborators.tile_extractor = RecordingHandler::failing("tiles");
    let executor = OnlineExecutor::new(FilterChain::standard(4096), collaborators);
    let client = Arc::new(RecordingClient::default());

    let outcome = executor
        .execute(&sequential(), "service=tiling", client.clone())
        .unwrap();

    // The request was dispatched; the failure belongs to the job.
    assert!(outcome.is_dispatched());
    assert_eq!(*client.rejections.lock(), vec!["Job failed: tile out of range".to_string()]);
}

#[test]
fn test_uninitialized_strategy_is_an_error() {
    let handlers = Handlers::new();
    let executor = OnlineExecutor::new(FilterChain::standard(4096), handlers.collaborators());
    let client = Arc::new(RecordingClient::default());

    let err = executor
        .execute(&SequentialExecutor::new(), "service=tiling", client)
        .unwrap_err();

    assert!(matches!(err, ExecuteError::Strategy(StrategyError::NotInitialized { .. })));
    assert!(err.is_programmer_error());
    assert_eq!(handlers.total_calls(), 0);
    assert_eq!(executor.stats().submit_failures, 1);
}

#[test]
fn test_task_statuses() {
    let executor = OnlineExecutor::new(FilterChain::new(), Collaborators::default());
    let strategy = sequential();

    let ok = ScriptedTask::new("convert-1", Ok(()));
    executor.execute_task(&strategy, ok.clone()).unwrap();
    assert_eq!(executor.task_status("convert-1").unwrap().status, TaskStatus::Finished);
    assert_eq!(*ok.finished.lock(), vec![JobOutcome::Completed]);

    let bad = ScriptedTask::new("convert-2", Err(JobError::failed("bad header")));
    executor.execute_task(&strategy, bad).unwrap();
    let record = executor.task_status("convert-2").unwrap();
    assert_eq!(record.status, TaskStatus::Erroneous);
    assert_eq!(record.message.as_deref(), Some("Job failed: bad header"));

    assert!(executor.task_status("unknown").is_none());
    assert_eq!(executor.stats().tasks_submitted, 2);
}

#[test]
fn test_refused_task_is_cancelled() {
    let executor = OnlineExecutor::new(FilterChain::new(), Collaborators::default());
    let task = ScriptedTask::new("pretile-1", Ok(()));

    let err = executor
        .execute_task(&SequentialExecutor::new(), task.clone())
        .unwrap_err();

    assert!(matches!(err, ExecuteError::Strategy(_)));
    assert_eq!(executor.task_status("pretile-1").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(*task.finished.lock(), vec![JobOutcome::Discarded]);
}

#[test]
fn test_finished_tasks_can_be_pruned_or_forgotten() {
    let executor = OnlineExecutor::new(FilterChain::new(), Collaborators::default());
    let strategy = sequential();

    executor
        .execute_task(&strategy, ScriptedTask::new("tile-a", Ok(())))
        .unwrap();
    executor
        .execute_task(&strategy, ScriptedTask::new("tile-b", Ok(())))
        .unwrap();
    assert_eq!(executor.stats().tasks_tracked, 2);

    assert_eq!(executor.forget_task("tile-a").unwrap().status, TaskStatus::Finished);
    assert!(executor.task_status("tile-a").is_none());

    // A negative age puts the cutoff in the future.
    assert_eq!(executor.prune_tasks(chrono::Duration::seconds(-1)), 1);
    assert_eq!(executor.stats().tasks_tracked, 0);
}

struct PanickyTask;

impl Task for PanickyTask {
    fn id(&self) -> &str {
        "panicky"
    }

    fn run(&self, _ctx: &JobContext<'_>) -> Result<(), JobError> {
        Ok(())
    }

    fn on_finished(&self, _outcome: &JobOutcome) {
        panic!("on_finished blew up");
    }
}

#[test]
fn test_panicking_on_finished_keeps_queue_worker() {
    let executor = OnlineExecutor::new(FilterChain::new(), Collaborators::default());
    let strategy = TaskQueueExecutor::new(1);
    strategy.init().unwrap();

    executor.execute_task(&strategy, Arc::new(PanickyTask)).unwrap();
    let (job, handle) = Job::new("follow-up", |_| Ok(())).with_handle();
    strategy.process(job).unwrap();
    assert_eq!(handle.wait(), JobOutcome::Completed);
    assert_eq!(executor.task_status("panicky").unwrap().status, TaskStatus::Finished);
    strategy.stop();
}

struct GatedTask {
    started: Mutex<Option<mpsc::Sender<()>>>,
    proceed: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Task for GatedTask {
    fn id(&self) -> &str {
        "gated"
    }

    fn run(&self, _ctx: &JobContext<'_>) -> Result<(), JobError> {
        if let Some(started) = self.started.lock().take() {
            let _ = started.send(());
        }
        if let Some(proceed) = self.proceed.lock().take() {
            let _ = proceed.recv();
        }
        Ok(())
    }
}

#[test]
fn test_task_in_process_while_running() {
    let executor = OnlineExecutor::new(FilterChain::new(), Collaborators::default());
    let strategy = TaskQueueExecutor::new(1);
    strategy.init().unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (proceed_tx, proceed_rx) = mpsc::channel();
    let task = Arc::new(GatedTask {
        started: Mutex::new(Some(started_tx)),
        proceed: Mutex::new(Some(proceed_rx)),
    });

    executor.execute_task(&strategy, task).unwrap();
    started_rx.recv().unwrap();
    assert_eq!(executor.task_status("gated").unwrap().status, TaskStatus::InProcess);

    proceed_tx.send(()).unwrap();
    strategy.stop();
    assert_eq!(executor.task_status("gated").unwrap().status, TaskStatus::Finished);
}

#[test]
fn test_shutdown_runs_once() {
    let handlers = Handlers::new();
    let executor = OnlineExecutor::new(FilterChain::standard(4096), handlers.collaborators());

    assert!(executor.shutdown());
    assert!(!executor.shutdown());
    assert!(executor.is_shut_down());
    assert_eq!(handlers.tiles.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(handlers.services.shutdowns.load(Ordering::SeqCst), 1);

    let client = Arc::new(RecordingClient::default());
    assert!(matches!(
        executor.execute(&sequential(), "service=tiling", client),
        Err(ExecuteError::ShutDown)
    ));
    assert!(matches!(
        executor.execute_task(&sequential(), ScriptedTask::new("late", Ok(()))),
        Err(ExecuteError::ShutDown)
    ));
    assert!(executor.task_status("late").is_none());
}
