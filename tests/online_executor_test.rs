//! Integration tests for the installed process-wide dispatcher.
//!
//! The dispatcher is global, so the whole lifecycle runs in one test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tissue_exec::execution::{
    JobContext, JobError, ProcessingStrategy, SequentialExecutor, ShutdownPolicy,
    TaskQueueExecutor, ThreadPool, ThreadPoolConfig,
};
use tissue_exec::online::{
    ClientConnection, Collaborators, DispatchOutcome, ExecuteError, FilterChain, FilterOutcome,
    OnlineExecutor, Request, RequestFilter, RequestHandler, RequestKind, ServiceParamFilter,
    Task, TaskStatus,
};

#[derive(Default)]
struct Client {
    rejections: Mutex<Vec<String>>,
}

impl ClientConnection for Client {
    fn descriptor(&self) -> i64 {
        7
    }

    fn reject(&self, reason: &str) {
        self.rejections.lock().unwrap().push(reason.to_string());
    }
}

#[derive(Default)]
struct CountingHandler {
    handled: AtomicUsize,
    shut_down: AtomicUsize,
}

impl RequestHandler for CountingHandler {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn handle(
        &self,
        request: &Request,
        _client: &dyn ClientConnection,
        _ctx: &JobContext<'_>,
    ) -> Result<(), JobError> {
        if request.parameter("dataset").is_none() {
            return Err(JobError::failed("dataset missing"));
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.fetch_add(1, Ordering::SeqCst);
    }
}

/// Rejects requests flagged with `block=1`.
struct BlockFlag;

impl RequestFilter for BlockFlag {
    fn name(&self) -> &'static str {
        "block-flag"
    }

    fn apply(&self, request: Request) -> FilterOutcome {
        if request.parameter("block") == Some("1") {
            FilterOutcome::reject("R")
        } else {
            FilterOutcome::Pass(request)
        }
    }
}

struct ConversionTask;

impl Task for ConversionTask {
    fn id(&self) -> &str {
        "conversion-0001"
    }

    fn run(&self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        assert_eq!(ctx.strategy_name(), "task-queue");
        Ok(())
    }
}

#[test]
fn installed_dispatcher_lifecycle() {
    let tiles = Arc::new(CountingHandler::default());
    let collaborators = Collaborators {
        tile_extractor: tiles.clone(),
        ..Collaborators::default()
    };
    let filters = FilterChain::new().with(ServiceParamFilter).with(BlockFlag);

    let dispatcher = OnlineExecutor::install(filters, collaborators).unwrap();
    assert!(std::ptr::eq(dispatcher, OnlineExecutor::instance()));
    assert!(matches!(
        OnlineExecutor::install(FilterChain::new(), Collaborators::default()),
        Err(ExecuteError::AlreadyInstalled)
    ));

    let sequential = SequentialExecutor::new();
    sequential.init().unwrap();

    // Second filter rejects: caller and client both see the reason.
    let client = Arc::new(Client::default());
    let outcome = dispatcher
        .execute(&sequential, "service=tiling&dataset=1&block=1", client.clone())
        .unwrap();
    assert_eq!(outcome.rejection_reason(), Some("R"));
    assert_eq!(tiles.handled.load(Ordering::SeqCst), 0);
    assert_eq!(*client.rejections.lock().unwrap(), vec!["R".to_string()]);

    // Passing requests reach the tile extractor on a pool.
    let pool = ThreadPool::new(2);
    pool.init().unwrap();
    for slice in 0..4 {
        let outcome = dispatcher
            .execute(&pool, format!("service=tiling&dataset=1&slice={}", slice), Arc::new(Client::default()))
            .unwrap();
        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { kind: RequestKind::TileExtraction, .. }
        ));
    }
    pool.stop();

    // Routed to an unavailable collaborator: dispatched, then failed to the client.
    let client = Arc::new(Client::default());
    dispatcher
        .execute(&sequential, "service=conversion&file=a.mnc", client.clone())
        .unwrap();
    assert_eq!(client.rejections.lock().unwrap().len(), 1);

    // Internal task on the task queue.
    let queue = TaskQueueExecutor::with_config(ThreadPoolConfig {
        shutdown_policy: ShutdownPolicy::Drain,
        ..ThreadPoolConfig::blocking(1)
    });
    queue.init().unwrap();
    dispatcher.execute_task(&queue, Arc::new(ConversionTask)).unwrap();
    queue.stop();
    let record = dispatcher.task_status("conversion-0001").unwrap();
    assert_eq!(record.status, TaskStatus::Finished);

    let stats = dispatcher.stats();
    assert_eq!(stats.requests_rejected, 1);
    assert_eq!(stats.tasks_submitted, 1);

    assert!(dispatcher.shutdown());
    assert!(!OnlineExecutor::instance().shutdown());
    assert_eq!(tiles.shut_down.load(Ordering::SeqCst), 1);
    assert!(matches!(
        dispatcher.execute(&sequential, "service=tiling&dataset=1", Arc::new(Client::default())),
        Err(ExecuteError::ShutDown)
    ));
    assert!(!pool.is_running());
}
