//! A single OS worker thread with a cooperative running flag.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State shared between a [`WorkerThread`] and the loop it runs.
#[derive(Debug)]
pub struct WorkerState {
    index: usize,
    running: AtomicBool,
}

impl WorkerState {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Checked by the loop at every wake-up.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// One OS thread executing a wait/consume loop.
///
/// The loop receives a reference to the worker's own state so it can observe
/// [`stop`](WorkerThread::stop). Stopping never interrupts work in progress.
#[derive(Debug)]
pub struct WorkerThread {
    state: Arc<WorkerState>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawn a named thread running `wait_loop`. `stack_size` 0 keeps the
    /// platform default.
    pub fn spawn<F>(index: usize, name: String, stack_size: usize, wait_loop: F) -> io::Result<Self>
    where
        F: FnOnce(&WorkerState) + Send + 'static,
    {
        let state = Arc::new(WorkerState {
            index,
            running: AtomicBool::new(true),
        });
        let loop_state = Arc::clone(&state);

        let mut builder = thread::Builder::new().name(name);
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder.spawn(move || wait_loop(&loop_state))?;

        Ok(Self {
            state,
            handle: Some(handle),
        })
    }

    pub fn index(&self) -> usize {
        self.state.index
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Ask the loop to exit at its next check.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
    }

    /// Wait for the thread to exit. Returns false if there was nothing to
    /// join, or if called from the worker thread itself.
    pub fn join(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        if handle.thread().id() == thread::current().id() {
            // A job stopping its own pool; the loop exits once the job returns.
            return false;
        }
        if handle.join().is_err() {
            tracing::error!(worker = self.state.index, "worker thread panicked");
        }
        true
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_worker_runs_until_stopped() {
        let spins = Arc::new(AtomicUsize::new(0));
        let counter = spins.clone();
        let mut worker = WorkerThread::spawn(3, "test-worker-3".into(), 0, move |state| {
            assert_eq!(state.index(), 3);
            while state.is_running() {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert!(worker.is_running());
        thread::sleep(Duration::from_millis(20));
        worker.stop();
        assert!(!worker.is_running());
        assert!(worker.join());
        assert!(!worker.join(), "second join has nothing to wait for");
        assert!(spins.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_drop_stops_and_joins() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let worker = WorkerThread::spawn(0, "test-worker-drop".into(), 64 * 1024, move |state| {
            while state.is_running() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        drop(worker);
        assert!(exited.load(Ordering::SeqCst));
    }
}
