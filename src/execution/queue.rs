//! FIFO job queue shared by the workers of one pool.

use std::collections::VecDeque;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::job::Job;
use super::strategy::StrategyError;
use super::thread_pool::{ShutdownPolicy, WaitMode};
use super::worker::WorkerState;

struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// Mutex-guarded FIFO with a condition variable for blocking workers.
///
/// The queue is open from construction so jobs can be staged before workers
/// start; it closes for good when its pool stops.
pub struct JobQueue {
    strategy: &'static str,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl JobQueue {
    pub(crate) fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a job and wake one waiting worker.
    pub(crate) fn push(&self, job: Job) -> Result<(), StrategyError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(StrategyError::NotInitialized {
                    strategy: self.strategy,
                });
            }
            state.jobs.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    pub(crate) fn pop(&self) -> Option<Job> {
        self.state.lock().jobs.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    /// Next job for `worker`, waiting per `mode` while the queue is empty.
    ///
    /// Returns `None` once the worker has been stopped; under
    /// [`ShutdownPolicy::Drain`] a stopped worker keeps taking jobs until the
    /// queue is empty. The running flag is read under the queue lock, so a
    /// stop followed by [`wake_all`](Self::wake_all) cannot be missed.
    pub(crate) fn next_job(
        &self,
        worker: &WorkerState,
        mode: WaitMode,
        policy: ShutdownPolicy,
    ) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if !worker.is_running() {
                return match policy {
                    ShutdownPolicy::Drain => state.jobs.pop_front(),
                    ShutdownPolicy::DropQueued => None,
                };
            }
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            match mode {
                WaitMode::Block => self.available.wait(&mut state),
                WaitMode::Poll(interval) => {
                    MutexGuard::unlocked(&mut state, || thread::sleep(interval));
                }
            }
        }
    }

    /// Wake every waiting worker so it rechecks its running flag.
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.available.notify_all();
    }

    /// Refuse further pushes and wake every waiting worker.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Remove everything still queued. Callers drop the result outside the lock.
    pub(crate) fn drain(&self) -> Vec<Job> {
        self.state.lock().jobs.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_is_fifo() {
        let queue = JobQueue::new("test");
        let ids: Vec<u64> = (0..4)
            .map(|i| {
                let job = Job::new(format!("job-{}", i), |_| Ok(()));
                let id = job.id();
                queue.push(job).unwrap();
                id
            })
            .collect();

        assert_eq!(queue.len(), 4);
        let popped: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|j| j.id()).collect();
        assert_eq!(popped, ids);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_queue_rejects_push() {
        let queue = JobQueue::new("test");
        queue.close();
        let err = queue.push(Job::new("late", |_| Ok(()))).unwrap_err();
        assert!(matches!(err, StrategyError::NotInitialized { strategy: "test" }));
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = JobQueue::new("test");
        queue.push(Job::new("a", |_| Ok(()))).unwrap();
        queue.push(Job::new("b", |_| Ok(()))).unwrap();
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }
}
