//! Background job system for deferred embedding work.
//!
//! Single FIFO worker thread with a condvar-driven queue; jobs run strictly
//! after the transaction that scheduled them has committed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A unit of deferred work
pub trait BackgroundJob: Send + 'static {
    fn execute(self: Box<Self>, system: &JobSystem);
}

struct WorkerState {
    jobs: VecDeque<Box<dyn BackgroundJob>>,
    in_flight: bool,
    running: bool,
}

struct Shared {
    state: Mutex<WorkerState>,
    work_ready: Condvar,
    drained: Condvar,
    processed: AtomicU64,
}

/// FIFO background job queue with one worker thread.
///
/// Instance-owned rather than process-global so tests and embedders can
/// each run their own. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct JobSystem {
    shared: Arc<Shared>,
}

impl JobSystem {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState {
                jobs: VecDeque::new(),
                in_flight: false,
                running: true,
            }),
            work_ready: Condvar::new(),
            drained: Condvar::new(),
            processed: AtomicU64::new(0),
        });

        let system = Self {
            shared: shared.clone(),
        };
        let worker_handle = system.clone();

        thread::Builder::new()
            .name("embed-worker".to_string())
            .spawn(move || worker_loop(shared, worker_handle))
            .expect("Failed to spawn embed worker thread");

        system
    }

    /// Submit a job for execution after all currently queued jobs
    pub fn submit(&self, job: Box<dyn BackgroundJob>) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.running {
            return;
        }
        state.jobs.push_back(job);
        self.shared.work_ready.notify_one();
    }

    /// Jobs queued but not yet started
    pub fn pending_jobs(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.jobs.len() + usize::from(state.in_flight)
    }

    /// Total jobs executed
    pub fn jobs_processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Block until the queue drains or the timeout elapses.
    /// Returns true if the queue is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        while !state.jobs.is_empty() || state.in_flight {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .shared
                .drained
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
        true
    }

    /// Stop accepting jobs and let the worker drain what is queued
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.running = false;
        self.shared.work_ready.notify_all();
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(shared: Arc<Shared>, system: JobSystem) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            while state.jobs.is_empty() && state.running {
                state = shared.work_ready.wait(state).unwrap();
            }
            match state.jobs.pop_front() {
                Some(job) => {
                    state.in_flight = true;
                    job
                }
                None => break, // shutdown with empty queue
            }
        };

        job.execute(&system);

        let mut state = shared.state.lock().unwrap();
        state.in_flight = false;
        shared.processed.fetch_add(1, Ordering::Relaxed);
        if state.jobs.is_empty() {
            shared.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountJob {
        counter: Arc<AtomicUsize>,
    }

    impl BackgroundJob for CountJob {
        fn execute(self: Box<Self>, _system: &JobSystem) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RequeueJob {
        counter: Arc<AtomicUsize>,
        remaining: usize,
    }

    impl BackgroundJob for RequeueJob {
        fn execute(self: Box<Self>, system: &JobSystem) {
            self.counter.fetch_add(1, Ordering::SeqCst);
            if self.remaining > 0 {
                system.submit(Box::new(RequeueJob {
                    counter: self.counter.clone(),
                    remaining: self.remaining - 1,
                }));
            }
        }
    }

    #[test]
    fn test_jobs_run_and_drain() {
        let system = JobSystem::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            system.submit(Box::new(CountJob {
                counter: counter.clone(),
            }));
        }

        assert!(system.wait_idle(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(system.jobs_processed(), 10);
        assert_eq!(system.pending_jobs(), 0);
    }

    #[test]
    fn test_jobs_can_requeue() {
        let system = JobSystem::new();
        let counter = Arc::new(AtomicUsize::new(0));

        system.submit(Box::new(RequeueJob {
            counter: counter.clone(),
            remaining: 3,
        }));

        assert!(system.wait_idle(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_shutdown_rejects_new_jobs() {
        let system = JobSystem::new();
        system.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        system.submit(Box::new(CountJob {
            counter: counter.clone(),
        }));

        assert!(system.wait_idle(Duration::from_secs(1)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
