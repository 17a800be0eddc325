//! Bounded worker pool that runs the highest priority job first.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::Priority;

/// A unit of work schedulable by `PriorityExecutor`.
pub trait Job: Send + Sync + 'static {
    /// Current priority, read when picking the next job.
    fn priority(&self) -> Priority;
    /// Submission order, lower runs first among equal priorities.
    fn sequence(&self) -> u64;
    /// Cancelled jobs are dropped instead of run.
    fn is_cancelled(&self) -> bool;
}

type Runner<J> = Arc<dyn Fn(Arc<J>) -> BoxFuture<'static, ()> + Send + Sync>;

struct State<J> {
    queue: Vec<Arc<J>>,
    active: usize,
    thread_count: usize,
    shutdown: bool,
}

impl<J: Job> State<J> {
    fn take_next(&mut self) -> Option<Arc<J>> {
        self.queue.retain(|job| !job.is_cancelled());
        let index = self
            .queue
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority()
                    .cmp(&b.priority())
                    .then_with(|| b.sequence().cmp(&a.sequence()))
            })
            .map(|(index, _)| index)?;
        Some(self.queue.swap_remove(index))
    }
}

/// Runs at most `thread_count` jobs concurrently on the tokio runtime.
pub struct PriorityExecutor<J> {
    state: Mutex<State<J>>,
    runner: Runner<J>,
}

impl<J: Job> PriorityExecutor<J> {
    /// Creates an executor running jobs with `runner`.
    pub fn new<F>(thread_count: usize, runner: F) -> Arc<Self>
    where
        F: Fn(Arc<J>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            state: Mutex::new(State {
                queue: Vec::new(),
                active: 0,
                thread_count: thread_count.max(1),
                shutdown: false,
            }),
            runner: Arc::new(runner),
        })
    }

    /// Queues a job. Returns false once the executor is shut down.
    pub fn submit(self: &Arc<Self>, job: Arc<J>) -> bool {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return false;
            }
            state.queue.push(job);
        }
        self.schedule();
        true
    }

    /// Changes the number of concurrent workers.
    pub fn set_thread_count(self: &Arc<Self>, thread_count: usize) {
        let thread_count = thread_count.max(1);
        {
            let mut state = self.state.lock();
            if state.thread_count == thread_count {
                return;
            }
            trace!(from = state.thread_count, to = thread_count, "Adjusting worker count");
            state.thread_count = thread_count;
        }
        self.schedule();
    }

    /// Current worker limit.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.state.lock().thread_count
    }

    /// Number of queued, not yet started jobs.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Drops queued jobs and refuses new ones. Running jobs finish.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.queue.clear();
    }

    /// Returns true after `shutdown`.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    fn schedule(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while state.active < state.thread_count && !state.shutdown {
            let Some(job) = state.take_next() else {
                break;
            };
            state.active += 1;
            let executor = Arc::clone(self);
            let run = (self.runner)(job);
            tokio::spawn(async move {
                run.await;
                executor.state.lock().active -= 1;
                executor.schedule();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::{Semaphore, mpsc};

    struct TestJob {
        name: &'static str,
        priority: Priority,
        sequence: u64,
        cancelled: AtomicBool,
    }

    impl TestJob {
        fn new(name: &'static str, priority: Priority, sequence: u64) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                sequence,
                cancelled: AtomicBool::new(false),
            })
        }
    }

    impl Job for TestJob {
        fn priority(&self) -> Priority {
            self.priority
        }

        fn sequence(&self) -> u64 {
            self.sequence
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    /// Executor whose jobs report their name and then wait for a gate permit.
    fn gated_executor(
        threads: usize,
    ) -> (
        Arc<PriorityExecutor<TestJob>>,
        mpsc::UnboundedReceiver<&'static str>,
        Arc<Semaphore>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let job_gate = gate.clone();
        let executor = PriorityExecutor::new(threads, move |job: Arc<TestJob>| {
            let tx = tx.clone();
            let gate = job_gate.clone();
            Box::pin(async move {
                let _ = tx.send(job.name);
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }) as BoxFuture<'static, ()>
        });
        (executor, rx, gate)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<&'static str>) -> &'static str {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let (executor, mut rx, gate) = gated_executor(1);

        executor.submit(TestJob::new("blocker", Priority::Normal, 0));
        assert_eq!(next(&mut rx).await, "blocker");

        executor.submit(TestJob::new("low", Priority::Low, 1));
        executor.submit(TestJob::new("normal-a", Priority::Normal, 2));
        executor.submit(TestJob::new("high", Priority::High, 3));
        executor.submit(TestJob::new("normal-b", Priority::Normal, 4));

        let mut order = Vec::new();
        for _ in 0..4 {
            gate.add_permits(1);
            order.push(next(&mut rx).await);
        }
        assert_eq!(order, vec!["high", "normal-a", "normal-b", "low"]);
    }

    #[tokio::test]
    async fn test_cancelled_jobs_are_skipped() {
        let (executor, mut rx, gate) = gated_executor(1);
        executor.submit(TestJob::new("blocker", Priority::Normal, 0));
        assert_eq!(next(&mut rx).await, "blocker");

        let doomed = TestJob::new("doomed", Priority::High, 1);
        executor.submit(doomed.clone());
        executor.submit(TestJob::new("kept", Priority::Low, 2));
        doomed.cancelled.store(true, Ordering::SeqCst);

        gate.add_permits(1);
        assert_eq!(next(&mut rx).await, "kept");
    }

    #[tokio::test]
    async fn test_thread_count_bounds_concurrency() {
        let (executor, mut rx, gate) = gated_executor(2);
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            executor.submit(TestJob::new(name, Priority::Normal, i as u64));
        }
        assert_eq!(next(&mut rx).await, "a");
        assert_eq!(next(&mut rx).await, "b");
        assert_eq!(executor.queued(), 1);

        executor.set_thread_count(3);
        assert_eq!(next(&mut rx).await, "c");
        gate.add_permits(3);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_jobs() {
        let (executor, _rx, _gate) = gated_executor(1);
        executor.shutdown();
        assert!(executor.is_shutdown());
        assert!(!executor.submit(TestJob::new("late", Priority::High, 0)));
    }
}
