//! In-process job queue: FIFO dispatch with an N-way running limit.
//!
//! Scheduling happens on `add`, on `set_processor`, and whenever a job
//! finishes, so a backlog drains without a driver loop. All state lives behind
//! one mutex that is never held across an await.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;

use super::job::{Job, JobEvent, JobStatus};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Unit of work installed with [`JobQueue::set_processor`].
pub type Processor<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

struct QueueState<T, R> {
    jobs: HashMap<Uuid, Job<T, R>>,
    pending: VecDeque<Uuid>,
    running: usize,
    processor: Option<Processor<T, R>>,
}

struct QueueInner<T, R> {
    concurrency: usize,
    state: Mutex<QueueState<T, R>>,
    events: broadcast::Sender<JobEvent<T, R>>,
}

impl<T, R> QueueInner<T, R> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded-concurrency FIFO executor. Cloning shares the same queue.
///
/// Jobs are executed on the ambient Tokio runtime, so `add` must be called
/// from within one.
pub struct JobQueue<T, R> {
    inner: Arc<QueueInner<T, R>>,
}

impl<T, R> Clone for JobQueue<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> JobQueue<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Create a queue running at most `concurrency` jobs at once (minimum 1).
    pub fn new(concurrency: usize) -> Self {
        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(QueueInner {
                concurrency: concurrency.max(1),
                state: Mutex::new(QueueState {
                    jobs: HashMap::new(),
                    pending: VecDeque::new(),
                    running: 0,
                    processor: None,
                }),
                events,
            }),
        }
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self::new(config.concurrency)
    }

    /// Install the unit of work. Affects jobs dispatched from now on.
    pub fn set_processor<F, Fut>(&self, processor: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let processor: Processor<T, R> = Arc::new(move |data| processor(data).boxed());
        self.inner.lock().processor = Some(processor);
        self.dispatch();
    }

    /// Enqueue `data` and return its job id immediately.
    pub fn add(&self, data: T) -> Uuid {
        let job = Job::new(data);
        let id = job.id;
        {
            let mut state = self.inner.lock();
            state.jobs.insert(id, job);
            state.pending.push_back(id);
        }
        debug!(job_id = %id, "Job enqueued");
        self.dispatch();
        id
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job<T, R>> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    /// All known jobs, oldest first.
    pub fn get_all_jobs(&self) -> Vec<Job<T, R>> {
        let mut jobs: Vec<_> = self.inner.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Drop all job records and the pending list.
    ///
    /// Running jobs are not cancelled; they still occupy a slot until they
    /// finish, and their records are gone.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.jobs.clear();
        state.pending.clear();
        info!(running = state.running, "Queue cleared");
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent<T, R>> {
        self.inner.events.subscribe()
    }

    /// Wait until job `id` reaches a terminal state.
    ///
    /// Returns `None` if the job is unknown or its record was cleared.
    pub async fn wait(&self, id: Uuid) -> Option<Job<T, R>> {
        let mut rx = self.subscribe();
        loop {
            match self.get_job(id) {
                Some(job) if job.status.is_terminal() => return Some(job),
                Some(_) => {}
                None => return None,
            }
            if let Err(broadcast::error::RecvError::Closed) = rx.recv().await {
                return self.get_job(id);
            }
        }
    }

    /// Start pending jobs while slots are free.
    fn dispatch(&self) {
        loop {
            let (job, processor) = {
                let mut guard = self.inner.lock();
                let state = &mut *guard;
                if state.running >= self.inner.concurrency {
                    return;
                }
                let Some(id) = state.pending.pop_front() else {
                    return;
                };
                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };

                job.start();
                match state.processor.clone() {
                    Some(processor) => {
                        state.running += 1;
                        (job.clone(), processor)
                    }
                    None => {
                        job.finish(Err(QueueError::NoProcessor.to_string()));
                        let failed = job.clone();
                        drop(guard);
                        warn!(job_id = %failed.id, "Job dispatched with no processor set");
                        let _ = self.inner.events.send(JobEvent::Active(failed.clone()));
                        let _ = self.inner.events.send(JobEvent::Failed(failed));
                        continue;
                    }
                }
            };

            info!(job_id = %job.id, "Job active");
            let _ = self.inner.events.send(JobEvent::Active(job.clone()));

            let queue = self.clone();
            tokio::spawn(async move {
                let outcome = match AssertUnwindSafe(processor(job.data.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(format!("{e:#}")),
                    Err(panic) => Err(QueueError::ProcessorPanicked(panic_message(panic)).to_string()),
                };
                queue.finish(job, outcome);
            });
        }
    }

    /// Record a terminal outcome, free the slot and schedule the next job.
    fn finish(&self, mut snapshot: Job<T, R>, outcome: Result<R, String>) {
        let finished = {
            let mut state = self.inner.lock();
            state.running = state.running.saturating_sub(1);
            match state.jobs.get_mut(&snapshot.id) {
                Some(job) => {
                    job.finish(outcome);
                    job.clone()
                }
                None => {
                    snapshot.finish(outcome);
                    snapshot
                }
            }
        };

        match finished.status {
            JobStatus::Completed => {
                info!(job_id = %finished.id, "Job completed");
                let _ = self.inner.events.send(JobEvent::Completed(finished));
            }
            _ => {
                warn!(
                    job_id = %finished.id,
                    error = finished.error.as_deref().unwrap_or("unknown"),
                    "Job failed"
                );
                let _ = self.inner.events.send(JobEvent::Failed(finished));
            }
        }

        self.dispatch();
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    type TestQueue = JobQueue<u32, u32>;

    async fn wait_all(queue: &TestQueue, ids: &[Uuid]) -> Vec<Job<u32, u32>> {
        let mut jobs = Vec::new();
        for id in ids {
            jobs.push(queue.wait(*id).await.expect("job record"));
        }
        jobs
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let queue = TestQueue::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            queue.set_processor(move |n| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(n * 2)
                }
            });
        }

        let mut rx = queue.subscribe();
        let ids: Vec<_> = (0..5).map(|n| queue.add(n)).collect();
        assert!(queue.running_count() <= 2);

        // Every observed snapshot keeps at most two jobs running.
        let observer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut terminal = 0;
                while terminal < 5 {
                    match rx.recv().await {
                        Ok(event) => {
                            let running = queue
                                .get_all_jobs()
                                .iter()
                                .filter(|j| j.status == JobStatus::Running)
                                .count();
                            assert!(running <= 2, "{running} jobs running");
                            if event.job().status.is_terminal() {
                                terminal += 1;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        let jobs = wait_all(&queue, &ids).await;
        observer.await.unwrap();

        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.running_count(), 0);
        assert_eq!(jobs[3].result, Some(6));
    }

    #[tokio::test]
    async fn failing_job_is_isolated() {
        let queue = TestQueue::new(2);
        queue.set_processor(|n| async move {
            if n == 2 {
                anyhow::bail!("job {n} exploded");
            }
            Ok(n)
        });

        let ids: Vec<_> = (0..5).map(|n| queue.add(n)).collect();
        let jobs = wait_all(&queue, &ids).await;

        for (n, job) in jobs.iter().enumerate() {
            if n == 2 {
                assert_eq!(job.status, JobStatus::Failed);
                assert_eq!(job.error.as_deref(), Some("job 2 exploded"));
                assert!(job.completed_at.is_some());
            } else {
                assert_eq!(job.status, JobStatus::Completed);
                assert_eq!(job.result, Some(n as u32));
            }
        }
    }

    #[tokio::test]
    async fn panicking_processor_fails_only_that_job() {
        let queue = TestQueue::new(1);
        queue.set_processor(|n| async move {
            if n == 0 {
                panic!("processor bug");
            }
            Ok(n)
        });

        let first = queue.add(0);
        let second = queue.add(1);

        let failed = queue.wait(first).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("processor bug"));

        let ok = queue.wait(second).await.unwrap();
        assert_eq!(ok.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn missing_processor_fails_with_configuration_error() {
        let queue = TestQueue::new(1);
        let id = queue.add(1);

        let job = queue.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("No processor set for queue"));
        assert_eq!(queue.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_order_is_fifo() {
        let queue = TestQueue::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let order = Arc::clone(&order);
            queue.set_processor(move |n| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(n);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(n)
                }
            });
        }

        let ids: Vec<_> = (0..4).map(|n| queue.add(n)).collect();
        assert_eq!(queue.pending_count(), 3);
        wait_all(&queue, &ids).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn events_follow_lifecycle() {
        let queue = TestQueue::new(1);
        queue.set_processor(|n| async move { Ok(n + 1) });
        let mut rx = queue.subscribe();

        let id = queue.add(41);

        match rx.recv().await.unwrap() {
            JobEvent::Active(job) => {
                assert_eq!(job.id, id);
                assert_eq!(job.status, JobStatus::Running);
            }
            other => panic!("expected Active, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            JobEvent::Completed(job) => assert_eq!(job.result, Some(42)),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_records_but_running_job_finishes() {
        let queue = TestQueue::new(1);
        queue.set_processor(|n| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(n)
        });
        let mut rx = queue.subscribe();

        let running = queue.add(1);
        let pending = queue.add(2);
        queue.clear();

        assert!(queue.get_job(running).is_none());
        assert!(queue.get_job(pending).is_none());
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.running_count(), 1);

        // The in-flight job still reports completion.
        loop {
            if let JobEvent::Completed(job) = rx.recv().await.unwrap() {
                assert_eq!(job.id, running);
                break;
            }
        }
        assert_eq!(queue.running_count(), 0);
        assert!(queue.wait(running).await.is_none());
    }
}
