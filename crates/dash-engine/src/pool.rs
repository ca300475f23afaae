//! Long-lived bounded worker pool

use dash_core::{DashError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A unit of work run by the pool
pub type Job = BoxFuture<'static, ()>;

/// Fixed set of worker tasks pulling jobs from a bounded queue.
///
/// Sized once at construction and reused for every drain. At most `width`
/// jobs run at a time; when `queue_capacity` jobs are already waiting,
/// [`WorkerPool::submit`] waits for room. Dropping the pool stops the
/// workers and drops any job that has not finished.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
    width: usize,
}

impl WorkerPool {
    /// Start `width` workers on the current Tokio runtime.
    pub fn start(width: usize, queue_capacity: usize) -> Result<Self> {
        if width == 0 || queue_capacity == 0 {
            return Err(DashError::WorkerPool(
                "width and queue capacity must be positive".to_string(),
            ));
        }
        let handle = Handle::try_current().map_err(|_| {
            DashError::WorkerPool("a Tokio runtime is required to start workers".to_string())
        })?;

        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..width)
            .map(|index| {
                handle.spawn(worker_loop(
                    index,
                    Arc::clone(&receiver),
                    Arc::clone(&active),
                ))
            })
            .collect();

        tracing::debug!(width, queue_capacity, "started worker pool");
        Ok(Self {
            sender,
            workers,
            active,
            width,
        })
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| DashError::WorkerPool("worker pool has shut down".to_string()))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Jobs currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

async fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    active: Arc<AtomicUsize>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };

        active.fetch_add(1, Ordering::SeqCst);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!(worker = index, "job panicked");
        }
        active.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::trace!(worker = index, "worker stopped");
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("width", &self.width)
            .field("active", &self.active())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_jobs() {
        let pool = WorkerPool::start(2, 8).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.submit(
            async move {
                let _ = tx.send(42);
            }
            .boxed(),
        )
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_is_bounded() {
        let pool = WorkerPool::start(3, 16).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut done = Vec::new();

        for _ in 0..9 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let (tx, rx) = oneshot::channel::<()>();
            done.push(rx);
            pool.submit(
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    let _ = tx.send(());
                }
                .boxed(),
            )
            .await
            .unwrap();
        }
        for rx in done {
            rx.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::start(1, 4).unwrap();
        pool.submit(async { panic!("boom") }.boxed()).await.unwrap();

        let (tx, rx) = oneshot::channel();
        pool.submit(
            async move {
                let _ = tx.send(());
            }
            .boxed(),
        )
        .await
        .unwrap();
        assert!(rx.await.is_ok());
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            WorkerPool::start(2, 2),
            Err(DashError::WorkerPool(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_width_rejected() {
        assert!(WorkerPool::start(0, 2).is_err());
    }
}
