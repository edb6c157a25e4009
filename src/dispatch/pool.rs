//! Fixed-size worker pool.
//!
//! Workers share one job queue. Each iteration a worker races the shutdown
//! signal against the next job; a job it has pulled always runs to
//! completion. Results go either to the pool's shared channel, tagged with
//! the [`JobId`] handed out by [`WorkerPool::dispatch`], or to the
//! [`Submission`] returned by [`WorkerPool::submit`]. A job that panics is
//! reported as [`Error::JobPanicked`] and the worker moves on.
//!
//! # Examples
//!
//! ```ignore
//! let mut pool = client.pool(4);
//! for n in 1..=10 {
//!     pool.dispatch(client.get(&ctx, &format!("/todos/{n}")))?;
//! }
//! for _ in 1..=10 {
//!     if let Some(done) = pool.next_result().await {
//!         println!("{} -> {:?}", done.id, done.result.map(|r| r.status));
//!     }
//! }
//! pool.wait().await;
//! ```

use crate::client::RequestBuilder;
use crate::error::{Error, Result};
use crate::response::Response;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Workers used when a pool is created with zero.
pub const DEFAULT_WORKERS: usize = 10;

/// Identifies a dispatched job in the shared result channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Numeric value, increasing in dispatch order.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Outcome of a dispatched job.
#[derive(Debug)]
pub struct PoolResult {
    /// Job the outcome belongs to.
    pub id: JobId,
    /// The job's response or error.
    pub result: Result<Response>,
}

enum Reply {
    Shared(JobId),
    Dedicated(oneshot::Sender<Result<Response>>),
}

struct Job {
    builder: RequestBuilder,
    reply: Reply,
}

/// Bounded set of workers executing request builders.
pub struct WorkerPool {
    jobs: mpsc::UnboundedSender<Job>,
    results: Option<mpsc::UnboundedReceiver<PoolResult>>,
    shutdown: CancellationToken,
    workers: JoinSet<()>,
    next_id: AtomicU64,
    size: usize,
}

impl WorkerPool {
    /// Start `workers` workers, or [`DEFAULT_WORKERS`] for zero.
    ///
    /// Must be called from within a Tokio runtime. Dropping the pool without
    /// [`wait`](WorkerPool::wait) aborts jobs that are still running.
    pub fn new(workers: usize) -> Self {
        let size = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let (jobs, queue) = mpsc::unbounded_channel();
        let (results_tx, results) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(queue));
        let shutdown = CancellationToken::new();

        let mut set = JoinSet::new();
        for worker in 0..size {
            set.spawn(work(
                worker,
                Arc::clone(&queue),
                results_tx.clone(),
                shutdown.clone(),
            ));
        }
        tracing::debug!(workers = size, "worker pool started");

        Self {
            jobs,
            results: Some(results),
            shutdown,
            workers: set,
            next_id: AtomicU64::new(0),
            size,
        }
    }

    /// Queue `builder`; its outcome goes to the shared result channel.
    pub fn dispatch(&self, builder: RequestBuilder) -> Result<JobId> {
        if self.shutdown.is_cancelled() {
            return Err(Error::PoolClosed);
        }
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.jobs
            .send(Job {
                builder,
                reply: Reply::Shared(id),
            })
            .map_err(|_| Error::PoolClosed)?;
        Ok(id)
    }

    /// Queue `builder` and get a future for its own outcome.
    ///
    /// The job runs on the pool's workers like any other. It resolves to
    /// [`Error::PoolClosed`] if the pool shuts down before running it.
    pub fn submit(&self, builder: RequestBuilder) -> Submission {
        let (tx, rx) = oneshot::channel();
        if !self.shutdown.is_cancelled() {
            // A failed send drops the job and with it `tx`, closing `rx`.
            let _ = self.jobs.send(Job {
                builder,
                reply: Reply::Dedicated(tx),
            });
        }
        Submission { rx }
    }

    /// Next outcome from the shared channel.
    ///
    /// Returns `None` once the pool is shut down and every outcome was read,
    /// or after [`take_results`](WorkerPool::take_results).
    pub async fn next_result(&mut self) -> Option<PoolResult> {
        self.results.as_mut()?.recv().await
    }

    /// Take the shared channel as a stream. Only the first call gets it.
    pub fn take_results(&mut self) -> Option<UnboundedReceiverStream<PoolResult>> {
        self.results.take().map(UnboundedReceiverStream::new)
    }

    /// Shut down and wait until every worker has stopped.
    ///
    /// Jobs already pulled by a worker finish first; jobs still queued are
    /// dropped. Afterwards nothing new reaches the shared channel and
    /// dispatching fails with [`Error::PoolClosed`].
    pub async fn wait(&mut self) {
        self.shutdown.cancel();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
        tracing::debug!(workers = self.size, "worker pool stopped");
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True once shutdown was requested.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

async fn work(
    worker: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    results: mpsc::UnboundedSender<PoolResult>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            job = async { queue.lock().await.recv().await } => job,
        };
        let Some(Job { mut builder, reply }) = next else {
            break;
        };

        let result = match AssertUnwindSafe(builder.result()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!(worker, %message, "job panicked");
                Err(Error::JobPanicked(message))
            }
        };
        drop(builder);
        match reply {
            Reply::Shared(id) => {
                let _ = results.send(PoolResult { id, result });
            }
            Reply::Dedicated(tx) => {
                let _ = tx.send(result);
            }
        }
    }
    tracing::debug!(worker, "worker exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Outcome of a job queued with [`WorkerPool::submit`].
#[derive(Debug)]
pub struct Submission {
    rx: oneshot::Receiver<Result<Response>>,
}

impl Future for Submission {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| Error::PoolClosed).and_then(|r| r))
    }
}
