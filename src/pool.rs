//! Bounded worker pool.
//!
//! A fixed set of tokio tasks drains a bounded job queue. `submit` waits while
//! the queue is full. `stop` closes the queue and waits for every queued and
//! running job. `cancel` is advisory: workers stop taking new jobs, but a job
//! that is already running (mid-request or mid-backoff) runs to completion.

use crate::types::{ConfusedError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

pub struct WorkerPool {
    size: usize,
    sender: Option<mpsc::Sender<Job>>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool of `size` workers (at least one) with a queue of twice that.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(size * 2);
        let (cancel, _) = watch::channel(false);
        Self {
            size,
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            cancel,
            workers: Vec::with_capacity(size),
        }
    }

    /// Create and start a pool.
    pub fn started(size: usize) -> Self {
        let mut pool = Self::new(size);
        pool.start();
        pool
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn the workers. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        for id in 0..self.size {
            let receiver = Arc::clone(&self.receiver);
            let cancel = self.cancel.subscribe();
            self.workers
                .push(tokio::spawn(run_worker(id, receiver, cancel)));
        }
        debug!("Started worker pool with {} workers", self.size);
    }

    /// Queue a job, waiting while the queue is full.
    ///
    /// A submitter still waiting when the pool is cancelled gets `PoolClosed`.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(ConfusedError::PoolClosed)?;
        let mut cancel = self.cancel.subscribe();
        if *cancel.borrow_and_update() {
            return Err(ConfusedError::PoolClosed);
        }

        tokio::select! {
            biased;
            _ = cancel.changed() => Err(ConfusedError::PoolClosed),
            sent = sender.send(job.boxed()) => sent.map_err(|_| ConfusedError::PoolClosed),
        }
    }

    /// Stop handing out queued jobs. Running jobs are not interrupted.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn stop(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("Worker exited abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        if *cancel.borrow_and_update() {
            debug!("Worker {} cancelled", id);
            break;
        }

        let job = {
            let mut queue = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.changed() => None,
                job = queue.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!("Worker {} recovered from a panicking job", id);
        }
    }
}

/// Run `jobs` on a fresh pool of `size` workers and collect their outputs.
///
/// Outputs come back in completion order through a channel sized to the job
/// count, so a full channel can never stall a worker.
pub async fn run_collect<T, F>(size: usize, jobs: Vec<F>) -> Vec<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let (tx, mut rx) = mpsc::channel(jobs.len());
    let pool = WorkerPool::started(size);

    for job in jobs {
        let tx = tx.clone();
        let submitted = pool
            .submit(async move {
                let output = job.await;
                let _ = tx.send(output).await;
            })
            .await;
        if let Err(e) = submitted {
            warn!("Unable to submit job: {}", e);
            break;
        }
    }
    drop(tx);
    pool.stop().await;

    let mut outputs = Vec::new();
    while let Some(output) = rx.recv().await {
        outputs.push(output);
    }
    outputs
}
