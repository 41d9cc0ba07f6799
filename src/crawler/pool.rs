//! Fixed-size worker pool over a bounded task queue.
//!
//! Each call to [`run_stage`] owns its queue, its workers and its
//! [`StageBarrier`]; nothing is shared between stages. Every queued task
//! carries a [`Completion`] ticket that releases the barrier when dropped, so
//! a task that errors, panics or is discarded on cancellation still counts as
//! finished.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressCounter;

/// Releases once every registered task has completed
#[derive(Debug, Default)]
pub struct StageBarrier {
    pending: AtomicUsize,
    notify: Notify,
}

impl StageBarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one task; the returned ticket must travel with it
    pub fn register(self: &Arc<Self>) -> Completion {
        self.pending.fetch_add(1, Ordering::AcqRel);
        Completion { barrier: Arc::clone(self) }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Signals completion of one task exactly once, on drop
#[derive(Debug)]
pub struct Completion {
    barrier: Arc<StageBarrier>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.barrier.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.barrier.notify.notify_waiters();
        }
    }
}

struct Task<T> {
    item: T,
    done: Completion,
}

#[derive(Debug, Clone)]
pub struct StageOptions {
    pub name: &'static str,
    pub workers: usize,
    pub queue_capacity: usize,
}

/// What a stage handed back
#[derive(Debug)]
pub struct StageRun<O> {
    /// `(submission index, output)` for every task that ran to completion
    pub outputs: Vec<(usize, O)>,
    pub submitted: usize,
    pub cancelled: bool,
}

/// Push `items` through `options.workers` concurrent workers.
///
/// Submission suspends while the queue is full. Workers check `cancel` before
/// taking the next task; once cancelled, queued tasks are dropped unprocessed.
/// The progress counter is bumped once per task a worker starts, even one whose
/// handler panicked, before its ticket is released.
pub async fn run_stage<T, O, F, Fut>(
    options: StageOptions,
    items: Vec<T>,
    progress: ProgressCounter,
    cancel: CancellationToken,
    handler: F,
) -> StageRun<O>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let barrier = StageBarrier::new();
    let (queue_tx, queue_rx) = mpsc::channel::<(usize, Task<T>)>(options.queue_capacity.max(1));
    let queue_rx = Arc::new(Mutex::new(queue_rx));
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<(usize, O)>();
    let handler = Arc::new(handler);

    let mut workers = JoinSet::new();
    for id in 0..options.workers.max(1) {
        let queue_rx = Arc::clone(&queue_rx);
        let out_tx = out_tx.clone();
        let handler = Arc::clone(&handler);
        let progress = progress.clone();
        let cancel = cancel.clone();
        let name = options.name;

        workers.spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    tracing::debug!(stage = name, worker = id, "worker stopping on cancel");
                    break;
                }
                let next = queue_rx.lock().await.recv().await;
                let Some((index, Task { item, done })) = next else {
                    break;
                };
                if cancel.is_cancelled() {
                    drop(done);
                    break;
                }
                match tokio::spawn(handler(item)).await {
                    Ok(output) => {
                        progress.inc();
                        let _ = out_tx.send((index, output));
                    }
                    Err(e) => {
                        tracing::error!(stage = name, task = index, error = %e, "task aborted");
                        progress.inc();
                    }
                }
                drop(done);
            }
        });
    }
    drop(out_tx);

    let mut submitted = 0;
    for (index, item) in items.into_iter().enumerate() {
        let task = Task { item, done: barrier.register() };
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            res = queue_tx.send((index, task)) => res.is_ok(),
        };
        if !sent {
            break;
        }
        submitted += 1;
    }
    drop(queue_tx);

    tokio::select! {
        _ = barrier.wait() => {}
        _ = cancel.cancelled() => {
            // workers stop dequeuing once cancelled; release what is left
            let mut rx = queue_rx.lock().await;
            rx.close();
            while rx.try_recv().is_ok() {}
            drop(rx);
            barrier.wait().await;
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(stage = options.name, error = %e, "worker exited abnormally");
        }
    }

    let mut outputs = Vec::with_capacity(submitted);
    while let Some(out) = out_rx.recv().await {
        outputs.push(out);
    }
    outputs.sort_by_key(|(index, _)| *index);

    StageRun {
        outputs,
        submitted,
        cancelled: cancel.is_cancelled(),
    }
}
