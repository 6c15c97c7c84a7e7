//! Background worker fed by a bounded queue.
//!
//! `BackgroundWorker<R>` owns a tokio task that hands every queued task to a
//! `BackgroundRunnable`. Producers on the request path use a cloned
//! [`WorkerHandle`] and `try_submit`, which never waits.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// WorkerHandle
// ---------------------------------------------------------------------------

/// Cloneable submission side of a worker's queue.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for WorkerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Queues `task` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the task back when the queue is full or the worker stopped.
    pub fn try_submit(&self, task: T) -> Result<(), TrySendError<T>> {
        self.tx.try_send(task)
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Owns the worker task.
///
/// Stopping lets the runnable finish the task in hand, then calls
/// `shutdown`. Tasks still queued at that point are dropped.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: mpsc::Sender<R::Task>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker with a queue of `capacity` tasks (at least 1).
    #[must_use]
    pub fn start(mut runnable: R, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    task = rx.recv() => match task {
                        Some(t) => runnable.run(t).await,
                        None => break,
                    },
                }
            }
            runnable.shutdown().await;
        });

        Self {
            tx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn handle(&self) -> WorkerHandle<R::Task> {
        WorkerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Signals the worker and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
