//! Asynchronous delivery of dispatch errors to an [`ErrorLogger`].
//!
//! The request path only calls [`AuditLog::record`], which never blocks. When
//! the queue is full or the worker has stopped, the event is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use postwire_core::{ErrorEvent, ErrorLogger};
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use super::worker::{BackgroundRunnable, BackgroundWorker, WorkerHandle};

/// Runs the configured logger on the audit worker.
pub struct AuditRunnable {
    logger: Arc<dyn ErrorLogger>,
}

#[async_trait]
impl BackgroundRunnable for AuditRunnable {
    type Task = ErrorEvent;

    async fn run(&mut self, event: ErrorEvent) {
        self.logger.log_error(&event);
    }
}

/// Producer side of the audit queue.
#[derive(Debug, Clone)]
pub struct AuditLog {
    handle: WorkerHandle<ErrorEvent>,
}

impl AuditLog {
    /// Starts the audit worker. The caller owns the worker and stops it on
    /// shutdown.
    #[must_use]
    pub fn start(
        logger: Arc<dyn ErrorLogger>,
        capacity: usize,
    ) -> (Self, BackgroundWorker<AuditRunnable>) {
        let worker = BackgroundWorker::start(AuditRunnable { logger }, capacity);
        (
            Self {
                handle: worker.handle(),
            },
            worker,
        )
    }

    /// Queues `event` for the logger. Returns `false` if it was dropped.
    pub fn record(&self, event: ErrorEvent) -> bool {
        match self.handle.try_submit(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!(service = %event.service_name, method = %event.method_name, "Audit queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(service = %event.service_name, method = %event.method_name, "Audit worker stopped, dropping event");
                false
            }
        }
    }
}
