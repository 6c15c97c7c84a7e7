//! Audit callback for failed dispatches.

use std::sync::Arc;

use tracing::info;

use crate::error::RpcError;

/// A request that failed after routing succeeded.
#[derive(Debug)]
pub struct ErrorEvent {
    pub service_id: Arc<str>,
    pub service_name: Arc<str>,
    pub method_name: Arc<str>,
    /// HTTP status the error was rendered with.
    pub status: u16,
    pub error: RpcError,
}

/// Receives every dispatch-time error.
///
/// Called from a background worker, never from the request path. Delivery is
/// best-effort: events can be dropped when the queue is full or the process
/// exits first.
pub trait ErrorLogger: Send + Sync + 'static {
    fn log_error(&self, event: &ErrorEvent);
}

impl<F> ErrorLogger for F
where
    F: Fn(&ErrorEvent) + Send + Sync + 'static,
{
    fn log_error(&self, event: &ErrorEvent) {
        self(event);
    }
}

/// Default logger: one `info` record per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLogger;

impl ErrorLogger for TracingErrorLogger {
    fn log_error(&self, event: &ErrorEvent) {
        info!(
            service_id = %event.service_id,
            service = %event.service_name,
            method = %event.method_name,
            status = event.status,
            error = %event.error,
            "rpc call failed"
        );
    }
}
