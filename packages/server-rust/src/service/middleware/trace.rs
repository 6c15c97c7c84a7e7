//! Per-call tracing span.
//!
//! Records call duration and outcome as span fields rather than through a
//! metrics crate.

use std::time::Instant;

use async_trait::async_trait;
use postwire_core::RpcError;
use tracing::{info_span, Instrument};

use super::chain::{Middleware, Next};
use crate::service::exchange::Exchange;

/// Wraps the rest of the chain in an `rpc` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), RpcError> {
        let (service, method) = exchange
            .context()
            .route()
            .map(|r| (r.service_name.to_string(), r.method_name.to_string()))
            .unwrap_or_default();

        let span = info_span!(
            "rpc",
            service = %service,
            method = %method,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let start = Instant::now();
        let result = next.run(exchange).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(()) => "ok",
            Err(_) => "error",
        };
        #[allow(clippy::cast_possible_truncation)]
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        span.record("outcome", outcome);
        result
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
