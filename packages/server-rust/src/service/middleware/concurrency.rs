//! Load-shedding middleware.
//!
//! Rejects calls with `503 Service Unavailable` while `max_concurrent` calls
//! are already in flight, rather than queueing them.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use postwire_core::RpcError;
use tokio::sync::Semaphore;
use tracing::debug;

use super::chain::{Middleware, Next};
use crate::service::exchange::{text_response, Exchange};

/// Semaphore-based concurrency limit.
///
/// Share one instance between services to limit them together.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimit {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl Middleware for ConcurrencyLimit {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), RpcError> {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            debug!(path = %exchange.request().uri.path(), "Shedding call, limit reached");
            exchange.respond(text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "server overloaded, try again later",
            ));
            return Ok(());
        };

        // Held until the call completes.
        let result = next.run(exchange).await;
        drop(permit);
        result
    }

    fn name(&self) -> &'static str {
        "concurrency_limit"
    }
}
