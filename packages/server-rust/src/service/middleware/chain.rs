//! Middleware chain: each step either continues with [`Next::run`] or
//! short-circuits by returning without it.

use std::sync::Arc;

use async_trait::async_trait;
use postwire_core::RpcError;

use crate::service::exchange::Exchange;

/// One pre-dispatch step.
///
/// To short-circuit, write a response with [`Exchange::respond`] (or return
/// an error) and do not call `next.run`.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), RpcError>;

    /// Label used in logs.
    fn name(&self) -> &'static str {
        "middleware"
    }
}

/// Terminal step of a chain.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, exchange: &mut Exchange) -> Result<(), RpcError>;
}

/// The remainder of a chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    #[must_use]
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the next middleware, or the endpoint if none is left.
    ///
    /// # Errors
    ///
    /// Whatever the remaining steps return.
    pub async fn run(self, exchange: &mut Exchange) -> Result<(), RpcError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.handle(exchange, Next::new(rest, self.endpoint)).await
            }
            None => self.endpoint.call(exchange).await,
        }
    }
}
