//! axum handlers and the state they share.

pub mod rpc;

pub use rpc::rpc_handler;

use std::sync::Arc;

use postwire_core::Codec;

use super::ShutdownController;
use crate::service::RpcCore;

/// Shared state passed to handlers via `State` extraction. Cloning is cheap.
pub struct AppState<C: Codec> {
    pub core: Arc<RpcCore<C>>,
    pub shutdown: Arc<ShutdownController>,
}

impl<C: Codec> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}
