//! HTTP transport: configuration, handlers, layers, lifecycle and shutdown.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use module::{RpcServer, ServerBuilder};
pub use shutdown::*;
