//! Postwire Server: HTTP RPC dispatch over axum with pooled contexts,
//! middleware chains, pluggable codecs and service discovery.

pub mod network;
pub mod service;

pub use network::{NetworkConfig, RpcServer, ServerBuilder, TlsConfig};
pub use service::{
    CallContext, ConcurrencyLimit, Exchange, Middleware, Next, RegistryError, ServerConfig,
    ServiceBuilder, TracingMiddleware,
};
