//! Service registration and request dispatch.
//!
//! 1. **Registration** (`builder`, `registry`): explicit per-method builders,
//!    frozen into an immutable registry before serving
//! 2. **Context** (`context`, `pool`): pooled per-request state
//! 3. **Middleware** (`middleware`, `exchange`): ordered pre-dispatch steps
//! 4. **Dispatch** (`dispatch`, `method`): decode, invoke, encode
//! 5. **Background work** (`audit`, `worker`, `discovery`): error logging and
//!    discovery registration off the request path

pub mod audit;
pub mod builder;
pub mod config;
pub mod context;
pub mod discovery;
pub mod dispatch;
pub mod exchange;
pub mod method;
pub mod middleware;
pub mod pool;
pub mod registry;
pub mod worker;

pub use audit::AuditLog;
pub use builder::ServiceBuilder;
pub use config::ServerConfig;
pub use context::{CallContext, RequestContext, ResolvedRoute};
pub use discovery::DiscoveryLifecycle;
pub use dispatch::RpcCore;
pub use exchange::{text_response, Exchange};
pub use method::{ContextInjection, MethodDescriptor, MethodHandler, Reply};
pub use middleware::{ConcurrencyLimit, Endpoint, Middleware, Next, TracingMiddleware};
pub use pool::{ContextPool, PooledContext};
pub use registry::{RegistryBuilder, RegistryError, ServiceDescriptor, ServiceRegistry};
pub use worker::{BackgroundRunnable, BackgroundWorker, WorkerHandle};
