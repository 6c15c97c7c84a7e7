//! Pre-dispatch middleware.
//!
//! Each service has an ordered list: server-level middleware first, then the
//! service's own. The list ends at an [`Endpoint`] (the dispatcher).
//!
//! - [`chain`]: `Middleware`, `Endpoint` and the `Next` continuation
//! - [`trace`]: span per call with duration and outcome
//! - [`concurrency`]: semaphore-based load shedding

pub mod chain;
pub mod concurrency;
pub mod trace;

pub use chain::{Endpoint, Middleware, Next};
pub use concurrency::ConcurrencyLimit;
pub use trace::TracingMiddleware;
