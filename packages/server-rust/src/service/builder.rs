//! Explicit per-service method registration.

use std::any::type_name;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use postwire_core::{Codec, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::context::CallContext;
use super::method::{ContextInjection, FnHandler, MethodDescriptor};
use super::middleware::Middleware;

/// Collects the methods of one receiver before it is handed to a
/// [`RegistryBuilder`](super::registry::RegistryBuilder).
///
/// ```ignore
/// let arith = ServiceBuilder::new(Arc::new(Arith))
///     .method("Multiply", Arith::multiply)
///     .bare_method("Divide", Arith::divide);
/// ```
pub struct ServiceBuilder<S, C: Codec> {
    pub(crate) receiver: Arc<S>,
    pub(crate) receiver_type: &'static str,
    pub(crate) name: Option<String>,
    pub(crate) expose_all: bool,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) methods: Vec<MethodDescriptor<C>>,
    seen: HashSet<String>,
}

impl<S, C> ServiceBuilder<S, C>
where
    S: Send + Sync + 'static,
    C: Codec,
{
    #[must_use]
    pub fn new(receiver: Arc<S>) -> Self {
        Self {
            receiver,
            receiver_type: type_name::<S>(),
            name: None,
            expose_all: true,
            middleware: Vec::new(),
            methods: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Routes the service under `name` instead of the receiver's type name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// When `true` (the default), registering a service with no methods fails.
    #[must_use]
    pub fn expose_all(mut self, expose_all: bool) -> Self {
        self.expose_all = expose_all;
        self
    }

    /// Appends service-level middleware. It runs after server-level middleware.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a method that receives a [`CallContext`].
    #[must_use]
    pub fn method<Req, Resp, F, Fut>(self, name: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<S>, CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        self.push::<Req, Resp, F, Fut>(name, ContextInjection::Metadata, f)
    }

    /// Registers a method that takes only its argument.
    #[must_use]
    pub fn bare_method<Req, Resp, F, Fut>(self, name: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<S>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        self.push::<Req, Resp, _, Fut>(name, ContextInjection::Bare, move |recv, _ctx, req| {
            f(recv, req)
        })
    }

    /// Number of methods accepted so far.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Name the service will be routed under.
    #[must_use]
    pub fn service_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| bare_type_name(self.receiver_type).to_string())
    }

    fn push<Req, Resp, F, Fut>(mut self, name: &str, injection: ContextInjection, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<S>, CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        if name.is_empty() || name.contains('/') {
            warn!(service = self.receiver_type, method = name, "Skipping unroutable method name");
            return self;
        }
        if !self.seen.insert(name.to_string()) {
            warn!(service = self.receiver_type, method = name, "Skipping duplicate method");
            return self;
        }

        let handler = FnHandler::<S, Req, Resp, F>::new(Arc::clone(&self.receiver), f);
        self.methods.push(MethodDescriptor::new(
            Arc::from(name),
            type_name::<Req>(),
            type_name::<Resp>(),
            injection,
            Arc::new(handler),
        ));
        self
    }
}

/// `my_crate::svc::Arith<T>` -> `Arith`.
fn bare_type_name(full: &str) -> &str {
    let without_generics = full.split_once('<').map_or(full, |(head, _)| head);
    without_generics
        .rsplit_once("::")
        .map_or(without_generics, |(_, tail)| tail)
}
