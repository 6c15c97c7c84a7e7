use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use postwire_core::{Codec, Route, RouteError};
use tracing::info;
use uuid::Uuid;

use super::builder::ServiceBuilder;
use super::method::MethodDescriptor;
use super::middleware::Middleware;

/// Fatal registration errors. The server refuses to start on any of these.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("rpc: service {service} has no exported methods")]
    NoExportedMethods { service: String },
    #[error("rpc: service already defined: {service}")]
    DuplicateService { service: String },
}

// ---------------------------------------------------------------------------
// ServiceDescriptor
// ---------------------------------------------------------------------------

/// A registered service: receiver, methods and middleware.
pub struct ServiceDescriptor<C: Codec> {
    id: Arc<str>,
    name: Arc<str>,
    receiver: Arc<dyn Any + Send + Sync>,
    receiver_type: &'static str,
    methods: HashMap<Arc<str>, MethodDescriptor<C>>,
    /// Server-level middleware followed by the service's own, once frozen.
    middleware: Vec<Arc<dyn Middleware>>,
}

impl<C: Codec> ServiceDescriptor<C> {
    /// Unique identity used to correlate discovery registrations.
    #[must_use]
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Full type name of the receiver.
    #[must_use]
    pub fn receiver_type(&self) -> &'static str {
        self.receiver_type
    }

    /// Downcasts the receiver to its concrete type.
    #[must_use]
    pub fn receiver<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.receiver).downcast::<T>().ok()
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor<C>> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor<C>> {
        self.methods.values()
    }

    #[must_use]
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }
}

impl<C: Codec> fmt::Debug for ServiceDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("receiver_type", &self.receiver_type)
            .field("methods", &self.methods.len())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Mutable registry used during startup.
///
/// `register` may be called from several threads; calls are serialized.
/// [`freeze`](Self::freeze) consumes the builder, so nothing can be registered
/// once requests are being served.
pub struct RegistryBuilder<C: Codec> {
    services: Mutex<Vec<ServiceDescriptor<C>>>,
}

impl<C: Codec> RegistryBuilder<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: Mutex::new(Vec::new()),
        }
    }

    /// Adds a service.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NoExportedMethods`] if the builder has no methods
    ///   and `expose_all` is set.
    /// - [`RegistryError::DuplicateService`] if the name is already taken.
    pub fn register<S>(&self, builder: ServiceBuilder<S, C>) -> Result<(), RegistryError>
    where
        S: Send + Sync + 'static,
    {
        let name = builder.service_name();
        if builder.expose_all && builder.methods.is_empty() {
            return Err(RegistryError::NoExportedMethods { service: name });
        }

        let mut services = self.services.lock();
        if services.iter().any(|s| *s.name == *name) {
            return Err(RegistryError::DuplicateService { service: name });
        }

        let id: Arc<str> = Arc::from(Uuid::new_v4().to_string());
        info!(service = %name, id = %id, methods = builder.methods.len(), "Registered service");

        let receiver: Arc<dyn Any + Send + Sync> = builder.receiver;
        services.push(ServiceDescriptor {
            id,
            name: Arc::from(name),
            receiver,
            receiver_type: builder.receiver_type,
            methods: builder
                .methods
                .into_iter()
                .map(|m| (Arc::clone(m.name()), m))
                .collect(),
            middleware: builder.middleware,
        });
        Ok(())
    }

    /// Number of services registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the read-only registry used while serving.
    ///
    /// `server_middleware` is prepended to every service's own middleware.
    #[must_use]
    pub fn freeze(self, server_middleware: &[Arc<dyn Middleware>]) -> ServiceRegistry<C> {
        let mut services = self.services.into_inner();
        for service in &mut services {
            let own = std::mem::take(&mut service.middleware);
            service.middleware = server_middleware.iter().cloned().chain(own).collect();
        }
        let by_name = services
            .iter()
            .enumerate()
            .map(|(idx, s)| (Arc::clone(&s.name), idx))
            .collect();
        ServiceRegistry { services, by_name }
    }
}

impl<C: Codec> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Immutable service table. Lookups take no locks.
pub struct ServiceRegistry<C: Codec> {
    /// Registration order.
    services: Vec<ServiceDescriptor<C>>,
    by_name: HashMap<Arc<str>, usize>,
}

impl<C: Codec> ServiceRegistry<C> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor<C>> {
        self.by_name.get(name).map(|&idx| &self.services[idx])
    }

    /// Finds the service and method a parsed route names.
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownService`] or [`RouteError::UnknownMethod`].
    pub fn resolve(
        &self,
        route: &Route<'_>,
    ) -> Result<(&ServiceDescriptor<C>, &MethodDescriptor<C>), RouteError> {
        let service = self
            .get(route.service)
            .ok_or_else(|| RouteError::UnknownService(route.service.to_string()))?;
        let method = service
            .method(route.method)
            .ok_or_else(|| RouteError::UnknownMethod(route.method.to_string()))?;
        Ok((service, method))
    }

    /// Services in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor<C>> {
        self.services.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl<C: Codec> fmt::Debug for ServiceRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.services.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use postwire_core::{parse_route, JsonCodec, RpcError};

    use super::*;
    use crate::service::context::CallContext;
    use crate::service::exchange::Exchange;
    use crate::service::middleware::Next;

    struct Arith;
    struct Echo;

    async fn multiply(_: Arc<Arith>, _: CallContext, args: (i64, i64)) -> Result<i64, RpcError> {
        Ok(args.0 * args.1)
    }

    async fn echo(_: Arc<Echo>, s: String) -> Result<String, RpcError> {
        Ok(s)
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), RpcError> {
            next.run(exchange).await
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn arith() -> ServiceBuilder<Arith, JsonCodec> {
        ServiceBuilder::new(Arc::new(Arith)).method("Multiply", multiply)
    }

    #[test]
    fn register_and_resolve() {
        let builder = RegistryBuilder::new();
        builder.register(arith()).unwrap();
        let registry = builder.freeze(&[]);

        let route = parse_route("/Arith/Multiply").unwrap();
        let (service, method) = registry.resolve(&route).unwrap();
        assert_eq!(&**service.name(), "Arith");
        assert_eq!(&**method.name(), "Multiply");
        assert_eq!(service.id().len(), 36, "uuid v4 string");
        assert!(service.receiver::<Arith>().is_some());
        assert!(service.receiver::<Echo>().is_none());
    }

    #[test]
    fn resolve_reports_unknown_service_and_method() {
        let builder = RegistryBuilder::new();
        builder.register(arith()).unwrap();
        let registry = builder.freeze(&[]);

        let err = registry.resolve(&parse_route("/Nope/Multiply").unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "rpc: can't find service Nope");

        let err = registry.resolve(&parse_route("/Arith/Add").unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "rpc: can't find method Add");
    }

    #[test]
    fn zero_methods_with_expose_all_fails() {
        let builder = RegistryBuilder::<JsonCodec>::new();
        let err = builder
            .register(ServiceBuilder::<_, JsonCodec>::new(Arc::new(Arith)))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::NoExportedMethods {
                service: "Arith".to_string()
            }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn zero_methods_without_expose_all_registers() {
        let builder = RegistryBuilder::<JsonCodec>::new();
        builder
            .register(ServiceBuilder::<_, JsonCodec>::new(Arc::new(Arith)).expose_all(false))
            .unwrap();
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn duplicate_service_name_is_rejected() {
        let builder = RegistryBuilder::new();
        builder.register(arith()).unwrap();
        let err = builder
            .register(
                ServiceBuilder::new(Arc::new(Echo))
                    .name("Arith")
                    .bare_method("Echo", echo),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateService { .. }));
    }

    #[test]
    fn distinct_services_get_distinct_ids() {
        let builder = RegistryBuilder::new();
        builder.register(arith()).unwrap();
        builder
            .register(ServiceBuilder::new(Arc::new(Echo)).bare_method("Echo", echo))
            .unwrap();
        let registry = builder.freeze(&[]);

        let ids: Vec<_> = registry.iter().map(|s| Arc::clone(s.id())).collect();
        assert_ne!(ids[0], ids[1]);
        let names: Vec<_> = registry.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["Arith", "Echo"], "registration order is kept");
    }

    #[test]
    fn freeze_prepends_server_middleware() {
        let builder = RegistryBuilder::new();
        builder
            .register(arith().middleware(Arc::new(Tag("service"))))
            .unwrap();
        let server: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tag("server"))];
        let registry = builder.freeze(&server);

        let names: Vec<_> = registry
            .get("Arith")
            .unwrap()
            .middleware()
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(names, ["server", "service"]);
    }

    #[test]
    fn concurrent_registration_is_serialized() {
        let builder = Arc::new(RegistryBuilder::<JsonCodec>::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let builder = Arc::clone(&builder);
                std::thread::spawn(move || {
                    builder
                        .register(
                            ServiceBuilder::new(Arc::new(Echo))
                                .name(format!("Echo{i}"))
                                .bare_method("Echo", echo),
                        )
                        .unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(builder.len(), 8);
    }
}
