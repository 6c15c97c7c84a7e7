//! Server assembly and the deferred startup lifecycle.
//!
//! [`ServerBuilder`] collects the codec, configuration, middleware and
//! services. `build()` freezes the registry and starts the audit worker.
//! `start()` binds the listener and registers with discovery; `serve()`
//! accepts connections until the shutdown future resolves, then deregisters,
//! drains in-flight calls and stops the audit worker.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use postwire_core::{Codec, Discovery, ErrorLogger, JsonCodec, TracingErrorLogger};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{rpc_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::audit::{AuditLog, AuditRunnable};
use crate::service::{
    BackgroundWorker, ContextPool, DiscoveryLifecycle, Middleware, RegistryBuilder, RegistryError,
    RpcCore, ServerConfig, ServiceBuilder,
};

// ---------------------------------------------------------------------------
// ServerBuilder
// ---------------------------------------------------------------------------

/// Collects everything a server needs before it is frozen.
pub struct ServerBuilder<C: Codec = JsonCodec> {
    codec: C,
    network: NetworkConfig,
    config: ServerConfig,
    middleware: Vec<Arc<dyn Middleware>>,
    registry: RegistryBuilder<C>,
    discovery: Option<Arc<dyn Discovery>>,
    error_logger: Arc<dyn ErrorLogger>,
}

impl ServerBuilder<JsonCodec> {
    /// A builder using the JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for ServerBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ServerBuilder<C> {
    #[must_use]
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            network: NetworkConfig::default(),
            config: ServerConfig::default(),
            middleware: Vec::new(),
            registry: RegistryBuilder::new(),
            discovery: None,
            error_logger: Arc::new(TracingErrorLogger),
        }
    }

    #[must_use]
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Snappy-compress every reply.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Appends server-level middleware. It runs before every service's own.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    #[must_use]
    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Replaces the default `tracing` error logger.
    #[must_use]
    pub fn error_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.error_logger = logger;
        self
    }

    /// Registers a service.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::register`].
    pub fn service<S>(self, service: ServiceBuilder<S, C>) -> Result<Self, RegistryError>
    where
        S: Send + Sync + 'static,
    {
        self.registry.register(service)?;
        Ok(self)
    }

    /// The underlying registry, for registering from several threads.
    #[must_use]
    pub fn registry(&self) -> &RegistryBuilder<C> {
        &self.registry
    }

    /// Freezes the registry and starts the audit worker.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn build(self) -> RpcServer<C> {
        let registry = self.registry.freeze(&self.middleware);
        let discovery = DiscoveryLifecycle::new(self.discovery, &registry);
        let (audit, audit_worker) = AuditLog::start(self.error_logger, self.config.audit_queue_capacity);

        info!(
            services = registry.len(),
            codec = self.codec.content_type(),
            compression = self.config.compression,
            "RPC server built"
        );

        let core = RpcCore::new(
            registry,
            self.codec,
            self.config.compression,
            self.network.max_body_bytes,
            ContextPool::new(self.config.context_pool_capacity),
            audit,
        );

        RpcServer {
            network: self.network,
            core: Arc::new(core),
            shutdown: Arc::new(ShutdownController::new()),
            discovery,
            audit_worker,
            listener: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// A built server.
///
/// 1. `start()` binds the listener and announces services to discovery
/// 2. `serve()` accepts connections until the shutdown future resolves
pub struct RpcServer<C: Codec> {
    network: NetworkConfig,
    core: Arc<RpcCore<C>>,
    shutdown: Arc<ShutdownController>,
    discovery: DiscoveryLifecycle,
    audit_worker: BackgroundWorker<AuditRunnable>,
    listener: Option<TcpListener>,
}

impl<C: Codec> RpcServer<C> {
    #[must_use]
    pub fn core(&self) -> Arc<RpcCore<C>> {
        Arc::clone(&self.core)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// The axum router: every path goes to RPC dispatch.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            core: Arc::clone(&self.core),
            shutdown: Arc::clone(&self.shutdown),
        };
        Router::new()
            .fallback(rpc_handler::<C>)
            .layer(build_http_layers())
            .with_state(state)
    }

    /// Binds the listener and registers every service with discovery.
    ///
    /// Returns the bound address, whose port differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound. Discovery failures
    /// are logged, not returned.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(self.network.listen_address()).await?;
        let addr = listener.local_addr()?;
        info!("TCP listener bound to {}:{}", self.network.host, addr.port());

        let announced = format!("{}:{}", self.network.host, addr.port());
        self.discovery.register_all(&announced).await;

        self.listener = Some(listener);
        Ok(addr)
    }

    /// Serves until `shutdown` resolves, then drains and stops.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, TLS material cannot be
    /// loaded, or the server hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();

        let trigger = tokio::spawn({
            let ctrl = Arc::clone(&self.shutdown);
            async move {
                shutdown.await;
                ctrl.trigger_shutdown();
            }
        });

        self.shutdown.set_ready();
        let result = match self.network.tls.clone() {
            Some(tls) => self.serve_tls(listener, router, &tls).await,
            None => self.serve_plain(listener, router).await,
        };
        trigger.abort();

        // No-op if the signal arm already withdrew; covers every error exit.
        self.discovery.deregister_all().await;
        // Covers a server that exited without the signal.
        self.shutdown.trigger_shutdown();
        if self.shutdown.wait_for_drain(self.network.drain_timeout).await {
            info!("All in-flight calls drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "Drain timeout expired with calls still in flight"
            );
        }
        self.audit_worker.stop().await;
        info!("RPC server stopped");
        result
    }

    /// `start()` followed by `serve()`.
    ///
    /// # Errors
    ///
    /// Any error from [`start`](Self::start) or [`serve`](Self::serve).
    pub async fn run(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.start().await?;
        self.serve(shutdown).await
    }

    async fn serve_plain(&self, listener: TcpListener, router: Router) -> anyhow::Result<()> {
        info!("Serving plain HTTP");

        let ctrl = Arc::clone(&self.shutdown);
        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move { ctrl.wait_for_shutdown().await })
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => result?,
            () = self.shutdown.wait_for_shutdown() => {
                self.discovery.deregister_all().await;
                match tokio::time::timeout(self.network.drain_timeout, &mut server).await {
                    Ok(result) => result?,
                    Err(_) => warn!("Graceful shutdown timed out, closing connections"),
                }
            }
        }
        Ok(())
    }

    async fn serve_tls(
        &self,
        listener: TcpListener,
        router: Router,
        tls: &TlsConfig,
    ) -> anyhow::Result<()> {
        use axum_server::tls_rustls::RustlsConfig;

        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

        let addr = listener.local_addr()?;
        let std_listener = listener.into_std()?;
        let handle = axum_server::Handle::new();

        info!("Serving TLS connections on {}", addr);

        let server = axum_server::from_tcp_rustls(std_listener, rustls_config)
            .handle(handle.clone())
            .serve(router.into_make_service());
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => result?,
            () = self.shutdown.wait_for_shutdown() => {
                self.discovery.deregister_all().await;
                handle.graceful_shutdown(Some(self.network.drain_timeout));
                (&mut server).await?;
            }
        }
        Ok(())
    }
}
