//! Request dispatch: routing, context setup, middleware, invocation and reply
//! encoding.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::extract::Request;
use axum::response::Response;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use postwire_core::compression::{self, SNAPPY_HEADER};
use postwire_core::{parse_route, Codec, CodecError, ErrorEvent, RpcError};

use super::audit::AuditLog;
use super::context::ResolvedRoute;
use super::exchange::{text_response, Exchange};
use super::method::MethodDescriptor;
use super::middleware::{Endpoint, Next};
use super::pool::ContextPool;
use super::registry::ServiceRegistry;

/// Body returned for anything but `POST`.
pub const METHOD_NOT_ALLOWED_BODY: &str = "405 must POST\n";

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Terminal step of every chain: runs one resolved method.
struct Dispatcher<'r, C: Codec> {
    codec: &'r C,
    method: &'r MethodDescriptor<C>,
    route: ResolvedRoute,
    max_body_bytes: usize,
}

#[async_trait]
impl<'r, C: Codec> Endpoint for Dispatcher<'r, C> {
    async fn call(&self, exchange: &mut Exchange) -> Result<(), RpcError> {
        let body = exchange.take_body().unwrap_or_default();
        let bytes = body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| RpcError::Decode(CodecError::Io(std::io::Error::other(e))))?;

        let call = exchange
            .context()
            .call_context(self.route.clone(), self.method.injection());
        let pending = self
            .method
            .handler()
            .call(self.codec, call, bytes)
            .map_err(RpcError::Decode)?;
        let reply = pending.await?;

        let compressed = exchange.context().compression();
        let payload = if compressed {
            let raw = reply.marshal(self.codec).map_err(RpcError::Encode)?;
            compression::compress(&raw)?
        } else {
            let mut out = Vec::new();
            reply.encode(self.codec, &mut out).map_err(RpcError::Encode)?;
            out
        };

        // Method metadata first, so it cannot replace the transport headers.
        let mut response = Response::new(Body::from(payload));
        let headers = response.headers_mut();
        exchange.context().write_response_metadata(headers);
        if compressed {
            headers.insert(SNAPPY_HEADER, HeaderValue::from_static("true"));
        }
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(self.codec.content_type()),
        );

        exchange.respond(response);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RpcCore
// ---------------------------------------------------------------------------

/// Everything needed to serve requests once the registry is frozen.
pub struct RpcCore<C: Codec> {
    registry: ServiceRegistry<C>,
    codec: C,
    compression: bool,
    max_body_bytes: usize,
    pool: ContextPool,
    audit: AuditLog,
}

impl<C: Codec> RpcCore<C> {
    #[must_use]
    pub fn new(
        registry: ServiceRegistry<C>,
        codec: C,
        compression: bool,
        max_body_bytes: usize,
        pool: ContextPool,
        audit: AuditLog,
    ) -> Self {
        Self {
            registry,
            codec,
            compression,
            max_body_bytes,
            pool,
            audit,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry<C> {
        &self.registry
    }

    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Serves one request. Never fails: every error becomes a response.
    pub async fn handle(&self, request: Request) -> Response {
        if request.method() != Method::POST {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY);
        }

        let resolved = parse_route(request.uri().path()).and_then(|r| self.registry.resolve(&r));
        let (service, method) = match resolved {
            Ok(found) => found,
            Err(err) => return text_response(StatusCode::NOT_FOUND, err.to_string()),
        };

        let route = ResolvedRoute {
            service_id: Arc::clone(service.id()),
            service_name: Arc::clone(service.name()),
            method_name: Arc::clone(method.name()),
        };

        let mut ctx = self.pool.acquire();
        ctx.copy_headers(request.headers());
        ctx.set_route(route.clone());
        ctx.set_compression(self.compression);
        let mut exchange = Exchange::new(ctx, request);

        let dispatcher = Dispatcher {
            codec: &self.codec,
            method,
            route: route.clone(),
            max_body_bytes: self.max_body_bytes,
        };
        if let Err(error) = Next::new(service.middleware(), &dispatcher)
            .run(&mut exchange)
            .await
        {
            self.fail(&mut exchange, route, error);
        }
        exchange.into_response()
    }

    /// Writes the error response if none was written, then queues the audit
    /// event.
    fn fail(&self, exchange: &mut Exchange, route: ResolvedRoute, error: RpcError) {
        let code =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !exchange.is_responded() {
            exchange.respond(text_response(code, error.to_string()));
        }
        self.audit.record(ErrorEvent {
            service_id: route.service_id,
            service_name: route.service_name,
            method_name: route.method_name,
            status: code.as_u16(),
            error,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
