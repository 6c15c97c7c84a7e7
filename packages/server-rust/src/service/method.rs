//! Method descriptors and the type-erased handlers behind them.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures_util::future::BoxFuture;
use postwire_core::{Codec, CodecError, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::context::CallContext;

/// How a method receives request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextInjection {
    /// The method gets a [`CallContext`] with inbound and outbound metadata.
    Metadata,
    /// The method takes only its argument.
    Bare,
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// A typed reply record that can be written with codec `C`.
pub trait Reply<C>: Send {
    /// Serializes into a fresh buffer (compressed replies).
    ///
    /// # Errors
    ///
    /// Returns the codec's serialization error.
    fn marshal(&self, codec: &C) -> Result<Vec<u8>, CodecError>;

    /// Streams into `out` (uncompressed replies).
    ///
    /// # Errors
    ///
    /// Returns the codec's serialization error.
    fn encode(&self, codec: &C, out: &mut Vec<u8>) -> Result<(), CodecError>;
}

impl<C, T> Reply<C> for T
where
    C: Codec,
    T: Serialize + Send,
{
    fn marshal(&self, codec: &C) -> Result<Vec<u8>, CodecError> {
        codec.marshal(self)
    }

    fn encode(&self, codec: &C, out: &mut Vec<u8>) -> Result<(), CodecError> {
        codec.encode(out, self)
    }
}

/// The running invocation of a method.
pub type PendingReply<C> = BoxFuture<'static, Result<Box<dyn Reply<C>>, RpcError>>;

// ---------------------------------------------------------------------------
// MethodHandler
// ---------------------------------------------------------------------------

/// Type-erased invocation target of one method.
pub trait MethodHandler<C: Codec>: Send + Sync + 'static {
    /// Decodes `body` into the argument record and starts the call.
    ///
    /// # Errors
    ///
    /// Returns the codec error when `body` is not a valid argument. The
    /// method is not invoked in that case.
    fn call(&self, codec: &C, ctx: CallContext, body: Bytes) -> Result<PendingReply<C>, CodecError>;
}

/// Adapts an async function `(receiver, ctx, request) -> Result<reply>`.
pub(crate) struct FnHandler<S, Req, Resp, F> {
    receiver: Arc<S>,
    f: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<S, Req, Resp, F> FnHandler<S, Req, Resp, F> {
    pub(crate) fn new(receiver: Arc<S>, f: F) -> Self {
        Self {
            receiver,
            f,
            _types: PhantomData,
        }
    }
}

impl<C, S, Req, Resp, F, Fut> MethodHandler<C> for FnHandler<S, Req, Resp, F>
where
    C: Codec,
    S: Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Arc<S>, CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
{
    fn call(&self, codec: &C, ctx: CallContext, body: Bytes) -> Result<PendingReply<C>, CodecError> {
        let request: Req = codec.decode(body.reader())?;
        let call = (self.f)(Arc::clone(&self.receiver), ctx, request);
        Ok(Box::pin(async move {
            let reply = call.await?;
            Ok(Box::new(reply) as Box<dyn Reply<C>>)
        }))
    }
}

// ---------------------------------------------------------------------------
// MethodDescriptor
// ---------------------------------------------------------------------------

/// Metadata and invocation target of one registered method.
pub struct MethodDescriptor<C: Codec> {
    name: Arc<str>,
    request_type: &'static str,
    reply_type: &'static str,
    injection: ContextInjection,
    handler: Arc<dyn MethodHandler<C>>,
}

impl<C: Codec> MethodDescriptor<C> {
    pub(crate) fn new(
        name: Arc<str>,
        request_type: &'static str,
        reply_type: &'static str,
        injection: ContextInjection,
        handler: Arc<dyn MethodHandler<C>>,
    ) -> Self {
        Self {
            name,
            request_type,
            reply_type,
            injection,
            handler,
        }
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Type name of the argument record.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Type name of the reply record.
    #[must_use]
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    #[must_use]
    pub fn injection(&self) -> ContextInjection {
        self.injection
    }

    #[must_use]
    pub fn handler(&self) -> &dyn MethodHandler<C> {
        self.handler.as_ref()
    }
}

impl<C: Codec> fmt::Debug for MethodDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("request_type", &self.request_type)
            .field("reply_type", &self.reply_type)
            .field("injection", &self.injection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use postwire_core::JsonCodec;
    use serde::Deserialize;

    use super::*;
    use crate::service::context::{RequestContext, ResolvedRoute};

    #[derive(Debug, Deserialize)]
    struct Args {
        a: i64,
        b: i64,
    }

    struct Arith;

    async fn multiply(_: Arc<Arith>, _: CallContext, args: Args) -> Result<i64, RpcError> {
        Ok(args.a * args.b)
    }

    fn call_ctx() -> CallContext {
        let route = ResolvedRoute {
            service_id: Arc::from("id"),
            service_name: Arc::from("Arith"),
            method_name: Arc::from("Multiply"),
        };
        RequestContext::new().call_context(route, ContextInjection::Metadata)
    }

    #[tokio::test]
    async fn handler_decodes_invokes_and_encodes() {
        let handler = FnHandler::new(Arc::new(Arith), multiply);
        let pending = MethodHandler::<JsonCodec>::call(
            &handler,
            &JsonCodec,
            call_ctx(),
            Bytes::from_static(br#"{"a":6,"b":7}"#),
        )
        .unwrap();

        let reply = pending.await.unwrap();
        let mut out = Vec::new();
        reply.encode(&JsonCodec, &mut out).unwrap();
        assert_eq!(out, b"42");
    }

    #[test]
    fn malformed_body_is_a_codec_error() {
        let handler = FnHandler::new(Arc::new(Arith), multiply);
        let result = MethodHandler::<JsonCodec>::call(
            &handler,
            &JsonCodec,
            call_ctx(),
            Bytes::from_static(b"{\"a\":"),
        );
        assert!(matches!(result, Err(CodecError::Json(_))));
    }
}
