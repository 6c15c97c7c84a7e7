//! The request/response pair passed through middleware to dispatch.

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderValue, StatusCode};

use super::pool::PooledContext;

/// One in-flight request as seen by middleware.
///
/// The body can be taken once. At most one response is recorded: after the
/// first [`respond`](Self::respond) every later call is ignored.
#[derive(Debug)]
pub struct Exchange {
    context: PooledContext,
    parts: Parts,
    body: Option<Body>,
    response: Option<Response>,
}

impl Exchange {
    #[must_use]
    pub fn new(context: PooledContext, request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            context,
            parts,
            body: Some(body),
            response: None,
        }
    }

    #[must_use]
    pub fn context(&self) -> &PooledContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PooledContext {
        &mut self.context
    }

    /// Method, URI and headers of the request.
    #[must_use]
    pub fn request(&self) -> &Parts {
        &self.parts
    }

    /// Takes the request body. `None` if it was already taken.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Records `response` unless one was already written.
    ///
    /// Returns `false` when the response was dropped.
    pub fn respond(&mut self, response: Response) -> bool {
        if self.context.is_responded() {
            return false;
        }
        self.context.mark_responded();
        self.response = Some(response);
        true
    }

    #[must_use]
    pub fn is_responded(&self) -> bool {
        self.context.is_responded()
    }

    /// Finishes the exchange. Returns `200` with an empty body if nothing
    /// responded. The pooled context is released here.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
            .unwrap_or_else(|| StatusCode::OK.into_response())
    }
}

/// A plain-text response with `status` and `message` as the body.
#[must_use]
pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response {
    let mut response = (status, message.into()).into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
