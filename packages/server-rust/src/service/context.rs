//! Per-request dispatch state and the view of it handed to methods.

use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use postwire_core::metadata::{self, Metadata};
use tracing::warn;

use super::method::ContextInjection;

/// Identity of the method a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub service_id: Arc<str>,
    pub service_name: Arc<str>,
    pub method_name: Arc<str>,
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// Mutable state of one in-flight request.
///
/// Instances are recycled through a [`ContextPool`](super::pool::ContextPool):
/// the metadata maps keep their capacity between requests. A context is
/// owned by exactly one request at a time.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Inbound header name (lower-case) -> first value.
    metadata: Arc<Metadata>,
    /// Headers the method wants on the response.
    response_metadata: Arc<Mutex<Metadata>>,
    route: Option<ResolvedRoute>,
    /// Set once a response has been written; later writes are dropped.
    responded: bool,
    compression: bool,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Reads one inbound metadata value, ignoring ASCII case.
    #[must_use]
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        metadata::get_ignore_case(&self.metadata, name)
    }

    /// Adds or replaces an inbound metadata entry.
    pub fn insert_metadata(&mut self, name: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.metadata).insert(name.into(), value.into());
    }

    /// Copies the first value of every header into inbound metadata.
    ///
    /// Values that are not valid UTF-8 are copied lossily.
    pub fn copy_headers(&mut self, headers: &HeaderMap) {
        let md = Arc::make_mut(&mut self.metadata);
        for name in headers.keys() {
            if let Some(value) = headers.get(name) {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                md.insert(name.as_str().to_owned(), value);
            }
        }
    }

    /// Sets a header to be written on the response.
    pub fn set_response_metadata(&self, name: impl Into<String>, value: impl Into<String>) {
        self.response_metadata.lock().insert(name.into(), value.into());
    }

    /// Copies outbound metadata into `headers`, replacing existing values.
    ///
    /// Entries that are not valid HTTP header names or values are skipped.
    pub fn write_response_metadata(&self, headers: &mut HeaderMap) {
        for (name, value) in self.response_metadata.lock().iter() {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid response metadata entry"),
            }
        }
    }

    #[must_use]
    pub fn route(&self) -> Option<&ResolvedRoute> {
        self.route.as_ref()
    }

    pub fn set_route(&mut self, route: ResolvedRoute) {
        self.route = Some(route);
    }

    /// Whether a response has already been written for this request.
    #[must_use]
    pub fn is_responded(&self) -> bool {
        self.responded
    }

    pub(crate) fn mark_responded(&mut self) {
        self.responded = true;
    }

    /// Whether the reply will be snappy-compressed.
    #[must_use]
    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn set_compression(&mut self, enabled: bool) {
        self.compression = enabled;
    }

    /// Derives the value handed to a method for `route`.
    ///
    /// Methods registered without context get a detached value that shares
    /// nothing with this request.
    #[must_use]
    pub fn call_context(&self, route: ResolvedRoute, injection: ContextInjection) -> CallContext {
        match injection {
            ContextInjection::Metadata => CallContext {
                route,
                metadata: Some(Arc::clone(&self.metadata)),
                response_metadata: Some(Arc::clone(&self.response_metadata)),
            },
            ContextInjection::Bare => CallContext {
                route,
                metadata: None,
                response_metadata: None,
            },
        }
    }

    /// Clears all per-request state.
    ///
    /// Maps are cleared in place so their allocations are reused. If a method
    /// kept a [`CallContext`] alive past its call, the shared maps are
    /// replaced instead so the next request never observes them.
    pub fn reset(&mut self) {
        match Arc::get_mut(&mut self.metadata) {
            Some(md) => md.clear(),
            None => self.metadata = Arc::default(),
        }
        match Arc::get_mut(&mut self.response_metadata) {
            Some(md) => md.get_mut().clear(),
            None => self.response_metadata = Arc::default(),
        }
        self.route = None;
        self.responded = false;
        self.compression = false;
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Context value passed to a method.
///
/// Exposes inbound metadata and lets the method set response metadata. It
/// never exposes transport handles.
#[derive(Debug, Clone)]
pub struct CallContext {
    route: ResolvedRoute,
    metadata: Option<Arc<Metadata>>,
    response_metadata: Option<Arc<Mutex<Metadata>>>,
}

impl CallContext {
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.route.service_id
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.route.service_name
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.route.method_name
    }

    /// Reads an inbound metadata value, ignoring ASCII case.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .as_deref()
            .and_then(|md| metadata::get_ignore_case(md, name))
    }

    /// Sets a response header. No-op on a detached context.
    pub fn set_response_metadata(&self, name: impl Into<String>, value: impl Into<String>) {
        if let Some(md) = &self.response_metadata {
            md.lock().insert(name.into(), value.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn route() -> ResolvedRoute {
        ResolvedRoute {
            service_id: Arc::from("id-1"),
            service_name: Arc::from("Arith"),
            method_name: Arc::from("Multiply"),
        }
    }

    #[test]
    fn copy_headers_keeps_non_ascii_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-name", HeaderValue::from_bytes(b"caf\xc3\xa9").unwrap());
        headers.insert("x-raw", HeaderValue::from_bytes(b"a\xffb").unwrap());

        let mut ctx = RequestContext::new();
        ctx.copy_headers(&headers);

        assert_eq!(ctx.metadata_value("x-name"), Some("caf\u{e9}"));
        assert_eq!(ctx.metadata_value("x-raw"), Some("a\u{fffd}b"));
    }

    #[test]
    fn copy_headers_takes_first_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-user", HeaderValue::from_static("alice"));
        headers.append("x-user", HeaderValue::from_static("bob"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let mut ctx = RequestContext::new();
        ctx.copy_headers(&headers);

        assert_eq!(ctx.metadata_value("x-user"), Some("alice"));
        assert_eq!(ctx.metadata_value("Content-Type"), Some("application/json"));
        assert_eq!(ctx.metadata().len(), 2);
    }

    #[test]
    fn call_context_reads_and_writes_metadata() {
        let mut ctx = RequestContext::new();
        ctx.insert_metadata("x-tenant", "acme");

        let call = ctx.call_context(route(), ContextInjection::Metadata);
        assert_eq!(call.metadata("X-Tenant"), Some("acme"));
        assert_eq!(call.service_name(), "Arith");
        assert_eq!(call.method_name(), "Multiply");

        call.set_response_metadata("x-served-by", "arith-1");
        let mut headers = HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert_eq!(headers.get("x-served-by").unwrap(), "arith-1");
    }

    #[test]
    fn bare_call_context_is_detached() {
        let mut ctx = RequestContext::new();
        ctx.insert_metadata("x-tenant", "acme");

        let call = ctx.call_context(route(), ContextInjection::Bare);
        assert_eq!(call.metadata("x-tenant"), None);
        call.set_response_metadata("x-ignored", "1");

        let mut headers = HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn invalid_response_metadata_is_skipped() {
        let ctx = RequestContext::new();
        ctx.set_response_metadata("bad header", "v");
        ctx.set_response_metadata("x-ok", "v");

        let mut headers = HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-ok"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = RequestContext::new();
        ctx.insert_metadata("x-user", "alice");
        ctx.set_response_metadata("x-out", "1");
        ctx.set_route(route());
        ctx.mark_responded();
        ctx.set_compression(true);

        ctx.reset();

        assert!(ctx.metadata().is_empty());
        assert!(ctx.route().is_none());
        assert!(!ctx.is_responded());
        assert!(!ctx.compression());
        let mut headers = HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn reset_detaches_leaked_call_context() {
        let mut ctx = RequestContext::new();
        ctx.insert_metadata("x-user", "alice");
        let leaked = ctx.call_context(route(), ContextInjection::Metadata);

        ctx.reset();
        ctx.insert_metadata("x-user", "bob");

        assert_eq!(leaked.metadata("x-user"), Some("alice"));
        assert_eq!(ctx.metadata_value("x-user"), Some("bob"));

        leaked.set_response_metadata("x-late", "1");
        let mut headers = HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert!(headers.is_empty(), "late writes must not reach the next request");
    }

    proptest! {
        #[test]
        fn copied_headers_read_back_in_any_case(name in "x-[a-z]{1,12}", value in "[ -~]{0,32}") {
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::try_from(name.as_str()).unwrap(),
                HeaderValue::try_from(value.as_str()).unwrap(),
            );
            let mut ctx = RequestContext::new();
            ctx.copy_headers(&headers);

            prop_assert_eq!(ctx.metadata_value(&name.to_ascii_uppercase()), Some(value.as_str()));
        }
    }
}
