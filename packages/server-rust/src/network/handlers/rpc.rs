//! Catch-all RPC handler: every path is `/{service}/{method}`.

use axum::extract::{Request, State};
use axum::response::Response;
use http::StatusCode;
use postwire_core::Codec;

use super::AppState;
use crate::service::text_response;

/// Dispatches one call, refusing new calls once shutdown has begun.
pub async fn rpc_handler<C: Codec>(State(state): State<AppState<C>>, request: Request) -> Response {
    if state.shutdown.is_draining() {
        return text_response(StatusCode::SERVICE_UNAVAILABLE, "server shutting down");
    }
    let _in_flight = state.shutdown.in_flight_guard();
    state.core.handle(request).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{self, Body};
    use axum::Router;
    use http::Method;
    use postwire_core::{JsonCodec, RpcError};
    use tower::ServiceExt;

    use crate::network::middleware::REQUEST_ID_HEADER;
    use crate::network::module::{RpcServer, ServerBuilder};
    use crate::service::{CallContext, ServiceBuilder};

    use super::*;

    struct Greeter;

    async fn hello(_: Arc<Greeter>, ctx: CallContext, name: String) -> Result<String, RpcError> {
        ctx.set_response_metadata("x-greeter", "v1");
        Ok(format!("hello {name}"))
    }

    fn server() -> RpcServer<JsonCodec> {
        ServerBuilder::new()
            .service(ServiceBuilder::new(Arc::new(Greeter)).method("Hello", hello))
            .unwrap()
            .build()
    }

    fn post(path: &str, body: &'static str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::from(body))
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn router(server: &RpcServer<JsonCodec>) -> Router {
        server.build_router()
    }

    #[tokio::test]
    async fn routes_any_path_to_dispatch() {
        let server = server();
        let response = router(&server)
            .oneshot(post("/Greeter/Hello", r#""ada""#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-greeter"], "v1");
        assert_eq!(text(response).await, r#""hello ada""#);
    }

    #[tokio::test]
    async fn request_id_is_assigned_and_propagated() {
        let server = server();
        let response = router(&server)
            .oneshot(post("/Greeter/Hello", r#""ada""#))
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let mut request = post("/Greeter/Hello", r#""ada""#);
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, "req-42".parse().unwrap());
        let response = router(&server).oneshot(request).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn get_is_405_through_router() {
        let server = server();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/Greeter/Hello")
            .body(Body::empty())
            .unwrap();
        let response = router(&server).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(text(response).await, "405 must POST\n");
    }

    #[tokio::test]
    async fn unknown_method_is_404_through_router() {
        let server = server();
        let response = router(&server)
            .oneshot(post("/Greeter/Bye", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "rpc: can't find method Bye");
    }

    #[tokio::test]
    async fn draining_server_refuses_new_calls() {
        let server = server();
        let router = router(&server);
        server.shutdown_controller().trigger_shutdown();

        let response = router
            .oneshot(post("/Greeter/Hello", r#""ada""#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(server.shutdown_controller().in_flight_count(), 0);
    }
}
