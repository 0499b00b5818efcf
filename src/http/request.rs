//! Request ID tagging.
//!
//! Every request gets an `x-request-id` (UUID v4) unless the client sent
//! one; the same id is echoed on the response.

use axum::http::HeaderMap;
use tower::Layer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestId, SetRequestId};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Sets and propagates `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayers;

impl RequestIdLayers {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayers {
    type Service = SetRequestId<PropagateRequestId<S>, MakeRequestUuid>;

    fn layer(&self, inner: S) -> Self::Service {
        SetRequestId::x_request_id(PropagateRequestId::x_request_id(inner), MakeRequestUuid)
    }
}

/// The request id carried in `headers`, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|headers: HeaderMap| async move {
                request_id(&headers).unwrap_or("none").to_string()
            }))
            .layer(RequestIdLayers::new())
    }

    #[tokio::test]
    async fn generates_id_when_missing() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = request_id(response.headers()).unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn keeps_client_supplied_id() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(request_id(response.headers()), Some("abc-123"));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"abc-123");
    }
}
