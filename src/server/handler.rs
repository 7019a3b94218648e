// src/server/handler.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::metrics::MetricsRegistry;
use crate::proxy::{BackendMetrics, BackendRegistry};

/// Serves prometheus metrics and a JSON view of the backend registry.
#[derive(Clone)]
pub struct AdminHandler {
    registry: Arc<BackendRegistry>,
    metrics: Arc<MetricsRegistry>,
    metrics_path: Arc<str>,
    strategy: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub strategy: &'static str,
    pub alive: usize,
    pub total: usize,
    pub backends: Vec<BackendMetrics>,
}

impl AdminHandler {
    pub fn new(
        registry: Arc<BackendRegistry>,
        metrics: Arc<MetricsRegistry>,
        metrics_path: &str,
        strategy: &'static str,
    ) -> Self {
        Self {
            registry,
            metrics,
            metrics_path: Arc::from(metrics_path),
            strategy,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            strategy: self.strategy,
            alive: self.registry.alive_count(),
            total: self.registry.len(),
            backends: self.registry.snapshot(),
        }
    }

    fn respond(&self, req: &Request<Body>) -> Response<Body> {
        if req.method() != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        let path = req.uri().path();
        if path == &*self.metrics_path {
            let mut response = Response::new(Body::from(self.metrics.gather()));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        } else if path == "/status" {
            match serde_json::to_vec(&self.status()) {
                Ok(body) => {
                    let mut response = Response::new(Body::from(body));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    response
                }
                Err(e) => {
                    tracing::error!(%e, "failed to encode status");
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        } else {
            text(StatusCode::NOT_FOUND, "Not Found")
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

impl Service<Request<Body>> for AdminHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        futures::future::ready(Ok(self.respond(&req)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Backend;
    use std::time::Duration;
    use url::Url;

    fn handler() -> AdminHandler {
        let url = Url::parse("http://127.0.0.1:5000/health").unwrap();
        let registry = Arc::new(BackendRegistry::new(vec![Backend::new(
            0,
            "127.0.0.1:5000",
            3,
            url,
            Duration::from_secs(1),
        )]));
        let backend = registry.get_backend(0).unwrap();
        registry.set_alive(&backend, true);

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        metrics.collector().update_backend_counts(1, 1);
        AdminHandler::new(registry, metrics, "/metrics", "round_robin")
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let mut h = handler();
        let response = h.call(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("lb_healthy_backends 1"));
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let mut h = handler();
        let response = h.call(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["strategy"], "round_robin");
        assert_eq!(json["alive"], 1);
        assert_eq!(json["backends"][0]["address"], "127.0.0.1:5000");
        assert_eq!(json["backends"][0]["weight"], 3);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let mut h = handler();
        let response = h.call(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
