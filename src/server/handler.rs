// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::admin;
use crate::metrics::MetricsRegistry;
use crate::proxy::Proxy;

/// Tower service in front of the admin routes.
#[derive(Clone)]
pub struct AdminHandler {
    proxy: Arc<Proxy>,
    metrics: Arc<MetricsRegistry>,
}

impl AdminHandler {
    pub fn new(proxy: Arc<Proxy>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { proxy, metrics }
    }
}

impl Service<Request<Body>> for AdminHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let proxy = self.proxy.clone();
        let metrics = self.metrics.clone();
        Box::pin(async move {
            Ok(admin::handle(req, proxy, metrics).await.unwrap_or_else(|e| {
                tracing::error!(%e, "admin request failed");
                e.into()
            }))
        })
    }
}

/// Serves the Prometheus exposition on one path, 404 elsewhere.
#[derive(Clone)]
pub struct MetricsHandler {
    registry: Arc<MetricsRegistry>,
    path: Arc<str>,
}

impl MetricsHandler {
    pub fn new(registry: Arc<MetricsRegistry>, path: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            path: path.into(),
        }
    }
}

impl Service<Request<Body>> for MetricsHandler {
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
        let response = if req.uri().path() == &*self.path {
            let mut response = Response::new(Body::from(self.registry.gather()));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        } else {
            let mut response = Response::new(Body::from("Not Found"));
            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
            response
        };
        futures::future::ready(Ok(response))
    }
}
