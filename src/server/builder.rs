// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::error::{ProxyError, Result};
use crate::server::listener::bind_tcp;
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::Service;

/// Small HTTP/1 server wrapper used for the admin and metrics endpoints.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: H,
    shutdown: CancellationToken,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr, handler: H) -> Self {
        Self {
            addr,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop accepting when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Bind the socket. Split from `serve` so bind errors surface at startup.
    pub async fn bind(self) -> Result<BoundServer<H>> {
        let listener = bind_tcp(self.addr).await?;
        Ok(BoundServer {
            listener,
            handler: self.handler,
            shutdown: self.shutdown,
        })
    }
}

pub struct BoundServer<H> {
    listener: TcpListener,
    handler: H,
    shutdown: CancellationToken,
}

impl<H> BoundServer<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ProxyError::Accept)
    }

    /// Accept HTTP connections, one task per connection.
    pub async fn serve(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("HTTP server listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("{}", ProxyError::Accept(e));
                    continue;
                }
            };
            let svc = self.handler.clone();

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}
