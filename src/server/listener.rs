// ────────────────────────────────
// src/server/listener.rs
// Accept loop for raw client connections; one fan-out session per client.
// ────────────────────────────────
use crate::error::{ProxyError, Result};
use crate::proxy::Proxy;
use crate::session::FanoutSession;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })
}

pub struct FanoutListener {
    listener: TcpListener,
    proxy: Arc<Proxy>,
    shutdown: CancellationToken,
}

impl FanoutListener {
    /// Bind the client port. Failing here is fatal for the process.
    pub async fn bind(addr: SocketAddr, proxy: Arc<Proxy>) -> Result<Self> {
        let listener = bind_tcp(addr).await?;
        Ok(Self {
            listener,
            proxy,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ProxyError::Accept)
    }

    /// Token that stops the accept loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept until shut down. Accept errors are logged and the loop goes on.
    pub async fn serve(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("listening for clients on {}", addr),
            Err(e) => error!("listener has no local address: {}", e),
        }
        for backend in self.proxy.registry().snapshot().await {
            info!("forwarding to host {}", backend.host());
        }

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("listener shutting down");
                    return;
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted client");
                    let proxy = self.proxy.clone();
                    tokio::spawn(async move {
                        FanoutSession::new(peer, proxy).run(stream).await;
                    });
                }
                Err(e) => {
                    error!("{}", ProxyError::Accept(e));
                }
            }
        }
    }
}
