// tests/common/mod.rs
#![allow(dead_code)]

use fanout_proxy::metrics::MetricsCollector;
use fanout_proxy::proxy::{Proxy, SessionOptions};
use fanout_proxy::registry::{BackendDescriptor, SharedRegistry, Toggle};
use fanout_proxy::server::FanoutListener;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub proxy: Arc<Proxy>,
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.proxy.close_all();
    }
}

/// Start a listener on an ephemeral port for `hosts`, with the given active
/// flags applied on top of the all-active startup registry.
pub async fn start(hosts: &[String], active: &[bool], options: SessionOptions) -> Harness {
    let registry =
        SharedRegistry::from_backends(hosts.iter().map(BackendDescriptor::new).collect());
    let toggles: Vec<_> = active
        .iter()
        .map(|&active| Toggle { active, default: false })
        .collect();
    registry.apply_toggle_set(&toggles).await;

    let proxy = Arc::new(Proxy::new(
        registry,
        Arc::new(MetricsCollector::unregistered().unwrap()),
        options,
    ));
    let listener = FanoutListener::bind("127.0.0.1:0".parse().unwrap(), proxy.clone())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = listener.shutdown_token();
    tokio::spawn(listener.serve());

    Harness {
        proxy,
        addr,
        shutdown,
    }
}

pub async fn backend() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

pub async fn unreachable_addr() -> String {
    let (listener, addr) = backend().await;
    drop(listener);
    addr
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting")
}

pub async fn accept(listener: &TcpListener) -> BufReader<TcpStream> {
    let (stream, _) = within(listener.accept()).await.unwrap();
    BufReader::new(stream)
}

pub async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    within(reader.read_line(&mut line)).await.unwrap();
    line
}

/// Poll `check` until it holds or the wait budget runs out.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
