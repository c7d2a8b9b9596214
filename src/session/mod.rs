// src/session/mod.rs
//! Per-client fan-out session: dial every active backend, pick the primary,
//! then run the forwarders until they all terminate.

use crate::error::ProxyError;
use crate::forwarder::{Destination, Direction, ForwardOutcome, LineForwarder};
use crate::proxy::{NoBackendPolicy, Proxy};
use crate::registry::BackendDescriptor;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    Forwarding,
    Closed,
}

/// Result of dialing a registry snapshot. One slot per registry index.
pub struct Dialed {
    pub slots: Vec<Option<TcpStream>>,
    pub primary: Option<usize>,
}

impl Dialed {
    pub fn connected(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub id: Uuid,
    pub state: SessionState,
    pub primary: Option<usize>,
    pub connected: usize,
    pub outcomes: Vec<(Direction, ForwardOutcome)>,
}

/// Connect to every active entry in index order. Inactive and unreachable
/// entries leave their slot empty; the first successful connection is the
/// primary.
pub async fn dial_backends(snapshot: &[BackendDescriptor], proxy: &Proxy) -> Dialed {
    let mut slots = Vec::with_capacity(snapshot.len());
    let mut primary = None;

    for (idx, backend) in snapshot.iter().enumerate() {
        if !backend.is_active() {
            slots.push(None);
            continue;
        }

        match TcpStream::connect(backend.host()).await {
            Ok(stream) => {
                info!("connected to host {}", backend.host());
                if primary.is_none() {
                    primary = Some(idx);
                }
                slots.push(Some(stream));
            }
            Err(source) => {
                let err = ProxyError::Dial {
                    host: backend.host().to_string(),
                    source,
                };
                warn!("{}", err);
                proxy.metrics().record_dial_failure(backend.host());
                slots.push(None);
            }
        }
    }

    Dialed { slots, primary }
}

pub struct FanoutSession {
    id: Uuid,
    peer: SocketAddr,
    proxy: Arc<Proxy>,
    state: SessionState,
    close: CancellationToken,
}

impl FanoutSession {
    pub fn new(peer: SocketAddr, proxy: Arc<Proxy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            proxy,
            state: SessionState::Dialing,
            close: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that tears down every forwarder of this session.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Drive the session for `client` to completion.
    pub async fn run(self, client: TcpStream) -> SessionReport {
        let span = info_span!("session", id = %self.id, peer = %self.peer);
        self.drive(client).instrument(span).await
    }

    async fn drive(mut self, client: TcpStream) -> SessionReport {
        // Registered before the snapshot so a reconfiguration that lands while
        // dialing still reaches this session.
        let connections = self.proxy.connections().clone();
        let endpoint = connections.register(self.peer.to_string(), self.close.clone());

        let snapshot = self.proxy.registry().snapshot().await;
        let dialed = dial_backends(&snapshot, &self.proxy).await;
        let connected = dialed.connected();
        self.proxy.metrics().record_session(dialed.primary.is_some());

        let Some(primary) = dialed.primary else {
            self.hold_without_backend(client).await;
            connections.unregister(endpoint);
            return self.report(None, connected, Vec::new());
        };

        if self.close.is_cancelled() {
            info!("registry changed while dialing, dropping session");
            drop(dialed);
            drop(client);
            connections.unregister(endpoint);
            return self.report(Some(primary), connected, Vec::new());
        }

        self.transition(SessionState::Forwarding);
        let handles = self.spawn_forwarders(client, &snapshot, dialed.slots, primary);

        let (directions, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;
        connections.unregister(endpoint);

        let mut outcomes = Vec::with_capacity(results.len());
        for (direction, result) in directions.into_iter().zip(results) {
            match result {
                Ok(outcome) => {
                    debug!(%direction, ?outcome, "forwarder finished");
                    outcomes.push((direction, outcome));
                }
                Err(e) => warn!(%direction, "forwarder task failed: {}", e),
            }
        }

        self.report(Some(primary), connected, outcomes)
    }

    fn spawn_forwarders(
        &self,
        client: TcpStream,
        snapshot: &[BackendDescriptor],
        slots: Vec<Option<TcpStream>>,
        primary: usize,
    ) -> Vec<(Direction, JoinHandle<ForwardOutcome>)> {
        let peer = self.peer.to_string();
        let connections = self.proxy.connections().clone();
        let metrics = self.proxy.metrics().clone();
        let drain_mirrors = self.proxy.options().drain_mirrors;
        let (client_reader, client_writer) = client.into_split();

        let mut destinations = Vec::with_capacity(slots.len());
        let mut reply_source = None;
        let mut drains = Vec::new();

        for (idx, slot) in slots.into_iter().enumerate() {
            let host = snapshot[idx].host().to_string();
            let Some(stream) = slot else {
                destinations.push(Destination::absent(host));
                continue;
            };

            let (reader, writer) = stream.into_split();
            destinations.push(Destination::new(host.clone(), writer));
            if idx == primary {
                reply_source = Some((host, reader));
            } else if drain_mirrors {
                drains.push(
                    LineForwarder::new(
                        Direction::Drain,
                        host,
                        reader,
                        Vec::new(),
                        connections.clone(),
                        metrics.clone(),
                    )
                    .with_parent(&self.close),
                );
            }
        }

        let mut handles = Vec::with_capacity(2 + drains.len());

        let fanout = LineForwarder::new(
            Direction::Fanout,
            peer.clone(),
            client_reader,
            destinations,
            connections.clone(),
            metrics.clone(),
        )
        .with_parent(&self.close);
        handles.push((Direction::Fanout, tokio::spawn(fanout.run().in_current_span())));

        if let Some((host, reader)) = reply_source {
            let reply = LineForwarder::new(
                Direction::Reply,
                host,
                reader,
                vec![Destination::new(peer, client_writer)],
                connections,
                metrics,
            )
            .with_parent(&self.close);
            handles.push((Direction::Reply, tokio::spawn(reply.run().in_current_span())));
        }

        for drain in drains {
            handles.push((Direction::Drain, tokio::spawn(drain.run().in_current_span())));
        }

        handles
    }

    /// No backend answered. The client stays connected but is neither read
    /// nor written; whether that is desirable is left to `NoBackendPolicy`.
    async fn hold_without_backend(&self, client: TcpStream) {
        match self.proxy.options().no_backend {
            NoBackendPolicy::Close => {
                warn!("no backend reachable, closing client");
                drop(client);
            }
            NoBackendPolicy::Hold => {
                warn!("no backend reachable, holding client without forwarding");
                self.close.cancelled().await;
                drop(client);
                debug!("released idle client");
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    fn report(
        mut self,
        primary: Option<usize>,
        connected: usize,
        outcomes: Vec<(Direction, ForwardOutcome)>,
    ) -> SessionReport {
        self.transition(SessionState::Closed);
        info!(connected, "session closed");
        SessionReport {
            id: self.id,
            state: self.state,
            primary,
            connected,
            outcomes,
        }
    }
}
