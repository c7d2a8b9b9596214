// src/forwarder/mod.rs
//! One-directional relay of newline-delimited text from a source stream to a
//! fixed set of destinations.
//!
//! Delivery is best effort: a failed write to one destination is logged and
//! skipped for that line, the remaining destinations still receive it and the
//! forwarder keeps reading. Writes are issued sequentially, so a destination
//! that stops draining its socket holds up the others of the same forwarder.

use crate::connections::ActiveConnections;
use crate::error::ProxyError;
use crate::metrics::MetricsCollector;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client input duplicated to every backend.
    Fanout,
    /// Primary backend replies relayed to the client.
    Reply,
    /// Replies of a non-primary backend, read and discarded.
    Drain,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Fanout => "fanout",
            Direction::Reply => "reply",
            Direction::Drain => "drain",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A write target of a forwarder. Absent destinations keep their slot but are
/// skipped.
pub struct Destination {
    name: String,
    writer: Option<BoxedWriter>,
}

impl Destination {
    pub fn new<W>(name: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            writer: Some(Box::new(writer)),
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_absent(&self) -> bool {
        self.writer.is_none()
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("absent", &self.is_absent())
            .finish()
    }
}

/// Why a forwarder stopped.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// The source closed. A trailing line without delimiter is dropped.
    EndOfStream,
    /// The source returned an error.
    ReadFailed(ProxyError),
    /// The endpoint was closed through the active connection set.
    Closed,
}

pub struct LineForwarder<R> {
    direction: Direction,
    peer: String,
    source: BufReader<R>,
    destinations: Vec<Destination>,
    connections: Arc<ActiveConnections>,
    metrics: Arc<MetricsCollector>,
    close: CancellationToken,
}

impl<R> LineForwarder<R>
where
    R: AsyncRead + Send + Unpin,
{
    pub fn new(
        direction: Direction,
        peer: impl Into<String>,
        source: R,
        destinations: Vec<Destination>,
        connections: Arc<ActiveConnections>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            direction,
            peer: peer.into(),
            source: BufReader::new(source),
            destinations,
            connections,
            metrics,
            close: CancellationToken::new(),
        }
    }

    /// Tie the forwarder to a session token; cancelling the parent closes it.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.close = parent.child_token();
        self
    }

    /// Token that closes this forwarder's endpoint.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Register the source endpoint, relay until it ends, then deregister.
    /// Destinations are dropped (and thereby shut down) on return.
    pub async fn run(mut self) -> ForwardOutcome {
        let id = self
            .connections
            .register(self.peer.clone(), self.close.clone());
        self.metrics.forwarder_started();
        info!(direction = %self.direction, peer = %self.peer, "new forwarder");

        let outcome = self.forward().await;

        self.connections.unregister(id);
        self.metrics.forwarder_stopped();
        info!(
            direction = %self.direction,
            peer = %self.peer,
            "closed forwarder, #forwarder={}",
            self.connections.len()
        );
        outcome
    }

    async fn forward(&mut self) -> ForwardOutcome {
        let close = self.close.clone();
        let mut line = Vec::with_capacity(256);

        loop {
            line.clear();
            let read = tokio::select! {
                _ = close.cancelled() => return ForwardOutcome::Closed,
                read = self.source.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => return ForwardOutcome::EndOfStream,
                Ok(n) if line.last() != Some(&b'\n') => {
                    debug!(peer = %self.peer, "discarding {} trailing bytes without newline", n);
                    return ForwardOutcome::EndOfStream;
                }
                Ok(_) => {}
                Err(e) => {
                    let err = ProxyError::Read(e);
                    debug!(peer = %self.peer, "{}", err);
                    return ForwardOutcome::ReadFailed(err);
                }
            }

            let failed = tokio::select! {
                _ = close.cancelled() => return ForwardOutcome::Closed,
                failed = self.broadcast(&line) => failed,
            };
            self.metrics.record_line(self.direction.as_str(), failed);
        }
    }

    /// Write one line to every present destination in order. Returns the
    /// number of destinations the write failed for.
    async fn broadcast(&mut self, line: &[u8]) -> u64 {
        let mut failed = 0;
        for destination in &mut self.destinations {
            let Some(writer) = destination.writer.as_mut() else {
                continue;
            };
            if let Err(source) = writer.write_all(line).await {
                let err = ProxyError::Write {
                    destination: destination.name.clone(),
                    source,
                };
                debug!(direction = %self.direction, "{}", err);
                failed += 1;
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn forwarder(
        source: DuplexStream,
        destinations: Vec<Destination>,
        connections: Arc<ActiveConnections>,
    ) -> LineForwarder<DuplexStream> {
        let metrics = Arc::new(MetricsCollector::unregistered().unwrap());
        LineForwarder::new(
            Direction::Fanout,
            "client",
            source,
            destinations,
            connections,
            metrics,
        )
    }

    async fn read_line(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn duplicates_lines_to_every_destination() {
        let (mut client, source) = duplex(1024);
        let (a_w, a_r) = duplex(1024);
        let (b_w, b_r) = duplex(1024);
        let connections = Arc::new(ActiveConnections::new());

        let task = tokio::spawn(
            forwarder(
                source,
                vec![Destination::new("a", a_w), Destination::new("b", b_w)],
                connections.clone(),
            )
            .run(),
        );

        client.write_all(b"ping\nstatus\n").await.unwrap();
        let mut a = BufReader::new(a_r);
        let mut b = BufReader::new(b_r);
        assert_eq!(read_line(&mut a).await, "ping\n");
        assert_eq!(read_line(&mut a).await, "status\n");
        assert_eq!(read_line(&mut b).await, "ping\n");
        assert_eq!(read_line(&mut b).await, "status\n");

        drop(client);
        assert!(matches!(task.await.unwrap(), ForwardOutcome::EndOfStream));
        assert!(connections.is_empty());
    }

    #[tokio::test]
    async fn partial_final_line_is_discarded() {
        let (mut client, source) = duplex(1024);
        let (dest_w, mut dest_r) = duplex(1024);
        let connections = Arc::new(ActiveConnections::new());

        let task = tokio::spawn(
            forwarder(source, vec![Destination::new("a", dest_w)], connections).run(),
        );

        client.write_all(b"ping\npart").await.unwrap();
        drop(client);
        assert!(matches!(task.await.unwrap(), ForwardOutcome::EndOfStream));

        let mut received = String::new();
        dest_r.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "ping\n");
    }

    #[tokio::test]
    async fn failed_destination_does_not_block_others() {
        let (mut client, source) = duplex(1024);
        let (broken_w, broken_r) = duplex(1024);
        let (ok_w, ok_r) = duplex(1024);
        drop(broken_r);
        let connections = Arc::new(ActiveConnections::new());

        let task = tokio::spawn(
            forwarder(
                source,
                vec![
                    Destination::new("broken", broken_w),
                    Destination::absent("down"),
                    Destination::new("ok", ok_w),
                ],
                connections,
            )
            .run(),
        );

        let mut ok = BufReader::new(ok_r);
        client.write_all(b"first\n").await.unwrap();
        assert_eq!(read_line(&mut ok).await, "first\n");
        client.write_all(b"second\n").await.unwrap();
        assert_eq!(read_line(&mut ok).await, "second\n");

        drop(client);
        assert!(matches!(task.await.unwrap(), ForwardOutcome::EndOfStream));
    }

    #[tokio::test]
    async fn close_all_stops_forwarder() {
        let (_client, source) = duplex(1024);
        let (dest_w, mut dest_r) = duplex(1024);
        let connections = Arc::new(ActiveConnections::new());

        let task = tokio::spawn(
            forwarder(source, vec![Destination::new("a", dest_w)], connections.clone()).run(),
        );

        while connections.is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(connections.close_all(), 1);
        assert!(matches!(task.await.unwrap(), ForwardOutcome::Closed));
        assert!(connections.is_empty());

        // The destination writer was dropped with the forwarder.
        let mut rest = Vec::new();
        assert_eq!(dest_r.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn parent_token_closes_forwarder() {
        let (_client, source) = duplex(1024);
        let session = CancellationToken::new();
        let connections = Arc::new(ActiveConnections::new());

        let fwd = forwarder(source, Vec::new(), connections).with_parent(&session);
        let task = tokio::spawn(fwd.run());

        session.cancel();
        assert!(matches!(task.await.unwrap(), ForwardOutcome::Closed));
    }

    #[tokio::test]
    async fn zero_destinations_consume_input() {
        let (mut client, source) = duplex(16);
        let connections = Arc::new(ActiveConnections::new());
        let task = tokio::spawn(forwarder(source, Vec::new(), connections).run());

        // More than the duplex buffer; only completes if lines are drained.
        for _ in 0..64 {
            client.write_all(b"ignored\n").await.unwrap();
        }
        drop(client);
        assert!(matches!(task.await.unwrap(), ForwardOutcome::EndOfStream));
    }
}
