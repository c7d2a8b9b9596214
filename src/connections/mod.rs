// src/connections/mod.rs
//! Tracking of the endpoints that are currently being forwarded, so that a
//! reconfiguration can close all of them at once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct TrackedEndpoint {
    peer: String,
    close: CancellationToken,
}

/// Set of open forwarding endpoints.
///
/// Closing an endpoint cancels its token; the forwarder owning the socket
/// observes the cancellation as end-of-stream and drops it. `register`,
/// `unregister` and `close_all` are serialized by one mutex.
#[derive(Default)]
pub struct ActiveConnections {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ConnectionId, TrackedEndpoint>>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an endpoint. `close` is cancelled by [`close_all`](Self::close_all).
    pub fn register(&self, peer: impl Into<String>, close: CancellationToken) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let peer = peer.into();
        debug!(%id, %peer, "registered endpoint");
        self.entries.lock().insert(id, TrackedEndpoint { peer, close });
        id
    }

    /// Stop tracking an endpoint. Returns false if it was already gone, which
    /// happens after `close_all`.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Close every tracked endpoint and empty the set. Does not wait for the
    /// owning forwarders to finish.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (id, endpoint) in &drained {
            debug!(%id, peer = %endpoint.peer, "closing endpoint");
            endpoint.close.cancel();
        }
        info!("closed {} forwarding endpoints", drained.len());
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
