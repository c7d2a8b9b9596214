// ────────────────────────────────
// src/proxy/proxy.rs
// Shared state of the fan-out proxy: the registry, the open endpoints and
// the reconfiguration entry point used by the admin interface.
// ────────────────────────────────

use crate::connections::ActiveConnections;
use crate::metrics::MetricsCollector;
use crate::registry::{BackendDescriptor, SharedRegistry, Toggle};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// What a session does with a client when no backend could be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoBackendPolicy {
    /// Keep the client connected without forwarding anything. The connection
    /// is released by the next reconfiguration or by shutdown.
    #[default]
    Hold,
    /// Close the client connection right away.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Read and discard the replies of non-primary backends.
    pub drain_mirrors: bool,
    pub no_backend: NoBackendPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            drain_mirrors: true,
            no_backend: NoBackendPolicy::Hold,
        }
    }
}

pub struct Proxy {
    registry: SharedRegistry,
    connections: Arc<ActiveConnections>,
    metrics: Arc<MetricsCollector>,
    options: SessionOptions,
}

impl Proxy {
    pub fn new(
        registry: SharedRegistry,
        metrics: Arc<MetricsCollector>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            connections: Arc::new(ActiveConnections::new()),
            metrics,
            options,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &Arc<ActiveConnections> {
        &self.connections
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Apply a toggle batch and force every open session to drop, so that
    /// reconnecting clients pick up the new topology. Returns the new
    /// registry state.
    pub async fn reconfigure(&self, desired: &[Toggle]) -> Vec<BackendDescriptor> {
        let backends = self.registry.apply_toggle_set(desired).await;
        let closed = self.connections.close_all();
        self.metrics.record_reconfiguration();
        info!("reconfigured backends, {} endpoints closed", closed);
        backends
    }

    /// Close all sessions without touching the registry.
    pub fn close_all(&self) -> usize {
        self.connections.close_all()
    }
}
