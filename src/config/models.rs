// src/config/models.rs
use crate::error::ProxyError;
use crate::proxy::{NoBackendPolicy, SessionOptions};
use crate::registry::{BackendDescriptor, DEFAULT_BACKEND_PORT};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Port clients connect to.
    pub listen_port: u16,
    /// Backends in registry order, `host` or `host:port`.
    pub backends: Vec<String>,
    pub default_backend_port: u16,
    pub drain_mirrors: bool,
    pub no_backend: NoBackendPolicy,
    pub admin: AdminConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 6601,
            backends: Vec::new(),
            default_backend_port: DEFAULT_BACKEND_PORT,
            drain_mirrors: true,
            no_backend: NoBackendPolicy::default(),
            admin: AdminConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.listen_port == 0 {
            return Err(ProxyError::Config("listen_port must not be 0".into()));
        }
        if self.backends.iter().all(|b| b.trim().is_empty()) {
            return Err(ProxyError::Config("at least one backend is required".into()));
        }
        self.backend_descriptors()?;

        if self.admin.enabled {
            if self.admin.port == 0 {
                return Err(ProxyError::Config("admin.port must not be 0".into()));
            }
            if self.admin.port == self.listen_port {
                return Err(ProxyError::Config(
                    "admin.port must differ from listen_port".into(),
                ));
            }
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(ProxyError::Config("metrics.path must start with '/'".into()));
        }
        Ok(())
    }

    /// Parsed registry entries; blank entries are skipped.
    pub fn backend_descriptors(&self) -> Result<Vec<BackendDescriptor>, ProxyError> {
        self.backends
            .iter()
            .filter(|b| !b.trim().is_empty())
            .map(|b| BackendDescriptor::parse(b, self.default_backend_port))
            .collect()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            drain_mirrors: self.drain_mirrors,
            no_backend: self.no_backend,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.listen_port).into()
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin
            .enabled
            .then(|| ([0, 0, 0, 0], self.admin.port).into())
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics
            .enabled
            .then(|| ([0, 0, 0, 0], self.metrics.port).into())
    }
}
