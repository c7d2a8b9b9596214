// src/registry/backend.rs
use serde::Serialize;

use crate::error::{ProxyError, Result};

/// Port used for backend entries given without one.
pub const DEFAULT_BACKEND_PORT: u16 = 6600;

/// One configured backend server.
///
/// `host` is fixed at construction; the two flags are only flipped by the
/// owning [`Registry`](super::Registry), which keeps `default ⇒ active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    host: String,
    active: bool,
    default: bool,
}

impl BackendDescriptor {
    /// A new active, non-default backend for an already normalized `host:port`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            active: true,
            default: false,
        }
    }

    /// Parse a `host` or `host:port` entry, filling in `default_port` and
    /// trimming whitespace around both parts.
    pub fn parse(entry: &str, default_port: u16) -> Result<Self> {
        let entry = entry.trim();
        let (host, port) = match entry.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.trim();
                let port: u16 = port
                    .parse()
                    .map_err(|_| ProxyError::InvalidBackend(format!("bad port in '{}'", entry)))?;
                (host.trim(), port)
            }
            None => (entry, default_port),
        };

        if host.is_empty() {
            return Err(ProxyError::InvalidBackend(format!(
                "missing host in '{}'",
                entry
            )));
        }

        Ok(Self::new(format!("{}:{}", host, port)))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.default = false;
        }
    }

    pub(crate) fn set_default_flag(&mut self, default: bool) {
        self.default = default && self.active;
    }
}
