// src/error.rs
use std::io;
use std::net::SocketAddr;

/// Errors produced by the fan-out core and the admin interface.
///
/// Data-path variants (`Dial`, `Read`, `Write`, `Accept`) are logged where
/// they happen and never escalate; only `Bind` is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to connect to backend {host}: {source}")]
    Dial {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("read error: {0}")]
    Read(#[source] io::Error),

    #[error("write to {destination} failed: {source}")]
    Write {
        destination: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize registry: {0}")]
    AdminSerialization(#[from] serde_json::Error),

    #[error("invalid backend address: {0}")]
    InvalidBackend(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
