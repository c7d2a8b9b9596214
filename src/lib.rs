// src/lib.rs
pub mod admin;
pub mod config;
pub mod connections;
pub mod error;
pub mod forwarder;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{ProxyError, Result};
