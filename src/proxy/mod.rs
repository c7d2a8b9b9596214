//
// src/proxy/mod.rs
//
#[allow(clippy::module_inception)]
mod proxy;

pub use proxy::{NoBackendPolicy, Proxy, SessionOptions};
