//
// src/registry/mod.rs
//
mod backend;
#[allow(clippy::module_inception)]
mod registry;
mod shared;

pub use backend::{BackendDescriptor, DEFAULT_BACKEND_PORT};
pub use registry::{Registry, Toggle};
pub use shared::SharedRegistry;
