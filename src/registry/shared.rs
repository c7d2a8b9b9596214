// src/registry/shared.rs
use super::backend::BackendDescriptor;
use super::registry::{Registry, Toggle};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide handle to the registry.
///
/// All reads and writes go through one lock, so a snapshot never mixes
/// fields from before and after a toggle batch.
#[derive(Clone, Debug)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn from_backends(backends: Vec<BackendDescriptor>) -> Self {
        Self::new(Registry::new(backends))
    }

    /// Consistent copy of every entry, in index order.
    pub async fn snapshot(&self) -> Vec<BackendDescriptor> {
        self.inner.read().await.backends().to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn default_index(&self) -> Option<usize> {
        self.inner.read().await.default_index()
    }

    pub async fn recompute_default(&self) {
        self.inner.write().await.recompute_default();
    }

    pub async fn set_default(&self, idx: usize) {
        self.inner.write().await.set_default(idx);
    }

    /// Apply a toggle batch and return the resulting state.
    pub async fn apply_toggle_set(&self, desired: &[Toggle]) -> Vec<BackendDescriptor> {
        let mut registry = self.inner.write().await;
        registry.apply_toggle_set(desired);
        registry.backends().to_vec()
    }
}
