//! Shared, atomically swappable catalog.
//!
//! Readers take a snapshot with [`CatalogHandle::load`] and keep using it for
//! the whole request; a reload publishes a new registry without blocking
//! them.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::registry::CatalogRegistry;

#[derive(Debug)]
pub struct CatalogHandle {
    snap: ArcSwap<CatalogRegistry>,
    /// Bumped on every swap
    generation: AtomicU64,
}

impl CatalogHandle {
    pub fn new(registry: CatalogRegistry) -> Self {
        Self {
            snap: ArcSwap::from_pointee(registry),
            generation: AtomicU64::new(0),
        }
    }

    /// Current registry snapshot.
    pub fn load(&self) -> Arc<CatalogRegistry> {
        self.snap.load_full()
    }

    /// Publish a new registry, returning the one it replaced.
    pub fn swap(&self, registry: CatalogRegistry) -> Arc<CatalogRegistry> {
        let previous = self.snap.swap(Arc::new(registry));
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
