//! In-process per-resource single-writer locks.
//!
//! Backs the write sessions of [`crate::memory::MemoryStore`]: at most one
//! session per resource is open at a time, different resources proceed in
//! parallel. Stores shared between processes lock in the store itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::ResourceRef;

type Slot = Arc<AsyncMutex<()>>;

/// Held while a resource is being written. Released on drop.
#[derive(Debug)]
pub struct ResourceGuard {
    resource: ResourceRef,
    _guard: OwnedMutexGuard<()>,
}

impl ResourceGuard {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    slots: Arc<Mutex<HashMap<ResourceRef, Slot>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `resource`.
    pub async fn lock(&self, resource: &ResourceRef) -> ResourceGuard {
        let slot = self.slot(resource);
        ResourceGuard {
            resource: resource.clone(),
            _guard: slot.lock_owned().await,
        }
    }

    /// Exclusive access to `resource`, or `None` when it is held elsewhere.
    pub fn try_lock(&self, resource: &ResourceRef) -> Option<ResourceGuard> {
        let slot = self.slot(resource);
        let guard = slot.try_lock_owned().ok()?;
        Some(ResourceGuard {
            resource: resource.clone(),
            _guard: guard,
        })
    }

    /// Number of resources with a live lock slot.
    pub fn tracked(&self) -> usize {
        self.table().len()
    }

    fn slot(&self, resource: &ResourceRef) -> Slot {
        let mut slots = self.table();
        // A slot referenced only by the table has no holder and no waiter.
        slots.retain(|key, slot| key == resource || Arc::strong_count(slot) > 1);
        slots.entry(resource.clone()).or_default().clone()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceRef, Slot>> {
        // No panic can leave the map half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
