//! Per-entity async locks.
//!
//! Every guard check, delivery and commit for one entity runs under that
//! entity's lock, so two concurrent passes cannot both see a guard open and
//! both send. Different entities never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::notify::EntityRef;

/// Entries no task holds are pruned once the map grows past this.
const PRUNE_AT: usize = 1024;

#[derive(Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<EntityRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `entity`.
    pub async fn acquire(&self, entity: EntityRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > PRUNE_AT {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(entity).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
