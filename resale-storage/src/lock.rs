//! Host mutual-exclusion primitive.
//!
//! The host offers one global lock with a bounded wait. Acquisition either
//! succeeds within the bound or fails fast with a busy error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use resale_core::{
    new_entity_id, ConcurrencyError, EntityId, Held, Lease, LeaseData, ResaleResult, StorageError,
};
use tokio::sync::Semaphore;

/// Lock handle supplied by the host.
#[async_trait]
pub trait HostLock: Send + Sync {
    /// Acquire `name`, waiting at most `wait`.
    ///
    /// Fails with `ConcurrencyError::LockTimeout` when the bound elapses.
    async fn try_acquire(&self, name: &str, wait: Duration) -> ResaleResult<Lease<Held>>;

    /// Release a held lease.
    async fn release(&self, lease: Lease<Held>) -> ResaleResult<LeaseData>;
}

/// In-process lock backed by one semaphore per lock name.
#[derive(Debug, Default)]
pub struct InMemoryHostLock {
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Debug, Clone)]
struct Slot {
    permits: Arc<Semaphore>,
    holder: Arc<Mutex<Option<EntityId>>>,
}

impl InMemoryHostLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> ResaleResult<Slot> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(slots
            .entry(name.to_string())
            .or_insert_with(|| Slot {
                permits: Arc::new(Semaphore::new(1)),
                holder: Arc::new(Mutex::new(None)),
            })
            .clone())
    }

    /// Current holder of `name`, if any.
    pub fn holder(&self, name: &str) -> ResaleResult<Option<EntityId>> {
        let slot = self.slot(name)?;
        let holder = slot.holder.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(*holder)
    }
}

#[async_trait]
impl HostLock for InMemoryHostLock {
    async fn try_acquire(&self, name: &str, wait: Duration) -> ResaleResult<Lease<Held>> {
        let slot = self.slot(name)?;
        let started = Instant::now();

        let permit = match tokio::time::timeout(wait, slot.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                return Err(ConcurrencyError::LockTimeout {
                    lock: name.to_string(),
                    waited: started.elapsed(),
                }
                .into());
            }
        };
        // Ownership moves to the lease; release() hands the permit back.
        permit.forget();

        let lease_id = new_entity_id();
        *slot.holder.lock().map_err(|_| StorageError::LockPoisoned)? = Some(lease_id);

        Ok(Lease::new(LeaseData {
            lease_id,
            lock_name: name.to_string(),
            acquired_at: Utc::now(),
            waited: started.elapsed(),
        }))
    }

    async fn release(&self, lease: Lease<Held>) -> ResaleResult<LeaseData> {
        let slot = self.slot(lease.lock_name())?;
        {
            let mut holder = slot.holder.lock().map_err(|_| StorageError::LockPoisoned)?;
            if *holder != Some(lease.lease_id()) {
                return Err(ConcurrencyError::LeaseMismatch {
                    lock: lease.lock_name().to_string(),
                    lease_id: lease.lease_id(),
                }
                .into());
            }
            *holder = None;
        }
        slot.permits.add_permits(1);
        Ok(lease.release())
    }
}
