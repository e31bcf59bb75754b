//! Lease typestate for the host mutual-exclusion primitive.
//!
//! A lease can only be released while it is held, and releasing consumes it,
//! so a structural writer cannot release twice or keep writing after release.
//!
//! ```text
//! (free) ─── try_acquire() ──→ Lease<Held> ─── release() ──→ LeaseData
//! ```

use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;

/// State-independent lease data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseData {
    pub lease_id: EntityId,
    pub lock_name: String,
    pub acquired_at: Timestamp,
    /// How long the holder waited before acquiring.
    pub waited: Duration,
}

impl LeaseData {
    /// How long the lease has been held as of `now`.
    pub fn held_for(&self, now: Timestamp) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Marker trait for lease states.
pub trait LeaseState: private::Sealed + Send + Sync {}

/// Lease is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held;
impl LeaseState for Held {}

/// Lease has been released (for documentation; such leases don't exist at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released;
impl LeaseState for Released {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Held {}
    impl Sealed for super::Released {}
}

/// A lease with compile-time state tracking.
///
/// Not `Clone`: exactly one value represents a held lock.
#[derive(Debug)]
pub struct Lease<S: LeaseState> {
    data: LeaseData,
    _state: PhantomData<S>,
}

impl<S: LeaseState> Lease<S> {
    /// Access the underlying lease data.
    pub fn data(&self) -> &LeaseData {
        &self.data
    }

    /// Get the lease ID.
    pub fn lease_id(&self) -> EntityId {
        self.data.lease_id
    }

    /// Get the lock name.
    pub fn lock_name(&self) -> &str {
        &self.data.lock_name
    }
}

impl Lease<Held> {
    /// Wrap freshly acquired lease data.
    ///
    /// Only lock implementations should call this.
    pub fn new(data: LeaseData) -> Self {
        Lease {
            data,
            _state: PhantomData,
        }
    }

    /// Release the lease and return the underlying data.
    pub fn release(self) -> LeaseData {
        self.data
    }
}
