//! Per-topic admission gate.
//!
//! A counting semaphore bounding how many delivery tasks of one topic may
//! be in flight. Slots are move-only [`Slot`] values: releasing consumes the
//! slot, and dropping an unreleased slot releases it, so a slot can neither
//! leak nor be returned twice.

use crate::error::{RelayError, RelayResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity admission gate for one topic.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    topic: Arc<str>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One reserved unit of a gate's capacity.
#[derive(Debug)]
#[must_use = "dropping a slot releases it immediately"]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Return the slot to its gate.
    pub fn release(self) {}
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots.
    ///
    /// `capacity` comes straight from configuration and must be positive.
    pub fn new(topic: impl Into<Arc<str>>, capacity: i64) -> RelayResult<Self> {
        if capacity <= 0 {
            return Err(RelayError::InvalidCapacity(capacity));
        }
        let capacity = usize::try_from(capacity)
            .ok()
            .filter(|c| *c <= Semaphore::MAX_PERMITS)
            .ok_or(RelayError::InvalidCapacity(capacity))?;

        Ok(Self {
            topic: topic.into(),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait for a free slot and reserve it.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self) -> RelayResult<Slot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RelayError::GateClosed(self.topic.to_string()))?;
        Ok(Slot { _permit: permit })
    }

    /// Reserve a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<Slot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| Slot { _permit: permit })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}
