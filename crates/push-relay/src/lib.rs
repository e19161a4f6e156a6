//! push-relay: Redis pub/sub to HTTP, with a concurrency cap per topic.
//!
//! A publisher fires messages at Redis channels as fast as it likes; the
//! endpoint behind each channel can only take so many requests at once.
//! push-relay sits in between and turns every message into one form-encoded
//! `POST`, never running more than a channel's `concurrency` of them at a
//! time.
//!
//! # Architecture
//!
//! ```text
//! Redis channel -> TopicConsumer -> AdmissionGate -> DeliveryTask -> endpoint
//!                   (pull loop)     (slot per task)   (POST + classify)
//! ```
//!
//! # Invariants
//!
//! 1. **Bounded**: a topic never has more deliveries in flight than its
//!    gate's capacity
//! 2. **No leaked slots**: every delivery releases its slot exactly once,
//!    whatever its outcome
//! 3. **Backpressure**: a saturated topic stops pulling instead of dropping
//!    or over-admitting
//! 4. **Isolation**: one topic's failures never stall or stop another
//!
//! Delivery is at-most-once and unordered; failed deliveries are logged and
//! dropped.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod http;
pub mod redis_bus;
pub mod service;

#[cfg(test)]
mod tests;

pub use bus::{Message, MessageBus, MessageStream};
pub use config::RelayConfig;
pub use consumer::{TopicBinding, TopicConsumer};
pub use delivery::{DeliveryError, DeliveryTask, ResponseEnvelope};
pub use error::{RelayError, RelayResult};
pub use gate::{AdmissionGate, Slot};
pub use redis_bus::RedisBus;
pub use service::{RelayService, RunSummary};
