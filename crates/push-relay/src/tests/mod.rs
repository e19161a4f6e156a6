//! Scenario tests for the relay.
//!
//! - `harness.rs`        - Mock bus, mock endpoints, captured logs
//! - `admission.rs`      - I. Bounded concurrency and slot accounting
//! - `backpressure.rs`   - II. Saturated topics stop pulling
//! - `classification.rs` - III. Response classification and logging
//! - `isolation.rs`      - IV. Topics are independent
//! - `startup.rs`        - V. Startup, shutdown and feed closure

mod admission;
mod isolation;
