//! The bridge core: orchestration, routing and reconnection policy.
//!
//! ## Module Structure
//!
//! - `orchestrator`: the `Bridge` struct and its dispatch loop
//! - `router`: relay planning, attribution and self-echo suppression
//! - `retry`: fixed-delay unbounded reconnection policy

pub mod orchestrator;
pub mod retry;
pub mod router;

pub use orchestrator::Bridge;
pub use retry::{LinkFailure, RetryDelays, RetryPolicy};
pub use router::{Relay, Router};
