//! Scheduling primitives used by the main loop
//!
//! - Clock: injectable time source so expiry and throttling are testable
//! - TtlCache: value reuse for a fixed time-to-live
//! - RateGate: lets an action through at most once per interval
//! - DeferredTasks: run-once, key-deduplicated, optionally delayed work

pub mod cache;
pub mod clock;
pub mod deferred;

pub use cache::{RateGate, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use deferred::DeferredTasks;
