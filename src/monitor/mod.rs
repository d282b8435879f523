//! Process monitoring and the governor loop
//!
//! - process_tracker: per-pass process snapshots with change detection
//! - polling: the loop that reloads rules and applies them

pub mod polling;
pub mod process_tracker;

pub use polling::{Governor, LoopState, TickReport};
pub use process_tracker::ProcessTracker;
