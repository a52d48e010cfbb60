//! Attempt logging and statistics for the cryptogram engine.
//!
//! The engine in `cryptogram-core` drives a session to a terminal transition
//! (complete or failed); this crate persists those transitions as attempt
//! records behind the [`ProgressStore`] contract and aggregates them into
//! per-puzzle and global statistics, with a short-lived cache to absorb
//! bursts of UI reads.

pub mod attempt;
pub mod store;
pub mod tracker;

pub use attempt::PuzzleAttempt;
pub use store::{FileStore, MemoryStore, NoopStore, ProgressStore, StoreError, StoreResult};
pub use tracker::{GlobalStats, ProgressTracker, TrackerConfig};
