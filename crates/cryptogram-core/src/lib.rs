//! Cryptogram puzzle engine.
//!
//! A cryptogram hides a quotation behind a substitution cipher; the player
//! recovers it letter by letter. This crate owns the pure encoding model
//! (puzzle + mode -> cells), the per-attempt session state, and the game
//! state engine that drives prefill, mistakes, hints, pausing, and the
//! completion/failure transitions. Attempt persistence and statistics live
//! in the companion `cryptogram-progress` crate.

pub mod cell;
pub mod engine;
pub mod puzzle;
pub mod session;

pub use cell::{build_cells, word_groups, CryptogramCell, WordGroup};
pub use engine::{EngineConfig, GameEngine};
pub use puzzle::{Difficulty, EncodingKey, EncodingMode, Puzzle, UnknownEncodingMode};
pub use session::PuzzleSession;
