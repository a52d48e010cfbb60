use cryptogram_core::{Difficulty, EncodingMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One persisted record of a finished solving session.
///
/// Append-only: built once at a terminal transition and never mutated.
/// Exactly one of `completed_at` / `failed_at` is set; the constructors are
/// the only way the pairing is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleAttempt {
    pub attempt_id: u64,
    pub puzzle_id: u64,
    pub encoding_mode: EncodingMode,
    /// Unix timestamp of completion, or `None` for a failed attempt.
    pub completed_at: Option<u64>,
    /// Unix timestamp of failure, or `None` for a completed attempt.
    pub failed_at: Option<u64>,
    /// Solve duration; only present on completed attempts.
    pub completion_time: Option<Duration>,
    pub difficulty: Difficulty,
    pub hint_count: u32,
    pub mistake_count: u32,
}

impl PuzzleAttempt {
    #[allow(clippy::too_many_arguments)]
    pub fn completed(
        attempt_id: u64,
        puzzle_id: u64,
        encoding_mode: EncodingMode,
        difficulty: Difficulty,
        completed_at: u64,
        completion_time: Duration,
        hint_count: u32,
        mistake_count: u32,
    ) -> Self {
        Self {
            attempt_id,
            puzzle_id,
            encoding_mode,
            completed_at: Some(completed_at),
            failed_at: None,
            completion_time: Some(completion_time),
            difficulty,
            hint_count,
            mistake_count,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        attempt_id: u64,
        puzzle_id: u64,
        encoding_mode: EncodingMode,
        difficulty: Difficulty,
        failed_at: u64,
        hint_count: u32,
        mistake_count: u32,
    ) -> Self {
        Self {
            attempt_id,
            puzzle_id,
            encoding_mode,
            completed_at: None,
            failed_at: Some(failed_at),
            completion_time: None,
            difficulty,
            hint_count,
            mistake_count,
        }
    }

    pub fn is_completion(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_failure(&self) -> bool {
        self.failed_at.is_some()
    }

    /// When the attempt finished, regardless of outcome.
    pub fn finished_at(&self) -> u64 {
        self.completed_at.or(self.failed_at).unwrap_or(0)
    }
}
