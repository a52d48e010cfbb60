use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Extra-bag key marking that a terminal transition was already persisted.
const LOGGED_KEY: &str = "attempt_logged";

/// Mutable state for a single solving attempt.
///
/// Created fresh on every new/reset puzzle and never persisted directly; the
/// progress layer derives an attempt record from it at a terminal transition.
#[derive(Debug, Clone)]
pub struct PuzzleSession {
    pub selected_cell_index: Option<usize>,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub mistake_count: u32,
    pub hint_count: u32,
    pub is_complete: bool,
    pub is_failed: bool,
    pub is_paused: bool,
    /// Set by the one-shot continue-after-failure transition; blocks any
    /// further auto-fail for the rest of the session.
    pub has_continued_after_failure: bool,
    /// Total time spent paused, excluded from the completion time.
    paused_total: Duration,
    pause_began: Option<Instant>,
    /// Forward-compatible key/value bag for session flags.
    extra: HashMap<String, String>,
}

impl Default for PuzzleSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PuzzleSession {
    pub fn new() -> Self {
        Self {
            selected_cell_index: None,
            start_time: None,
            end_time: None,
            mistake_count: 0,
            hint_count: 0,
            is_complete: false,
            is_failed: false,
            is_paused: false,
            has_continued_after_failure: false,
            paused_total: Duration::ZERO,
            pause_began: None,
            extra: HashMap::new(),
        }
    }

    /// Whether the timer has started.
    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }

    /// Start the timer. First call wins; later calls are no-ops.
    pub fn start_timer(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    /// Toggle the pause flag, tracking paused intervals so they are excluded
    /// from elapsed time. Only meaningful once the timer has started.
    pub fn toggle_pause(&mut self) {
        if !self.has_started() {
            return;
        }
        if self.is_paused {
            if let Some(began) = self.pause_began.take() {
                self.paused_total += began.elapsed();
            }
        } else {
            self.pause_began = Some(Instant::now());
        }
        self.is_paused = !self.is_paused;
    }

    /// Solve duration, available once the session is complete.
    pub fn completion_time(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if self.is_complete => Some(
                end.saturating_duration_since(start)
                    .saturating_sub(self.paused_total),
            ),
            _ => None,
        }
    }

    /// Pause-aware elapsed time for display.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.start_time else {
            return Duration::ZERO;
        };
        let end = self.end_time.unwrap_or_else(Instant::now);
        let mut elapsed = end
            .saturating_duration_since(start)
            .saturating_sub(self.paused_total);
        if let Some(began) = self.pause_began {
            elapsed = elapsed.saturating_sub(began.elapsed());
        }
        elapsed
    }

    /// Restore the timer so that `elapsed()` resumes from a saved duration.
    pub(crate) fn restore_elapsed(&mut self, elapsed: Duration) {
        let now = Instant::now();
        self.start_time = Some(now.checked_sub(elapsed).unwrap_or(now));
        self.paused_total = Duration::ZERO;
        self.pause_began = None;
    }

    /// Read a value from the extra bag.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Write a value into the extra bag.
    pub fn set_extra(&mut self, key: &str, value: &str) {
        self.extra.insert(key.to_string(), value.to_string());
    }

    /// Remove a value from the extra bag.
    pub fn remove_extra(&mut self, key: &str) {
        self.extra.remove(key);
    }

    /// Whether this session's terminal transition was already persisted.
    pub fn is_logged(&self) -> bool {
        self.extra(LOGGED_KEY).is_some()
    }

    /// Mark the current terminal transition as persisted.
    pub fn mark_as_logged(&mut self) {
        self.set_extra(LOGGED_KEY, "true");
    }

    /// Clear the logged marker (the session is heading for a new terminal
    /// transition after a continue-after-failure).
    pub(crate) fn clear_logged(&mut self) {
        self.remove_extra(LOGGED_KEY);
    }
}
