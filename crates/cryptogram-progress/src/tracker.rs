use crate::attempt::PuzzleAttempt;
use crate::store::{NoopStore, ProgressStore, StoreError};
use cryptogram_core::{EncodingMode, GameEngine, Puzzle, PuzzleSession};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Aggregator tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// How long a fetched attempt list stays fresh. Absorbs bursts of UI
    /// reads without re-querying the store on every frame.
    pub cache_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(1),
        }
    }
}

/// Aggregate statistics over every attempt on record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStats {
    pub total_attempts: usize,
    pub total_completions: usize,
    pub total_failures: usize,
    /// Completions over attempts, rounded to the nearest percent. 0 when
    /// there are no attempts.
    pub win_rate_percentage: u32,
    pub best_time: Option<Duration>,
    pub average_time: Option<Duration>,
}

struct CachedAttempts {
    fetched_at: Instant,
    attempts: Vec<PuzzleAttempt>,
}

/// Turns session lifecycle events into persisted attempts and logged
/// attempts into statistics.
///
/// Store errors never cross this boundary as panics or results; they land in
/// an observable error state so the host can show a non-blocking warning and
/// keep playing with progress simply not recorded.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    config: TrackerConfig,
    cache: Option<CachedAttempts>,
    last_error: Option<StoreError>,
    /// True when no backend was configured and the no-op substitute is in use.
    degraded: bool,
    next_attempt_id: u64,
}

impl ProgressTracker {
    /// Build a tracker. With no store configured the tracker degrades to a
    /// no-op backend instead of crashing the host; the condition stays
    /// visible through [`ProgressTracker::last_error`].
    pub fn new(store: Option<Arc<dyn ProgressStore>>, config: TrackerConfig) -> Self {
        let (store, degraded) = match store {
            Some(store) => (store, false),
            None => {
                warn!("no progress store configured; attempts will not be recorded");
                (Arc::new(NoopStore) as Arc<dyn ProgressStore>, true)
            }
        };

        // Seed attempt ids past whatever is already on record.
        let next_attempt_id = store
            .all_attempts()
            .map(|a| a.iter().map(|x| x.attempt_id).max().unwrap_or(0) + 1)
            .unwrap_or(1);

        Self {
            store,
            config,
            cache: None,
            last_error: degraded.then_some(StoreError::Unavailable),
            degraded,
            next_attempt_id,
        }
    }

    pub fn with_store(store: Arc<dyn ProgressStore>) -> Self {
        Self::new(Some(store), TrackerConfig::default())
    }

    /// The most recent store error, or the standing unavailable state when
    /// running without a backend.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    // ==================== Attempt logging ====================

    /// Persist a completed session as an attempt record.
    pub fn log_completion(
        &mut self,
        puzzle: &Puzzle,
        session: &PuzzleSession,
        mode: EncodingMode,
    ) {
        // Defensive fallback: a completion whose timer never started still
        // logs, with a zero time.
        let time = session.completion_time().unwrap_or(Duration::ZERO);
        let attempt = PuzzleAttempt::completed(
            self.take_attempt_id(),
            puzzle.id,
            mode,
            puzzle.difficulty,
            now_unix(),
            time,
            session.hint_count,
            session.mistake_count,
        );
        self.persist(attempt);
    }

    /// Persist a failed session as an attempt record.
    pub fn log_failure(&mut self, puzzle: &Puzzle, session: &PuzzleSession, mode: EncodingMode) {
        let attempt = PuzzleAttempt::failed(
            self.take_attempt_id(),
            puzzle.id,
            mode,
            puzzle.difficulty,
            now_unix(),
            session.hint_count,
            session.mistake_count,
        );
        self.persist(attempt);
    }

    /// Session-transition monitor: call after every mutating engine
    /// operation (or on a poll). Logs at most once per terminal transition;
    /// the session's logged flag is the sole de-duplication mechanism, since
    /// completion/failure state stays true across repeated observations.
    pub fn check_and_log(&mut self, engine: &mut GameEngine) {
        if engine.session().is_logged() {
            return;
        }
        let Some(puzzle) = engine.puzzle().cloned() else {
            return;
        };
        let session = engine.session().clone();
        let mode = engine.encoding_mode();

        if session.is_complete {
            self.log_completion(&puzzle, &session, mode);
            engine.mark_session_as_logged();
        } else if session.is_failed {
            self.log_failure(&puzzle, &session, mode);
            engine.mark_session_as_logged();
        }
    }

    fn take_attempt_id(&mut self) -> u64 {
        let id = self.next_attempt_id;
        self.next_attempt_id += 1;
        id
    }

    fn persist(&mut self, attempt: PuzzleAttempt) {
        debug!(
            "logging attempt {} for puzzle {}",
            attempt.attempt_id, attempt.puzzle_id
        );
        match self.store.log_attempt(attempt) {
            Ok(()) => {
                if !self.degraded {
                    self.last_error = None;
                }
            }
            Err(e) => {
                warn!("failed to log attempt: {}", e);
                self.last_error = Some(e);
            }
        }
        self.invalidate_cache();
    }

    // ==================== Queries ====================

    /// Completed attempts on one puzzle in one mode.
    pub fn completion_count(&mut self, puzzle_id: u64, mode: EncodingMode) -> usize {
        self.puzzle_attempts(puzzle_id, mode)
            .iter()
            .filter(|a| a.is_completion())
            .count()
    }

    /// Failed attempts on one puzzle in one mode.
    pub fn failure_count(&mut self, puzzle_id: u64, mode: EncodingMode) -> usize {
        self.puzzle_attempts(puzzle_id, mode)
            .iter()
            .filter(|a| a.is_failure())
            .count()
    }

    /// Fastest completion of one puzzle in one mode.
    pub fn best_time(&mut self, puzzle_id: u64, mode: EncodingMode) -> Option<Duration> {
        match self.store.best_completion_time(puzzle_id, mode) {
            Ok(best) => best,
            Err(e) => {
                warn!("failed to read best time: {}", e);
                self.last_error = Some(e);
                None
            }
        }
    }

    fn puzzle_attempts(&mut self, puzzle_id: u64, mode: EncodingMode) -> Vec<PuzzleAttempt> {
        match self.store.attempts(puzzle_id, mode) {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!("failed to read attempts: {}", e);
                self.last_error = Some(e);
                Vec::new()
            }
        }
    }

    /// Every attempt on record, cached for the configured TTL.
    pub fn all_attempts(&mut self) -> Vec<PuzzleAttempt> {
        if let Some(ref cached) = self.cache {
            if cached.fetched_at.elapsed() < self.config.cache_ttl {
                return cached.attempts.clone();
            }
        }

        match self.store.all_attempts() {
            Ok(attempts) => {
                if !self.degraded {
                    self.last_error = None;
                }
                self.cache = Some(CachedAttempts {
                    fetched_at: Instant::now(),
                    attempts: attempts.clone(),
                });
                attempts
            }
            Err(e) => {
                warn!("failed to read attempt history: {}", e);
                self.last_error = Some(e);
                Vec::new()
            }
        }
    }

    /// Most recent attempts first, for history display.
    pub fn recent(&mut self, limit: usize) -> Vec<PuzzleAttempt> {
        let mut attempts = self.all_attempts();
        attempts.sort_by(|a, b| b.finished_at().cmp(&a.finished_at()));
        attempts.truncate(limit);
        attempts
    }

    /// Aggregate statistics over all attempts.
    pub fn global_stats(&mut self) -> GlobalStats {
        let attempts = self.all_attempts();

        let total_attempts = attempts.len();
        let total_completions = attempts.iter().filter(|a| a.is_completion()).count();
        let total_failures = attempts.iter().filter(|a| a.is_failure()).count();
        let win_rate_percentage = if total_attempts == 0 {
            0
        } else {
            ((total_completions as f64 / total_attempts as f64) * 100.0).round() as u32
        };

        let times: Vec<Duration> = attempts.iter().filter_map(|a| a.completion_time).collect();
        let best_time = times.iter().copied().min();
        let average_time = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<Duration>() / times.len() as u32)
        };

        GlobalStats {
            total_attempts,
            total_completions,
            total_failures,
            win_rate_percentage,
            best_time,
            average_time,
        }
    }

    // ==================== Cache control ====================

    /// Drop the cached attempt list. Called internally after every write this
    /// tracker performs, so its own mutations are never observed stale.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Delete every attempt on record.
    pub fn clear_all_progress(&mut self) {
        match self.store.clear_all_progress() {
            Ok(()) => {
                if !self.degraded {
                    self.last_error = None;
                }
            }
            Err(e) => {
                warn!("failed to clear progress: {}", e);
                self.last_error = Some(e);
            }
        }
        self.invalidate_cache();
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use cryptogram_core::{Difficulty, EngineConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn engine_for(text: &str) -> GameEngine {
        let mut rng = StdRng::seed_from_u64(5);
        let puzzle = Puzzle::with_random_key(7, text, Difficulty::Medium, &mut rng);
        let config = EngineConfig {
            failure_delay: Duration::ZERO,
            ..EngineConfig::default()
        };
        let mut engine = GameEngine::new(EncodingMode::Letter, config);
        engine.start_new_puzzle(puzzle, &mut rng, true);
        engine
    }

    fn solve(engine: &mut GameEngine) {
        for index in 0..engine.cells().len() {
            let solution = engine.cells()[index].solution_char;
            if let Some(letter) = solution {
                engine.update_cell(index, &letter.to_string(), false, false);
            }
        }
    }

    fn completed_in(id: u64, secs: u64) -> PuzzleAttempt {
        PuzzleAttempt::completed(
            id,
            7,
            EncodingMode::Letter,
            Difficulty::Medium,
            1_000 + id,
            Duration::from_secs(secs),
            0,
            0,
        )
    }

    fn failed_attempt(id: u64) -> PuzzleAttempt {
        PuzzleAttempt::failed(
            id,
            7,
            EncodingMode::Letter,
            Difficulty::Medium,
            1_000 + id,
            0,
            3,
        )
    }

    #[test]
    fn test_completion_is_logged_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");

        engine.start_timer();
        solve(&mut engine);
        assert!(engine.session().is_complete);

        tracker.check_and_log(&mut engine);
        // Re-observing the still-complete session must not log again.
        tracker.check_and_log(&mut engine);
        tracker.check_and_log(&mut engine);

        assert_eq!(store.count(), 1);
        let attempts = store.all_attempts().unwrap();
        assert!(attempts[0].is_completion());
        assert_eq!(attempts[0].puzzle_id, 7);
    }

    #[test]
    fn test_failure_is_logged_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");

        for _ in 0..3 {
            engine.increment_mistakes();
        }
        engine.tick();
        assert!(engine.session().is_failed);

        tracker.check_and_log(&mut engine);
        tracker.check_and_log(&mut engine);

        assert_eq!(store.count(), 1);
        let attempts = store.all_attempts().unwrap();
        assert!(attempts[0].is_failure());
        assert_eq!(attempts[0].mistake_count, 3);
    }

    #[test]
    fn test_completion_after_continue_logs_a_second_attempt() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");

        for _ in 0..3 {
            engine.increment_mistakes();
        }
        engine.tick();
        tracker.check_and_log(&mut engine);
        assert_eq!(store.count(), 1);

        // Continuing re-arms logging for the next terminal transition.
        engine.continue_after_failure();
        tracker.check_and_log(&mut engine);
        assert_eq!(store.count(), 1);

        solve(&mut engine);
        tracker.check_and_log(&mut engine);
        tracker.check_and_log(&mut engine);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_completion_without_timer_logs_zero_time() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");

        solve(&mut engine); // no start_timer call
        tracker.check_and_log(&mut engine);

        let attempts = store.all_attempts().unwrap();
        assert_eq!(attempts[0].completion_time, Some(Duration::ZERO));
    }

    #[test]
    fn test_global_stats_over_known_times() {
        let store = Arc::new(MemoryStore::new());
        for (id, secs) in [(1, 10), (2, 20), (3, 30)] {
            store.log_attempt(completed_in(id, secs)).unwrap();
        }

        let mut tracker = ProgressTracker::with_store(store);
        let stats = tracker.global_stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.total_completions, 3);
        assert_eq!(stats.best_time, Some(Duration::from_secs(10)));
        assert_eq!(stats.average_time, Some(Duration::from_secs(20)));
        assert_eq!(stats.win_rate_percentage, 100);
    }

    #[test]
    fn test_win_rate_rounds_to_nearest_percent() {
        let store = Arc::new(MemoryStore::new());
        store.log_attempt(completed_in(1, 10)).unwrap();
        store.log_attempt(completed_in(2, 20)).unwrap();
        store.log_attempt(failed_attempt(3)).unwrap();

        let mut tracker = ProgressTracker::with_store(store);
        let stats = tracker.global_stats();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.win_rate_percentage, 67); // 2 of 3, rounded
    }

    #[test]
    fn test_global_stats_empty() {
        let mut tracker = ProgressTracker::with_store(Arc::new(MemoryStore::new()));
        let stats = tracker.global_stats();
        assert_eq!(stats, GlobalStats::default());
    }

    #[test]
    fn test_per_puzzle_counts_and_best_time() {
        let store = Arc::new(MemoryStore::new());
        store.log_attempt(completed_in(1, 30)).unwrap();
        store.log_attempt(completed_in(2, 20)).unwrap();
        store.log_attempt(failed_attempt(3)).unwrap();

        let mut tracker = ProgressTracker::with_store(store);
        assert_eq!(tracker.completion_count(7, EncodingMode::Letter), 2);
        assert_eq!(tracker.failure_count(7, EncodingMode::Letter), 1);
        assert_eq!(
            tracker.best_time(7, EncodingMode::Letter),
            Some(Duration::from_secs(20))
        );
        assert_eq!(tracker.completion_count(9, EncodingMode::Letter), 0);
    }

    #[test]
    fn test_cache_absorbs_reads_within_ttl() {
        let store = Arc::new(MemoryStore::new());
        store.log_attempt(completed_in(1, 10)).unwrap();

        let config = TrackerConfig {
            cache_ttl: Duration::from_secs(60),
        };
        let mut tracker =
            ProgressTracker::new(Some(store.clone() as Arc<dyn ProgressStore>), config);

        assert_eq!(tracker.all_attempts().len(), 1);

        // A write that bypasses the tracker is invisible within the TTL.
        store.insert_directly(completed_in(2, 20));
        assert_eq!(tracker.all_attempts().len(), 1);

        // A mutation through the tracker invalidates immediately.
        tracker.clear_all_progress();
        assert!(tracker.all_attempts().is_empty());
    }

    #[test]
    fn test_invalidate_cache_forces_a_fresh_read() {
        let store = Arc::new(MemoryStore::new());
        let config = TrackerConfig {
            cache_ttl: Duration::from_secs(60),
        };
        let mut tracker =
            ProgressTracker::new(Some(store.clone() as Arc<dyn ProgressStore>), config);

        assert!(tracker.all_attempts().is_empty());
        store.insert_directly(completed_in(1, 10));
        assert!(tracker.all_attempts().is_empty());

        tracker.invalidate_cache();
        assert_eq!(tracker.all_attempts().len(), 1);
    }

    #[test]
    fn test_missing_store_degrades_without_crashing() {
        let mut tracker = ProgressTracker::new(None, TrackerConfig::default());
        assert!(tracker.is_degraded());
        assert_eq!(tracker.last_error(), Some(&StoreError::Unavailable));

        let mut engine = engine_for("HI");
        solve(&mut engine);
        tracker.check_and_log(&mut engine);

        // Nothing recorded, nothing crashed, error state still visible.
        assert_eq!(tracker.global_stats(), GlobalStats::default());
        assert_eq!(tracker.last_error(), Some(&StoreError::Unavailable));
        assert!(engine.session().is_logged());
    }

    #[test]
    fn test_store_failure_surfaces_as_error_state() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");
        solve(&mut engine);

        store.set_available(false);
        tracker.check_and_log(&mut engine);
        assert!(matches!(
            tracker.last_error(),
            Some(StoreError::Failure(_))
        ));

        // A later successful write clears the error state.
        store.set_available(true);
        let puzzle = engine.puzzle().cloned().unwrap();
        let session = engine.session().clone();
        tracker.log_completion(&puzzle, &session, EncodingMode::Letter);
        assert!(tracker.last_error().is_none());
    }

    #[test]
    fn test_recent_orders_most_recent_first() {
        let store = Arc::new(MemoryStore::new());
        store.log_attempt(completed_in(1, 10)).unwrap();
        store.log_attempt(completed_in(3, 30)).unwrap();
        store.log_attempt(completed_in(2, 20)).unwrap();

        let mut tracker = ProgressTracker::with_store(store);
        let recent = tracker.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].attempt_id, 3);
        assert_eq!(recent[1].attempt_id, 2);
    }

    #[test]
    fn test_attempt_ids_continue_past_existing_records() {
        let store = Arc::new(MemoryStore::new());
        store.log_attempt(completed_in(41, 10)).unwrap();

        let mut tracker = ProgressTracker::with_store(store.clone());
        let mut engine = engine_for("HI");
        solve(&mut engine);
        tracker.check_and_log(&mut engine);

        let mut ids: Vec<u64> = store
            .all_attempts()
            .unwrap()
            .iter()
            .map(|a| a.attempt_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![41, 42]);
    }
}
