//! Progress store abstraction.
//!
//! Backends:
//! - `FileStore`: JSON file under the platform data dir
//! - `MemoryStore`: in-memory, for tests and ephemeral hosts
//! - `NoopStore`: degraded mode when no backend is configured

use crate::attempt::PuzzleAttempt;
use cryptogram_core::EncodingMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a progress store. Callers treat these as recoverable:
/// play continues, progress simply is not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No backend was configured at construction.
    Unavailable,
    /// A read or write against the backend failed.
    Failure(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "no progress store configured"),
            Self::Failure(e) => write!(f, "progress store failure: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence contract for attempt records.
pub trait ProgressStore: Send + Sync {
    /// Append one attempt record.
    fn log_attempt(&self, attempt: PuzzleAttempt) -> StoreResult<()>;

    /// All attempts for one puzzle in one encoding mode.
    fn attempts(&self, puzzle_id: u64, mode: EncodingMode) -> StoreResult<Vec<PuzzleAttempt>>;

    /// Minimum completion time among completed attempts for a puzzle, absent
    /// if it was never completed.
    fn best_completion_time(
        &self,
        puzzle_id: u64,
        mode: EncodingMode,
    ) -> StoreResult<Option<Duration>> {
        Ok(self
            .attempts(puzzle_id, mode)?
            .iter()
            .filter_map(|a| a.completion_time)
            .min())
    }

    /// Every attempt on record.
    fn all_attempts(&self) -> StoreResult<Vec<PuzzleAttempt>>;

    /// Delete all records.
    fn clear_all_progress(&self) -> StoreResult<()>;
}

// ==================== In-memory store ====================

/// In-memory store for tests and ephemeral hosts. The availability flag lets
/// tests exercise the failure paths.
pub struct MemoryStore {
    data: Mutex<Vec<PuzzleAttempt>>,
    available: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            available: Mutex::new(true),
        }
    }

    /// Make subsequent operations fail with a `StoreError::Failure`.
    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap() = available;
    }

    pub fn count(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Insert a record without going through `log_attempt`. Test hook for
    /// observing cache staleness.
    pub fn insert_directly(&self, attempt: PuzzleAttempt) {
        self.data.lock().unwrap().push(attempt);
    }

    fn check_available(&self) -> StoreResult<()> {
        if *self.available.lock().unwrap() {
            Ok(())
        } else {
            Err(StoreError::Failure("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for MemoryStore {
    fn log_attempt(&self, attempt: PuzzleAttempt) -> StoreResult<()> {
        self.check_available()?;
        self.data.lock().unwrap().push(attempt);
        Ok(())
    }

    fn attempts(&self, puzzle_id: u64, mode: EncodingMode) -> StoreResult<Vec<PuzzleAttempt>> {
        self.check_available()?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.puzzle_id == puzzle_id && a.encoding_mode == mode)
            .cloned()
            .collect())
    }

    fn all_attempts(&self) -> StoreResult<Vec<PuzzleAttempt>> {
        self.check_available()?;
        Ok(self.data.lock().unwrap().clone())
    }

    fn clear_all_progress(&self) -> StoreResult<()> {
        self.check_available()?;
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

// ==================== File-backed store ====================

/// File-backed store persisting attempts as pretty-printed JSON. Loads
/// lazily; a missing or corrupt file starts empty rather than failing.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<Option<Vec<PuzzleAttempt>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileStoreData {
    attempts: Vec<PuzzleAttempt>,
}

impl FileStore {
    /// Store under the platform data dir.
    pub fn new() -> Self {
        let path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptogram_attempts.json");
        Self::with_path(path)
    }

    /// Store at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }

    fn load(&self) -> Vec<PuzzleAttempt> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(ref attempts) = *cache {
            return attempts.clone();
        }

        let data: FileStoreData = match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
            Err(_) => FileStoreData::default(),
        };

        *cache = Some(data.attempts.clone());
        data.attempts
    }

    fn save(&self, attempts: Vec<PuzzleAttempt>) -> StoreResult<()> {
        let data = FileStoreData {
            attempts: attempts.clone(),
        };
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| StoreError::Failure(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| StoreError::Failure(e.to_string()))?;

        *self.cache.lock().unwrap() = Some(attempts);
        Ok(())
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for FileStore {
    fn log_attempt(&self, attempt: PuzzleAttempt) -> StoreResult<()> {
        let mut attempts = self.load();
        attempts.push(attempt);
        self.save(attempts)
    }

    fn attempts(&self, puzzle_id: u64, mode: EncodingMode) -> StoreResult<Vec<PuzzleAttempt>> {
        Ok(self
            .load()
            .into_iter()
            .filter(|a| a.puzzle_id == puzzle_id && a.encoding_mode == mode)
            .collect())
    }

    fn all_attempts(&self) -> StoreResult<Vec<PuzzleAttempt>> {
        Ok(self.load())
    }

    fn clear_all_progress(&self) -> StoreResult<()> {
        self.save(Vec::new())
    }
}

// ==================== No-op store ====================

/// Substitute backend for degraded mode: logs nothing, returns empty results,
/// never fails. The tracker surfaces the missing backend as a non-fatal
/// error state instead.
pub struct NoopStore;

impl ProgressStore for NoopStore {
    fn log_attempt(&self, _attempt: PuzzleAttempt) -> StoreResult<()> {
        Ok(())
    }

    fn attempts(&self, _puzzle_id: u64, _mode: EncodingMode) -> StoreResult<Vec<PuzzleAttempt>> {
        Ok(Vec::new())
    }

    fn all_attempts(&self) -> StoreResult<Vec<PuzzleAttempt>> {
        Ok(Vec::new())
    }

    fn clear_all_progress(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptogram_core::Difficulty;

    fn completed(id: u64, puzzle_id: u64, secs: u64) -> PuzzleAttempt {
        PuzzleAttempt::completed(
            id,
            puzzle_id,
            EncodingMode::Letter,
            Difficulty::Medium,
            1_000 + id,
            Duration::from_secs(secs),
            0,
            0,
        )
    }

    fn failed(id: u64, puzzle_id: u64) -> PuzzleAttempt {
        PuzzleAttempt::failed(
            id,
            puzzle_id,
            EncodingMode::Letter,
            Difficulty::Medium,
            1_000 + id,
            0,
            3,
        )
    }

    #[test]
    fn test_memory_store_filters_by_puzzle_and_mode() {
        let store = MemoryStore::new();
        store.log_attempt(completed(1, 7, 30)).unwrap();
        store.log_attempt(completed(2, 8, 40)).unwrap();
        store.log_attempt(failed(3, 7)).unwrap();

        let attempts = store.attempts(7, EncodingMode::Letter).unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(store.attempts(7, EncodingMode::Number).unwrap().is_empty());
        assert_eq!(store.all_attempts().unwrap().len(), 3);
    }

    #[test]
    fn test_best_completion_time_ignores_failures() {
        let store = MemoryStore::new();
        store.log_attempt(completed(1, 7, 30)).unwrap();
        store.log_attempt(completed(2, 7, 20)).unwrap();
        store.log_attempt(failed(3, 7)).unwrap();

        assert_eq!(
            store.best_completion_time(7, EncodingMode::Letter).unwrap(),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            store.best_completion_time(9, EncodingMode::Letter).unwrap(),
            None
        );
    }

    #[test]
    fn test_memory_store_clear() {
        let store = MemoryStore::new();
        store.log_attempt(completed(1, 7, 30)).unwrap();
        store.clear_all_progress().unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_memory_store_unavailable_fails() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(store.log_attempt(completed(1, 7, 30)).is_err());
        assert!(store.all_attempts().is_err());
    }

    #[test]
    fn test_noop_store_accepts_and_returns_nothing() {
        let store = NoopStore;
        store.log_attempt(completed(1, 7, 30)).unwrap();
        assert!(store.all_attempts().unwrap().is_empty());
        assert!(store.attempts(7, EncodingMode::Letter).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.json");

        let store = FileStore::with_path(path.clone());
        store.log_attempt(completed(1, 7, 30)).unwrap();
        store.log_attempt(failed(2, 7)).unwrap();

        // A fresh instance must read the same records back from disk.
        let reopened = FileStore::with_path(path);
        let attempts = reopened.all_attempts().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            reopened
                .best_completion_time(7, EncodingMode::Letter)
                .unwrap(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_file_store_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::with_path(dir.path().join("nothing_here.json"));
        assert!(store.all_attempts().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = FileStore::with_path(path);
        assert!(store.all_attempts().unwrap().is_empty());
    }
}
