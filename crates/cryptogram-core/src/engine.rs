use crate::cell::{build_cells, word_groups, CryptogramCell, WordGroup};
use crate::puzzle::{EncodingMode, Puzzle};
use crate::session::PuzzleSession;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Engine tuning knobs. The defaults match the shipped game; they are
/// configuration rather than hard-coded literals so future balancing does not
/// touch the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Mistakes allowed before the session auto-fails.
    pub mistake_threshold: u32,
    /// Delay before the failure transition fires, so the last mistake
    /// animation can play out.
    pub failure_delay: Duration,
    /// Fraction of distinct solution letters revealed at puzzle start.
    pub prefill_fraction: f64,
    pub prefill_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mistake_threshold: 3,
            failure_delay: Duration::from_millis(600),
            prefill_fraction: 0.20,
            prefill_enabled: true,
        }
    }
}

/// The puzzle session state machine.
///
/// Owns the cell grid and the session for one solving attempt, and exposes
/// every mutation the UI performs. Gameplay operations never return errors:
/// out-of-range or symbol-cell indices are absorbed as no-ops.
///
/// Single-threaded cooperative model: the host pumps [`GameEngine::tick`]
/// from its event loop so the delayed failure transition can fire.
pub struct GameEngine {
    puzzle: Option<Puzzle>,
    encoding_mode: EncodingMode,
    config: EngineConfig,
    cells: Vec<CryptogramCell>,
    session: PuzzleSession,
    /// Encoded tokens for which every cell sharing the token has input.
    completed_letters: HashSet<String>,
    /// Keyboard-highlight cache: solution letter -> encoded tokens occurring
    /// in this puzzle. Rebuilt whenever the cells are rebuilt, never patched.
    solution_to_encoded: HashMap<char, BTreeSet<String>>,
    letters_in_puzzle: HashSet<char>,
    /// Deadline of a scheduled failure transition, if one is pending.
    pending_failure: Option<Instant>,
    /// Monotonic base for cell ids, so rebuilt grids get fresh identities.
    next_cell_id: u64,
}

impl GameEngine {
    pub fn new(encoding_mode: EncodingMode, config: EngineConfig) -> Self {
        Self {
            puzzle: None,
            encoding_mode,
            config,
            cells: Vec::new(),
            session: PuzzleSession::new(),
            completed_letters: HashSet::new(),
            solution_to_encoded: HashMap::new(),
            letters_in_puzzle: HashSet::new(),
            pending_failure: None,
            next_cell_id: 0,
        }
    }

    // ==================== Read-only projections ====================

    pub fn puzzle(&self) -> Option<&Puzzle> {
        self.puzzle.as_ref()
    }

    pub fn encoding_mode(&self) -> EncodingMode {
        self.encoding_mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cells(&self) -> &[CryptogramCell] {
        &self.cells
    }

    pub fn session(&self) -> &PuzzleSession {
        &self.session
    }

    /// Fraction of non-symbol cells with any input. 0 when the puzzle has no
    /// letter cells at all.
    pub fn progress_percentage(&self) -> f64 {
        let total = self.cells.iter().filter(|c| !c.is_symbol).count();
        if total == 0 {
            return 0.0;
        }
        let filled = self
            .cells
            .iter()
            .filter(|c| !c.is_symbol && !c.user_input.is_empty())
            .count();
        filled as f64 / total as f64
    }

    /// Word-wrapping projection of the current cells.
    pub fn word_groups(&self) -> Vec<WordGroup> {
        word_groups(&self.cells)
    }

    /// Encoded tokens whose cells are all filled in.
    pub fn completed_letters(&self) -> &HashSet<String> {
        &self.completed_letters
    }

    /// Solution letter -> set of encoded tokens used in this puzzle.
    pub fn solution_to_encoded(&self) -> &HashMap<char, BTreeSet<String>> {
        &self.solution_to_encoded
    }

    /// Distinct solution letters occurring in this puzzle.
    pub fn letters_in_puzzle(&self) -> &HashSet<char> {
        &self.letters_in_puzzle
    }

    /// Ids of cells whose fill animation has not been acknowledged yet.
    pub fn cells_to_animate(&self) -> Vec<u64> {
        self.cells
            .iter()
            .filter(|c| c.was_just_filled)
            .map(|c| c.id)
            .collect()
    }

    /// Whether a failure transition is scheduled but has not fired.
    pub fn has_pending_failure(&self) -> bool {
        self.pending_failure.is_some()
    }

    // ==================== Lifecycle ====================

    /// Load a puzzle and start a fresh session.
    ///
    /// Builds the cells, rebuilds the keyboard-mapping cache, applies the
    /// difficulty prefill (unless skipped, as when restoring saved progress),
    /// and selects the first editable cell.
    pub fn start_new_puzzle(&mut self, puzzle: Puzzle, rng: &mut impl Rng, skip_prefill: bool) {
        self.load_puzzle(puzzle);
        if !skip_prefill && self.config.prefill_enabled {
            self.apply_prefill(rng);
        }
        self.select_first_editable_cell();
    }

    /// Wipe all user input and replay the same puzzle with a fresh session
    /// and a new random prefill selection.
    pub fn reset_puzzle(&mut self, rng: &mut impl Rng) {
        if self.puzzle.is_none() {
            return;
        }
        self.pending_failure = None;
        for cell in &mut self.cells {
            cell.user_input.clear();
            cell.is_error = false;
            cell.was_just_filled = false;
            cell.is_revealed = false;
            cell.is_pre_filled = false;
        }
        self.session = PuzzleSession::new();
        self.recompute_completed_letters();
        if self.config.prefill_enabled {
            self.apply_prefill(rng);
        }
        self.select_first_editable_cell();
    }

    fn load_puzzle(&mut self, puzzle: Puzzle) {
        self.pending_failure = None;
        self.cells = build_cells(&puzzle, self.encoding_mode, self.next_cell_id);
        self.next_cell_id += self.cells.len() as u64;
        self.session = PuzzleSession::new();
        self.completed_letters.clear();
        self.rebuild_keyboard_map();
        self.puzzle = Some(puzzle);
    }

    // ==================== Cell mutations ====================

    /// Set a cell's guess and flags. Out-of-range indices and symbol cells
    /// are ignored.
    pub fn update_cell(&mut self, index: usize, input: &str, is_revealed: bool, is_error: bool) {
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if cell.is_symbol {
            return;
        }
        cell.user_input = input.to_string();
        cell.is_revealed = is_revealed;
        cell.is_error = is_error;
        cell.was_just_filled = !input.is_empty();

        self.recompute_completed_letters();
        self.check_completion();
    }

    /// Clear a cell's guess and error state. Reveal status is untouched.
    pub fn clear_cell(&mut self, index: usize) {
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if cell.is_symbol {
            return;
        }
        cell.user_input.clear();
        cell.is_error = false;
        cell.was_just_filled = false;

        self.recompute_completed_letters();
    }

    /// Flag a cell as hint-revealed. A hint reveal supersedes prefill status,
    /// and every reveal call counts one hint against the session.
    pub fn mark_cell_revealed(&mut self, index: usize) {
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };
        if cell.is_symbol {
            return;
        }
        cell.is_revealed = true;
        cell.is_pre_filled = false;
        self.session.hint_count += 1;
    }

    /// Hint: fill a cell with its solution letter and mark it revealed.
    pub fn reveal_cell(&mut self, index: usize) {
        let Some(solution) = self.cells.get(index).and_then(|c| c.solution_char) else {
            return;
        };
        self.update_cell(index, &solution.to_string(), true, false);
        self.mark_cell_revealed(index);
    }

    /// Move the selection. Symbol cells and out-of-range indices are rejected.
    pub fn select_cell(&mut self, index: usize) {
        match self.cells.get(index) {
            Some(cell) if !cell.is_symbol => {
                self.session.selected_cell_index = Some(index);
            }
            _ => {}
        }
    }

    /// Clear all pending fill-animation flags. Called by the UI once it has
    /// picked up [`GameEngine::cells_to_animate`].
    pub fn acknowledge_animations(&mut self) {
        for cell in &mut self.cells {
            cell.was_just_filled = false;
        }
    }

    // ==================== Session transitions ====================

    /// Count a mistake. Reaching the threshold schedules the failure
    /// transition after a short delay so the mistake animation can play; the
    /// transition is re-checked when it fires.
    pub fn increment_mistakes(&mut self) {
        self.session.mistake_count += 1;
        if self.session.mistake_count >= self.config.mistake_threshold
            && !self.session.is_failed
            && !self.session.has_continued_after_failure
            && self.pending_failure.is_none()
        {
            self.pending_failure = Some(Instant::now() + self.config.failure_delay);
        }
    }

    /// Fire a due failure transition, if any. Suppressed when the session
    /// completed or failed while the delay was running.
    pub fn tick(&mut self) {
        let Some(deadline) = self.pending_failure else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }
        self.pending_failure = None;
        if self.session.is_complete || self.session.is_failed {
            return;
        }
        self.session.is_failed = true;
        self.session.end_time = Some(Instant::now());
        debug!(
            "session failed after {} mistakes",
            self.session.mistake_count
        );
    }

    /// One-shot transition out of the failed state. Blocks any further
    /// auto-fail and re-arms logging for the session's next terminal
    /// transition.
    pub fn continue_after_failure(&mut self) {
        if !self.session.is_failed || self.session.has_continued_after_failure {
            return;
        }
        self.pending_failure = None;
        self.session.is_failed = false;
        self.session.has_continued_after_failure = true;
        self.session.end_time = None;
        self.session.clear_logged();
    }

    /// Start the session timer; the first call wins.
    pub fn start_timer(&mut self) {
        self.session.start_timer();
    }

    pub fn toggle_pause(&mut self) {
        self.session.toggle_pause();
    }

    pub fn pause(&mut self) {
        if self.session.has_started() && !self.session.is_paused {
            self.session.toggle_pause();
        }
    }

    pub fn resume(&mut self) {
        if self.session.has_started() && self.session.is_paused {
            self.session.toggle_pause();
        }
    }

    /// Record that the current terminal transition has been persisted.
    pub fn mark_session_as_logged(&mut self) {
        self.session.mark_as_logged();
    }

    // ==================== Internals ====================

    /// Reveal `max(1, ceil(prefill_fraction * distinct letters))` letters,
    /// one randomly chosen occurrence each. A working set keeps one pass from
    /// picking the same cell twice.
    fn apply_prefill(&mut self, rng: &mut impl Rng) {
        let mut letters: Vec<char> = self
            .cells
            .iter()
            .filter_map(|c| c.solution_char)
            .collect::<BTreeSet<char>>()
            .into_iter()
            .collect();
        if letters.is_empty() {
            return;
        }

        let reveal_count =
            ((letters.len() as f64 * self.config.prefill_fraction).ceil() as usize).max(1);
        letters.shuffle(rng);

        let mut revealed: HashSet<usize> = HashSet::new();
        for &letter in letters.iter().take(reveal_count) {
            let candidates: Vec<usize> = self
                .cells
                .iter()
                .enumerate()
                .filter(|(i, c)| {
                    c.solution_char == Some(letter) && !c.is_revealed && !revealed.contains(i)
                })
                .map(|(i, _)| i)
                .collect();
            if let Some(&index) = candidates.choose(rng) {
                let cell = &mut self.cells[index];
                cell.user_input = letter.to_string();
                cell.is_revealed = true;
                cell.is_pre_filled = true;
                revealed.insert(index);
            }
        }
        self.recompute_completed_letters();
    }

    /// One linear pass: a token is completed iff no cell sharing it is empty.
    fn recompute_completed_letters(&mut self) {
        let mut has_empty: HashMap<&str, bool> = HashMap::new();
        for cell in self.cells.iter().filter(|c| !c.is_symbol) {
            let entry = has_empty.entry(cell.encoded_char.as_str()).or_insert(false);
            *entry |= cell.user_input.is_empty();
        }
        self.completed_letters = has_empty
            .into_iter()
            .filter(|(_, empty)| !empty)
            .map(|(token, _)| token.to_string())
            .collect();
    }

    /// Full re-scan; puzzle sizes are small enough that no incremental
    /// counter is warranted.
    fn check_completion(&mut self) {
        if self.session.is_complete {
            return;
        }
        let total = self.cells.iter().filter(|c| !c.is_symbol).count();
        if total == 0 {
            return;
        }
        let correct = self.cells.iter().filter(|c| c.is_correct()).count();
        if correct == total {
            self.session.is_complete = true;
            self.session.end_time = Some(Instant::now());
            debug!("puzzle solved");
        }
    }

    fn rebuild_keyboard_map(&mut self) {
        self.solution_to_encoded.clear();
        self.letters_in_puzzle.clear();
        for cell in &self.cells {
            if let Some(solution) = cell.solution_char {
                self.solution_to_encoded
                    .entry(solution)
                    .or_default()
                    .insert(cell.encoded_char.clone());
                self.letters_in_puzzle.insert(solution);
            }
        }
    }

    fn select_first_editable_cell(&mut self) {
        self.session.selected_cell_index = self.cells.iter().position(|c| c.is_editable());
    }

    // ==================== Save state ====================

    /// Serialize in-flight progress for later restoration.
    pub fn snapshot(&self) -> String {
        let Some(puzzle) = &self.puzzle else {
            return String::new();
        };
        let state = SaveState {
            puzzle: puzzle.clone(),
            encoding_mode: self.encoding_mode,
            cells: self
                .cells
                .iter()
                .map(|c| CellSave {
                    user_input: c.user_input.clone(),
                    is_revealed: c.is_revealed,
                    is_pre_filled: c.is_pre_filled,
                    is_error: c.is_error,
                })
                .collect(),
            mistake_count: self.session.mistake_count,
            hint_count: self.session.hint_count,
            elapsed_secs: self.session.elapsed().as_secs(),
            has_continued_after_failure: self.session.has_continued_after_failure,
        };
        serde_json::to_string(&state).unwrap_or_default()
    }

    /// Rebuild an engine from a snapshot. The prefill is skipped; the saved
    /// cell states already include any prefilled reveals.
    pub fn restore(json: &str, config: EngineConfig) -> Option<Self> {
        let state: SaveState = serde_json::from_str(json).ok()?;

        let mut engine = Self::new(state.encoding_mode, config);
        engine.load_puzzle(state.puzzle);
        if engine.cells.len() != state.cells.len() {
            return None;
        }
        for (cell, saved) in engine.cells.iter_mut().zip(&state.cells) {
            cell.user_input = saved.user_input.clone();
            cell.is_revealed = saved.is_revealed;
            cell.is_pre_filled = saved.is_pre_filled;
            cell.is_error = saved.is_error;
        }
        engine.session.mistake_count = state.mistake_count;
        engine.session.hint_count = state.hint_count;
        engine.session.has_continued_after_failure = state.has_continued_after_failure;
        engine
            .session
            .restore_elapsed(Duration::from_secs(state.elapsed_secs));
        engine.recompute_completed_letters();
        engine.select_first_editable_cell();
        Some(engine)
    }
}

#[derive(Serialize, Deserialize)]
struct CellSave {
    user_input: String,
    is_revealed: bool,
    is_pre_filled: bool,
    is_error: bool,
}

#[derive(Serialize, Deserialize)]
struct SaveState {
    puzzle: Puzzle,
    encoding_mode: EncodingMode,
    cells: Vec<CellSave>,
    mistake_count: u32,
    hint_count: u32,
    elapsed_secs: u64,
    has_continued_after_failure: bool,
}
