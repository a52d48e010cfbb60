use crate::puzzle::{EncodingMode, Puzzle};
use serde::{Deserialize, Serialize};

/// One placeholder in the encoded quotation.
///
/// Symbol cells (spaces, punctuation) are fixed scenery: they carry their own
/// literal character, hold no solution letter, and never accept input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptogramCell {
    /// Stable identity, used by the UI to correlate animations across renders.
    pub id: u64,
    /// Sequence index within the quotation.
    pub position: usize,
    /// Display token: a cipher letter, a digit group, or the literal symbol.
    pub encoded_char: String,
    /// The plaintext letter this cell stands for; `None` for symbol cells.
    pub solution_char: Option<char>,
    pub is_symbol: bool,
    /// Current guess; empty means unfilled.
    pub user_input: String,
    pub is_revealed: bool,
    /// Revealed by the difficulty prefill, as opposed to a later hint.
    pub is_pre_filled: bool,
    pub is_error: bool,
    /// Transient animation flag, cleared only by explicit acknowledgement.
    pub was_just_filled: bool,
}

impl CryptogramCell {
    fn letter(id: u64, position: usize, encoded: String, solution: char) -> Self {
        Self {
            id,
            position,
            encoded_char: encoded,
            solution_char: Some(solution.to_ascii_uppercase()),
            is_symbol: false,
            user_input: String::new(),
            is_revealed: false,
            is_pre_filled: false,
            is_error: false,
            was_just_filled: false,
        }
    }

    fn symbol(id: u64, position: usize, ch: char) -> Self {
        Self {
            id,
            position,
            encoded_char: ch.to_string(),
            solution_char: None,
            is_symbol: true,
            user_input: String::new(),
            is_revealed: false,
            is_pre_filled: false,
            is_error: false,
            was_just_filled: false,
        }
    }

    /// Whether the current guess matches the solution letter (case-insensitive).
    pub fn is_correct(&self) -> bool {
        if self.is_symbol || self.user_input.is_empty() {
            return false;
        }
        match self.solution_char {
            Some(solution) => self.user_input.eq_ignore_ascii_case(&solution.to_string()),
            None => false,
        }
    }

    /// Whether the player can type into this cell.
    pub fn is_editable(&self) -> bool {
        !self.is_symbol && !self.is_revealed && !self.is_pre_filled
    }

    /// Whether this cell is the space between words.
    pub fn is_space(&self) -> bool {
        self.is_symbol && self.encoded_char == " "
    }
}

/// Build the cell sequence for a puzzle in the given encoding mode.
///
/// Every character of the solution text becomes exactly one cell, in order.
/// Alphabetic characters map through the substitution key; anything else
/// becomes a symbol cell. A letter the key does not cover passes through
/// unencoded rather than dropping the cell.
pub fn build_cells(puzzle: &Puzzle, mode: EncodingMode, id_base: u64) -> Vec<CryptogramCell> {
    puzzle
        .solution_text
        .chars()
        .enumerate()
        .map(|(position, ch)| {
            let id = id_base + position as u64;
            if ch.is_ascii_alphabetic() {
                let encoded = puzzle
                    .encoding_key
                    .encode(ch, mode)
                    .unwrap_or_else(|| ch.to_ascii_uppercase().to_string());
                CryptogramCell::letter(id, position, encoded, ch)
            } else {
                CryptogramCell::symbol(id, position, ch)
            }
        })
        .collect()
}

/// A contiguous run of non-space cells, for word-wrapping layout.
///
/// Recomputed from the cells on demand; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordGroup {
    /// Indices into the cell sequence, in order. Punctuation cells stay
    /// attached to the word they follow; only spaces break groups.
    pub cell_indices: Vec<usize>,
    /// Whether a space cell followed this group.
    pub followed_by_space: bool,
}

/// Project the cell sequence into word groups.
pub fn word_groups(cells: &[CryptogramCell]) -> Vec<WordGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for (index, cell) in cells.iter().enumerate() {
        if cell.is_space() {
            if !current.is_empty() {
                groups.push(WordGroup {
                    cell_indices: std::mem::take(&mut current),
                    followed_by_space: true,
                });
            }
        } else {
            current.push(index);
        }
    }
    if !current.is_empty() {
        groups.push(WordGroup {
            cell_indices: current,
            followed_by_space: false,
        });
    }
    groups
}
