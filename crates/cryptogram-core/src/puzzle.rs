use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Puzzle difficulty rating, assigned by the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "Easy"),
            Self::Medium => write!(f, "Medium"),
            Self::Hard => write!(f, "Hard"),
        }
    }
}

/// How solution letters are displayed in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingMode {
    /// Each letter is shown as a different cipher letter.
    Letter,
    /// Each letter is shown as a number 1-26.
    Number,
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter => write!(f, "letter"),
            Self::Number => write!(f, "number"),
        }
    }
}

/// Error for an unrecognized encoding-mode selector string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEncodingMode(pub String);

impl fmt::Display for UnknownEncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown encoding mode: {:?}", self.0)
    }
}

impl std::error::Error for UnknownEncodingMode {}

impl FromStr for EncodingMode {
    type Err = UnknownEncodingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "letter" | "letters" => Ok(Self::Letter),
            "number" | "numbers" => Ok(Self::Number),
            other => Err(UnknownEncodingMode(other.to_string())),
        }
    }
}

/// Substitution key for one puzzle instance.
///
/// Maps each solution letter (A-Z) to the cipher letter shown in letter mode
/// and to the number shown in number mode. Both directions of the letter map
/// are bijective; the number assignment is a permutation of 1-26.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingKey {
    letter_map: HashMap<char, char>,
    number_map: HashMap<char, u8>,
}

impl EncodingKey {
    /// Build a key from explicit maps (as supplied by the puzzle pipeline).
    pub fn new(letter_map: HashMap<char, char>, number_map: HashMap<char, u8>) -> Self {
        Self {
            letter_map,
            number_map,
        }
    }

    /// Generate a random key: a shuffled alphabet with no fixed points
    /// (a letter never encodes as itself) and a shuffled 1-26 assignment.
    pub fn random(rng: &mut impl Rng) -> Self {
        let alphabet: Vec<char> = ('A'..='Z').collect();

        let mut shuffled = alphabet.clone();
        loop {
            shuffled.shuffle(rng);
            if alphabet.iter().zip(&shuffled).all(|(a, b)| a != b) {
                break;
            }
        }
        let letter_map = alphabet.iter().copied().zip(shuffled).collect();

        let mut numbers: Vec<u8> = (1..=26).collect();
        numbers.shuffle(rng);
        let number_map = alphabet.iter().copied().zip(numbers).collect();

        Self {
            letter_map,
            number_map,
        }
    }

    /// Encoded display token for a solution letter, or `None` for characters
    /// the key does not cover.
    pub fn encode(&self, solution: char, mode: EncodingMode) -> Option<String> {
        let upper = solution.to_ascii_uppercase();
        match mode {
            EncodingMode::Letter => self.letter_map.get(&upper).map(|c| c.to_string()),
            EncodingMode::Number => self.number_map.get(&upper).map(|n| n.to_string()),
        }
    }
}

/// An immutable puzzle as selected by the content subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    /// Stable puzzle identifier (keys attempt history).
    pub id: u64,
    /// The plaintext quotation, possibly multi-word.
    pub solution_text: String,
    pub difficulty: Difficulty,
    pub encoding_key: EncodingKey,
}

impl Puzzle {
    pub fn new(id: u64, solution_text: &str, difficulty: Difficulty, key: EncodingKey) -> Self {
        Self {
            id,
            solution_text: solution_text.to_string(),
            difficulty,
            encoding_key: key,
        }
    }

    /// Convenience constructor that mints a fresh random key.
    pub fn with_random_key(
        id: u64,
        solution_text: &str,
        difficulty: Difficulty,
        rng: &mut impl Rng,
    ) -> Self {
        Self::new(id, solution_text, difficulty, EncodingKey::random(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_key_is_bijective_with_no_fixed_points() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = EncodingKey::random(&mut rng);

        let mut seen = std::collections::HashSet::new();
        for letter in 'A'..='Z' {
            let token = key.encode(letter, EncodingMode::Letter).unwrap();
            assert_ne!(token, letter.to_string(), "letter must not map to itself");
            assert!(seen.insert(token), "cipher letters must not collide");
        }
        assert_eq!(seen.len(), 26);
    }

    #[test]
    fn test_number_mode_covers_1_to_26() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = EncodingKey::random(&mut rng);

        let mut numbers: Vec<u8> = ('A'..='Z')
            .map(|l| {
                key.encode(l, EncodingMode::Number)
                    .unwrap()
                    .parse()
                    .unwrap()
            })
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=26).collect::<Vec<u8>>());
    }

    #[test]
    fn test_encode_is_case_insensitive() {
        let mut rng = StdRng::seed_from_u64(1);
        let key = EncodingKey::random(&mut rng);
        assert_eq!(
            key.encode('a', EncodingMode::Letter),
            key.encode('A', EncodingMode::Letter)
        );
    }

    #[test]
    fn test_encoding_mode_selector_parsing() {
        assert_eq!("letter".parse::<EncodingMode>(), Ok(EncodingMode::Letter));
        assert_eq!("Numbers".parse::<EncodingMode>(), Ok(EncodingMode::Number));
        assert!("morse".parse::<EncodingMode>().is_err());
    }
}
