//! Word oracle
//!
//! Supplies secret words and computes how a guess changes the mask.
//! The oracle is read-only after construction and shared between all
//! worker threads behind an `Arc`.

use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::error::AppError;

/// Character shown for letters that have not been revealed yet
pub const PLACEHOLDER: char = '-';

/// Words used when no word file is configured
const BUILTIN_WORDS: &[&str] = &[
    "apple", "bridge", "candle", "dolphin", "engine", "forest", "garden", "harbor", "island",
    "jungle", "kettle", "lantern", "marble", "needle", "orange", "pepper", "quartz", "rabbit",
    "saddle", "timber", "umbrella", "velvet", "window", "yellow", "zipper", "socket", "network",
    "server", "channel", "selector",
];

/// Source of secret words plus the letter-reveal rule
pub trait WordOracle: Send + Sync {
    /// Pick the secret word for a new round (lower-case letters only)
    fn secret_word(&self) -> String;

    /// Apply a guess to the current mask
    ///
    /// Returns `None` when the guess is neither a single letter nor as long
    /// as the secret word.
    fn reveal(&self, secret: &str, guess: &str, mask: &str) -> Option<String> {
        reveal(secret, guess, mask)
    }
}

/// A fully hidden mask for `secret`
pub fn hidden_mask(secret: &str) -> String {
    secret.chars().map(|_| PLACEHOLDER).collect()
}

/// Reveal the positions of `secret` matched by `guess`
///
/// A single character reveals every occurrence of that character. A guess
/// as long as the secret reveals the whole word on an exact match and
/// nothing otherwise. Any other length yields `None`.
pub fn reveal(secret: &str, guess: &str, mask: &str) -> Option<String> {
    let secret_len = secret.chars().count();
    let mut guess_chars = guess.chars();

    match (guess_chars.next(), guess_chars.next()) {
        (Some(letter), None) => Some(
            secret
                .chars()
                .zip(mask.chars())
                .map(|(s, m)| if s == letter { s } else { m })
                .collect(),
        ),
        _ if guess.chars().count() == secret_len => {
            if guess == secret {
                Some(secret.to_string())
            } else {
                Some(mask.to_string())
            }
        }
        _ => None,
    }
}

/// In-memory word table
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Build a word list, normalising entries to lower case
    ///
    /// Blank entries and entries containing non-letters are skipped.
    pub fn new<I, S>(words: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted = Vec::new();
        for word in words {
            let word = word.as_ref().trim();
            if word.is_empty() {
                continue;
            }
            if !word.chars().all(char::is_alphabetic) {
                warn!("Skipping word list entry '{}': not letters only", word);
                continue;
            }
            accepted.push(word.to_lowercase());
        }

        if accepted.is_empty() {
            return Err(AppError::EmptyWordList);
        }
        Ok(Self { words: accepted })
    }

    /// The compiled-in word table
    pub fn builtin() -> Self {
        Self {
            words: BUILTIN_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Load a newline-separated word file
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path).map_err(|source| AppError::WordList {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::new(contents.lines())?;
        info!("Loaded {} words from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordOracle for WordList {
    fn secret_word(&self) -> String {
        // `new` and `builtin` never produce an empty table
        self.words
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_letter_reveals_every_occurrence() {
        for (secret, letter) in [("banana", "a"), ("letter", "t"), ("cat", "c"), ("mississippi", "s")] {
            let mask = hidden_mask(secret);
            let revealed = reveal(secret, letter, &mask).unwrap();
            let letter = letter.chars().next().unwrap();

            for (s, r) in secret.chars().zip(revealed.chars()) {
                if s == letter {
                    assert_eq!(r, letter);
                } else {
                    assert_eq!(r, PLACEHOLDER);
                }
            }
        }
    }

    #[test]
    fn test_reveal_keeps_previous_letters() {
        assert_eq!(reveal("cat", "t", "-a-").unwrap(), "-at");
    }

    #[test]
    fn test_missing_letter_leaves_mask() {
        assert_eq!(reveal("cat", "z", "---").unwrap(), "---");
    }

    #[test]
    fn test_full_word_guess() {
        assert_eq!(reveal("cat", "cat", "-a-").unwrap(), "cat");
        assert_eq!(reveal("cat", "cot", "-a-").unwrap(), "-a-");
    }

    #[test]
    fn test_other_lengths_rejected() {
        assert!(reveal("cat", "ca", "---").is_none());
        assert!(reveal("cat", "cats", "---").is_none());
        assert!(reveal("cat", "", "---").is_none());
    }

    #[test]
    fn test_word_list_normalises() {
        let list = WordList::new(["  Apple ", "", "x-ray", "PEAR"]).unwrap();
        assert_eq!(list.len(), 2);
        let word = list.secret_word();
        assert!(word == "apple" || word == "pear");
    }

    #[test]
    fn test_empty_word_list_rejected() {
        let result = WordList::new(["", "  ", "42"]);
        assert!(matches!(result, Err(AppError::EmptyWordList)));
    }

    #[test]
    fn test_builtin_words_are_letters() {
        let list = WordList::builtin();
        assert!(!list.is_empty());
        for _ in 0..20 {
            let word = list.secret_word();
            assert!(word.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_missing_file() {
        let result = WordList::from_file(Path::new("/definitely/not/here/words.txt"));
        assert!(matches!(result, Err(AppError::WordList { .. })));
    }
}
