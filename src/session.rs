//! Per-connection game session
//!
//! Holds one player's round and score, and composes the human-readable
//! responses for every operation. The session never touches the network:
//! responses pile up in a queue that the reactor drains into a frame.
//!
//! A `Session` value is moved into the worker job that executes a command
//! and handed back to the reactor when the job finishes, so exactly one
//! thread can mutate it at any time.

use std::collections::{HashSet, VecDeque};

use crate::error::GuessError;
use crate::oracle::{hidden_mask, WordOracle};

/// Where the session is in its round lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// No round has been played yet
    Idle,
    /// A round is in progress
    Active,
    /// Last round ended with the word revealed
    Won,
    /// Last round ended with no tries left
    Lost,
}

/// Result of an accepted guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Guess revealed something, round continues
    Hit,
    /// Guess revealed nothing, one try consumed
    Miss,
    /// Word fully revealed
    Won,
    /// Last try consumed
    Lost,
}

/// Game and protocol state for one connection
#[derive(Debug, Default)]
pub struct Session {
    secret_word: String,
    mask: String,
    tries_remaining: u32,
    score: i32,
    guesses: HashSet<String>,
    playing: bool,
    last_result: Option<GuessOutcome>,
    pending: VecDeque<String>,
    disconnected: bool,
}

impl Session {
    /// Fresh session: not playing, score zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the greeting sent right after accept
    pub fn greet(&mut self) {
        self.respond("Connected to the hangman server. Write 'NEWWORD' to start a game");
    }

    /// Queue a response line
    pub fn respond(&mut self, line: impl Into<String>) {
        self.pending.push_back(line.into());
    }

    /// Drain all queued response lines in order
    pub fn take_responses(&mut self) -> Vec<String> {
        self.pending.drain(..).collect()
    }

    pub fn has_responses(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn tries_remaining(&self) -> u32 {
        self.tries_remaining
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub fn state(&self) -> RoundState {
        if self.playing {
            return RoundState::Active;
        }
        match self.last_result {
            Some(GuessOutcome::Won) => RoundState::Won,
            Some(GuessOutcome::Lost) => RoundState::Lost,
            _ => RoundState::Idle,
        }
    }

    /// Start a round unless one is already running
    ///
    /// Returns `true` when a new round was started.
    pub fn new_word(&mut self, oracle: &dyn WordOracle) -> bool {
        if self.playing {
            let line = format!(
                "A round is already in progress. Current word: {}, tries remaining: {}",
                self.mask, self.tries_remaining
            );
            self.respond(line);
            return false;
        }

        self.secret_word = oracle.secret_word();
        self.mask = hidden_mask(&self.secret_word);
        self.tries_remaining = self.secret_word.chars().count() as u32;
        self.guesses.clear();
        self.last_result = None;
        self.playing = true;

        self.respond("Starting new game");
        let info = format!(
            "Current word is {} characters. You have {} guesses remaining",
            self.mask.chars().count(),
            self.tries_remaining
        );
        self.respond(info);
        true
    }

    /// Guess a letter or the whole word
    ///
    /// Rejections leave the round untouched; their text is queued as the
    /// response by the caller.
    pub fn guess(
        &mut self,
        oracle: &dyn WordOracle,
        guess: Option<&str>,
    ) -> Result<GuessOutcome, GuessError> {
        if !self.playing {
            return Err(GuessError::NotPlaying);
        }
        let guess = guess.map(str::trim).filter(|g| !g.is_empty()).ok_or(GuessError::Missing)?;

        if self.guesses.contains(guess) {
            return Err(GuessError::Duplicate(guess.to_string()));
        }
        if !guess.chars().all(char::is_alphabetic) {
            return Err(GuessError::NotLetters(guess.to_string()));
        }

        let expected = self.secret_word.chars().count();
        let updated = oracle
            .reveal(&self.secret_word, guess, &self.mask)
            .ok_or(GuessError::WrongLength {
                got: guess.chars().count(),
                expected,
            })?;
        self.guesses.insert(guess.to_string());

        let outcome = if updated != self.mask {
            self.mask = updated;
            if self.mask == self.secret_word {
                self.win()
            } else {
                let line = format!(
                    "Guess successful! Current word: {}, tries remaining: {}",
                    self.mask, self.tries_remaining
                );
                self.respond(line);
                GuessOutcome::Hit
            }
        } else {
            self.tries_remaining = self.tries_remaining.saturating_sub(1);
            if self.tries_remaining == 0 {
                self.lose()
            } else {
                let line = format!(
                    "Guess unsuccessful! Current word: {}, tries remaining: {}",
                    self.mask, self.tries_remaining
                );
                self.respond(line);
                GuessOutcome::Miss
            }
        };

        self.last_result = Some(outcome);
        Ok(outcome)
    }

    /// End the session; the reactor closes the connection once the farewell is flushed
    pub fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        self.playing = false;
        let line = format!("Disconnecting.. Final score: {}", self.score);
        self.respond(line);
    }

    fn win(&mut self) -> GuessOutcome {
        self.score += 1;
        self.playing = false;
        let line = format!(
            "Congratulations, you completed the word: {} with {} tries remaining. Your new score is: {}. Write 'NEWWORD' to play again",
            self.secret_word, self.tries_remaining, self.score
        );
        self.respond(line);
        GuessOutcome::Won
    }

    fn lose(&mut self) -> GuessOutcome {
        self.score -= 1;
        self.playing = false;
        let line = format!(
            "Game over. The correct word was: {}, your new score is: {}. Write 'NEWWORD' to play again",
            self.secret_word, self.score
        );
        self.respond(line);
        GuessOutcome::Lost
    }
}
