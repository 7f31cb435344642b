//! Error types for the hangman server
//!
//! Defines process-level errors, wire protocol errors and guess errors.
//! Uses thiserror for ergonomic error definitions.
//!
//! Only `AppError` ever reaches the reactor or `main`. Protocol and guess
//! errors are recovered per command and turned into response lines whose
//! text is the error's `Display` output.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
///
/// Startup failures are fatal to the process. I/O errors on an accepted
/// connection are fatal to that connection only.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The listening socket could not be bound (fatal)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The word file could not be read
    #[error("Failed to read word list {}: {source}", path.display())]
    WordList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The word list contains no usable words
    #[error("Word list is empty")]
    EmptyWordList,

    /// The worker pool runtime could not be started
    #[error("Failed to start worker pool: {0}")]
    Runtime(#[source] io::Error),
}

/// Errors produced while decoding an inbound frame
///
/// None of these close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame type is not part of the command vocabulary
    #[error("Malformed command '{0}', expected NEWWORD, GUESS or DISCONNECT")]
    MalformedCommand(String),

    /// The client sent a frame tagged with the server-only RESPONSE type
    #[error("Illegal type - RESPONSE is reserved for server responses")]
    Misuse,

    /// A line grew past the frame size limit without a terminator
    #[error("Frame too long, commands are limited to {limit} bytes")]
    FrameTooLong { limit: usize },
}

/// Rejected guesses
///
/// None of these consume a try.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuessError {
    /// No round is active
    #[error("Not currently playing. Write 'NEWWORD' to start a new game")]
    NotPlaying,

    /// GUESS frame without a body
    #[error("Invalid guess, write GUESS##<letter or word>")]
    Missing,

    /// Guess already made this round
    #[error("Duplicate guess '{0}', try a new letter or word")]
    Duplicate(String),

    /// Guess contains something other than letters
    #[error("Invalid guess '{0}', please only use letters when guessing")]
    NotLetters(String),

    /// Guess is neither a single letter nor the length of the word
    #[error("Invalid guess, either guess a letter or the entire word ({expected} letters), got {got}")]
    WrongLength { got: usize, expected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = AppError::Bind {
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:8080"));
    }

    #[test]
    fn test_guess_error_mentions_duplicate() {
        let msg = GuessError::Duplicate("a".to_string()).to_string();
        assert!(msg.to_lowercase().contains("duplicate guess"));
    }

    #[test]
    fn test_not_playing_message() {
        let msg = GuessError::NotPlaying.to_string();
        assert!(msg.to_lowercase().contains("not currently playing"));
    }
}
