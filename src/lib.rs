//! Multi-player Hangman Server Library
//!
//! A TCP hangman server: every connected player runs an independent game
//! through short text commands.
//!
//! # Protocol
//! One frame per line, `TYPE##BODY`:
//! - `NEWWORD##` starts a round
//! - `GUESS##<letter or word>` makes a guess
//! - `DISCONNECT##` ends the session
//!
//! Every reply is a single `RESPONSE##<text>` frame whose text may span
//! several lines.
//!
//! # Architecture
//! - `Server` is a single-threaded `mio` reactor owning every socket
//! - `WorkerPool` runs game logic on a tokio runtime, one command per
//!   connection at a time
//! - Sessions move between reactor and worker by value, and finished
//!   commands come back as `WorkerEvent`s over a channel plus a poll wake-up
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use hangman_server::{Server, ServerConfig, WordList};
//!
//! fn main() -> Result<(), hangman_server::AppError> {
//!     let config = ServerConfig::default();
//!     let server = Server::bind(&config, Arc::new(WordList::builtin()))?;
//!     server.run()
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod oracle;
pub mod pool;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{AppError, GuessError, ProtocolError};
pub use message::{decode, encode, Command, FrameDecoder, MessageType};
pub use oracle::{WordList, WordOracle};
pub use pool::{WorkerEvent, WorkerPool};
pub use registry::{Connection, ConnectionRegistry};
pub use server::{Server, ServerHandle};
pub use session::{GuessOutcome, RoundState, Session};
pub use types::ConnectionId;
