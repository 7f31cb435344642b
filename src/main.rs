//! Hangman Server - Entry Point
//!
//! Loads the word list, binds the listener and runs the reactor.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hangman_server::{AppError, Server, ServerConfig, WordList, WordOracle};

fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=hangman_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hangman_server=info")),
        )
        .init();

    match run(ServerConfig::from_env()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig) -> Result<(), AppError> {
    let words = match &config.words_path {
        Some(path) => WordList::from_file(path)?,
        None => WordList::builtin(),
    };
    let oracle: Arc<dyn WordOracle> = Arc::new(words);

    let server = Server::bind(&config, oracle)?;
    info!("Worker pool started with {} thread(s)", config.workers);

    server.run()
}
