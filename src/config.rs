//! Server configuration
//!
//! The listen port comes from the first command line argument. Worker
//! count and word file can be overridden through the environment.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::thread;

use tracing::warn;

/// Port used when none (or an invalid one) is given
pub const DEFAULT_PORT: u16 = 8080;

/// Env var holding the worker thread count
pub const WORKERS_ENV: &str = "HANGMAN_WORKERS";

/// Env var holding the path of a newline-separated word file
pub const WORDS_ENV: &str = "HANGMAN_WORDS";

/// Runtime settings for the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to listen on
    pub host: IpAddr,
    /// TCP port to listen on (0 picks a free port)
    pub port: u16,
    /// Worker pool threads
    pub workers: usize,
    /// Word file, builtin table when absent
    pub words_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            workers: default_workers(),
            words_path: None,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from process arguments and environment
    pub fn from_env() -> Self {
        let mut config = Self {
            port: parse_port(env::args().nth(1).as_deref()),
            ..Self::default()
        };

        if let Ok(raw) = env::var(WORKERS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.workers = n,
                _ => warn!("Ignoring invalid {}='{}'", WORKERS_ENV, raw),
            }
        }
        if let Some(path) = env::var_os(WORDS_ENV) {
            config.words_path = Some(PathBuf::from(path));
        }

        config
    }

    /// Loopback-only configuration on an OS-assigned port
    pub fn local() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Self::default()
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parse the port argument, falling back to [`DEFAULT_PORT`]
///
/// Port 0 is rejected: it would bind an ephemeral port no client knows.
pub fn parse_port(arg: Option<&str>) -> u16 {
    let Some(arg) = arg else {
        return DEFAULT_PORT;
    };
    match arg.trim().parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => {
            warn!(
                "Error when parsing port number '{}', using default value: {}",
                arg, DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map_or(4, |n| n.get())
}
