//! Basic type definitions for the hangman server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: reactor-assigned identifier of one accepted connection

use mio::Token;

/// Unique connection identifier (newtype pattern)
///
/// Doubles as the `mio::Token` the connection is registered under.
/// Ids are handed out from a monotonically increasing counter and never
/// reused, so a worker result for a closed connection cannot be delivered
/// to a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

impl ConnectionId {
    /// The readiness token this connection is registered with
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl From<Token> for ConnectionId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}
