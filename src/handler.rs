//! Command handler
//!
//! Runs on a worker thread. Applies one decoded inbound frame to a
//! session and turns every per-command failure into a response line, so
//! nothing below the connection level ever escapes to the reactor.

use tracing::debug;

use crate::error::ProtocolError;
use crate::message::Command;
use crate::oracle::WordOracle;
use crate::session::Session;
use crate::types::ConnectionId;

/// One decoded frame, or the reason it could not be decoded
pub type Inbound = Result<Command, ProtocolError>;

/// Handle a single inbound frame for `session`
pub fn handle_inbound(
    id: ConnectionId,
    session: &mut Session,
    oracle: &dyn WordOracle,
    inbound: Inbound,
) {
    if session.is_disconnected() {
        debug!("Dropping frame for {} after disconnect", id);
        return;
    }

    match inbound {
        Ok(command) => handle_command(id, session, oracle, command),
        Err(e) => {
            debug!("Protocol error from {}: {}", id, e);
            session.respond(e.to_string());
        }
    }
}

/// Process a single command
fn handle_command(
    id: ConnectionId,
    session: &mut Session,
    oracle: &dyn WordOracle,
    command: Command,
) {
    debug!("{} -> {}", id, command.message_type());
    match command {
        Command::NewWord => {
            session.new_word(oracle);
        }
        Command::Guess(guess) => {
            if let Err(e) = session.guess(oracle, guess.as_deref()) {
                session.respond(e.to_string());
            }
        }
        Command::Disconnect => session.disconnect(),
        Command::Response(_) => session.respond(ProtocolError::Misuse.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::decode;
    use crate::session::tests::FixedWord;

    const ID: ConnectionId = ConnectionId(2);

    fn run(session: &mut Session, frame: &str) -> Vec<String> {
        handle_inbound(ID, session, &FixedWord("cat"), decode(frame.as_bytes()));
        session.take_responses()
    }

    #[test]
    fn test_malformed_command_is_reported() {
        let mut session = Session::new();
        let responses = run(&mut session, "DANCE##now");
        assert_eq!(responses.len(), 1);
        assert!(responses[0].starts_with("Malformed command 'DANCE'"));
        assert!(!session.is_disconnected());
    }

    #[test]
    fn test_response_type_is_misuse() {
        let mut session = Session::new();
        let responses = run(&mut session, "RESPONSE##hello");
        assert!(responses[0].contains("reserved for server responses"));
    }

    #[test]
    fn test_guess_before_new_word() {
        let mut session = Session::new();
        let responses = run(&mut session, "GUESS##a");
        assert!(responses[0].starts_with("Not currently playing"));
    }

    #[test]
    fn test_full_round() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, "NEWWORD##").len(), 2);
        assert!(run(&mut session, "GUESS##z")[0].contains("tries remaining: 2"));
        assert!(run(&mut session, "guess##A")[0].contains("-a-"));
        assert!(run(&mut session, "GUESS##a")[0].starts_with("Duplicate guess"));
        assert!(run(&mut session, "GUESS##CAT")[0].contains("new score is: 1"));
    }

    #[test]
    fn test_nothing_after_disconnect() {
        let mut session = Session::new();
        assert_eq!(run(&mut session, "DISCONNECT##").len(), 1);
        assert!(session.is_disconnected());
        assert!(run(&mut session, "NEWWORD##").is_empty());
        assert!(!session.is_playing());
    }
}
