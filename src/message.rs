//! Wire protocol definitions
//!
//! Text frames of the form `TYPE##BODY`, one per line. Inbound frames carry
//! a command, outbound frames always carry the `RESPONSE` type.
//!
//! TCP gives no message boundaries, so [`FrameDecoder`] buffers bytes until a
//! full line has arrived and only then hands it to [`decode`].

use std::str::FromStr;

use crate::error::ProtocolError;

/// Separates the message type from the message body
pub const DELIMITER: &str = "##";

/// Terminates every frame on the wire
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Longest inbound line accepted, excluding the terminator
pub const MAX_FRAME_LEN: usize = 1024;

/// Message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Start a new round
    NewWord,
    /// Guess a letter or the whole word
    Guess,
    /// Close the connection
    Disconnect,
    /// Server to client response (never valid inbound)
    Response,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::NewWord => "NEWWORD",
            MessageType::Guess => "GUESS",
            MessageType::Disconnect => "DISCONNECT",
            MessageType::Response => "RESPONSE",
        }
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    /// Case-insensitive match against the vocabulary
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        [
            MessageType::NewWord,
            MessageType::Guess,
            MessageType::Disconnect,
            MessageType::Response,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(tag))
        .ok_or_else(|| ProtocolError::MalformedCommand(tag.to_string()))
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → Server command, decoded from one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a new round
    NewWord,
    /// Guess, body already trimmed and lower-cased
    Guess(Option<String>),
    /// End the session
    Disconnect,
    /// RESPONSE-tagged inbound frame, rejected by the session
    Response(Option<String>),
}

impl Command {
    pub fn message_type(&self) -> MessageType {
        match self {
            Command::NewWord => MessageType::NewWord,
            Command::Guess(_) => MessageType::Guess,
            Command::Disconnect => MessageType::Disconnect,
            Command::Response(_) => MessageType::Response,
        }
    }
}

/// Decode one frame (without its line terminator)
pub fn decode(frame: &[u8]) -> Result<Command, ProtocolError> {
    let text = String::from_utf8_lossy(frame);
    let (tag, body) = match text.split_once(DELIMITER) {
        Some((tag, body)) => (tag, Some(body)),
        None => (&*text, None),
    };

    let body = body
        .map(|b| b.trim().to_lowercase())
        .filter(|b| !b.is_empty());

    Ok(match tag.parse::<MessageType>()? {
        MessageType::NewWord => Command::NewWord,
        MessageType::Guess => Command::Guess(body),
        MessageType::Disconnect => Command::Disconnect,
        MessageType::Response => Command::Response(body),
    })
}

/// Encode queued responses into a single outbound frame
///
/// Lines are joined with newlines into one body so a multi-line response
/// is written as one contiguous frame. No responses encode to no bytes.
pub fn encode<S: AsRef<str>>(responses: &[S]) -> Vec<u8> {
    if responses.is_empty() {
        return Vec::new();
    }

    let body = responses
        .iter()
        .map(|line| line.as_ref())
        .collect::<Vec<&str>>()
        .join("\n");

    let tag = MessageType::Response.as_str();
    let mut frame = Vec::with_capacity(tag.len() + DELIMITER.len() + body.len() + 1);
    frame.extend_from_slice(tag.as_bytes());
    frame.extend_from_slice(DELIMITER.as_bytes());
    frame.extend_from_slice(body.as_bytes());
    frame.push(FRAME_TERMINATOR);
    frame
}

/// Reassembles newline-terminated frames from arbitrary read chunks
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Dropping the remainder of an oversized line
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for a terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete frame, if one has fully arrived
    ///
    /// An oversized line is reported once as `FrameTooLong`, then skipped up
    /// to and including its terminator.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, ProtocolError>> {
        loop {
            match self.buffer.iter().position(|&b| b == FRAME_TERMINATOR) {
                Some(pos) => {
                    let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                    line.pop();
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.len() > MAX_FRAME_LEN {
                        return Some(Err(ProtocolError::FrameTooLong {
                            limit: MAX_FRAME_LEN,
                        }));
                    }
                    return Some(Ok(line));
                }
                None if self.buffer.len() > MAX_FRAME_LEN => {
                    self.buffer.clear();
                    if self.discarding {
                        return None;
                    }
                    self.discarding = true;
                    return Some(Err(ProtocolError::FrameTooLong {
                        limit: MAX_FRAME_LEN,
                    }));
                }
                None => return None,
            }
        }
    }

    /// Next complete frame decoded into a command
    pub fn next_command(&mut self) -> Option<Result<Command, ProtocolError>> {
        self.next_frame()
            .map(|frame| frame.and_then(|bytes| decode(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_case_insensitive() {
        assert_eq!(decode(b"newword##").unwrap(), Command::NewWord);
        assert_eq!(decode(b"NewWord").unwrap(), Command::NewWord);
        assert_eq!(decode(b"DISCONNECT##").unwrap(), Command::Disconnect);
    }

    #[test]
    fn test_decode_guess_body_normalised() {
        assert_eq!(
            decode(b"GUESS##  CaT ").unwrap(),
            Command::Guess(Some("cat".to_string()))
        );
        assert_eq!(decode(b"guess##").unwrap(), Command::Guess(None));
        assert_eq!(decode(b"GUESS").unwrap(), Command::Guess(None));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode(b"JUMP##high").unwrap_err();
        assert_eq!(err, ProtocolError::MalformedCommand("JUMP".to_string()));
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_response_is_a_command() {
        assert_eq!(
            decode(b"RESPONSE##hi").unwrap(),
            Command::Response(Some("hi".to_string()))
        );
    }

    #[test]
    fn test_encode_joins_lines() {
        let frame = encode(&["a", "b"]);
        assert_eq!(frame, b"RESPONSE##a\nb\n");

        let text = String::from_utf8(frame).unwrap();
        let (tag, body) = text.trim_end_matches('\n').split_once(DELIMITER).unwrap();
        assert_eq!(tag, "RESPONSE");
        assert_eq!(body, "a\nb");
    }

    #[test]
    fn test_encode_nothing() {
        let empty: [&str; 0] = [];
        assert!(encode(&empty).is_empty());
    }

    #[test]
    fn test_partial_frames_are_buffered() {
        let mut frames = FrameDecoder::new();
        frames.extend(b"GUE");
        assert!(frames.next_command().is_none());
        frames.extend(b"SS##a");
        assert!(frames.next_command().is_none());
        assert_eq!(frames.buffered(), 8);

        frames.extend(b"\r\nNEWWORD##\nDISC");
        assert_eq!(
            frames.next_command().unwrap().unwrap(),
            Command::Guess(Some("a".to_string()))
        );
        assert_eq!(frames.next_command().unwrap().unwrap(), Command::NewWord);
        assert!(frames.next_command().is_none());
        assert_eq!(frames.buffered(), 4);
    }

    #[test]
    fn test_oversized_line_reported_once() {
        let mut frames = FrameDecoder::new();
        frames.extend(&vec![b'x'; MAX_FRAME_LEN + 10]);
        assert_eq!(
            frames.next_frame().unwrap().unwrap_err(),
            ProtocolError::FrameTooLong { limit: MAX_FRAME_LEN }
        );

        frames.extend(&vec![b'x'; MAX_FRAME_LEN + 10]);
        assert!(frames.next_frame().is_none());

        frames.extend(b"xxx\nNEWWORD\n");
        assert_eq!(frames.next_command().unwrap().unwrap(), Command::NewWord);
    }
}
