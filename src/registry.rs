//! Connection registry
//!
//! Maps every live connection id to its socket, buffers and session.
//! Only the reactor thread touches the registry.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};

use mio::net::TcpStream;
use mio::{Interest, Registry};
use tracing::debug;

use crate::message::FrameDecoder;
use crate::session::Session;
use crate::types::ConnectionId;

/// Outbox size at which the reactor stops reading from a connection
pub const MAX_OUTBOX: usize = 64 * 1024;

/// One accepted connection
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub stream: TcpStream,
    /// Inbound bytes waiting for a complete frame
    pub frames: FrameDecoder,
    /// Encoded response frames not yet written
    pub outbox: Vec<u8>,
    /// `None` while a worker is executing a command for this connection
    pub session: Option<Session>,
    /// Cleared once a DISCONNECT frame has been read
    pub accepting_commands: bool,
    /// Set once the session has processed DISCONNECT
    pub finished: bool,
    /// Reads suspended until the backlog or outbox drains
    pub read_paused: bool,
    /// Write side shut down after the farewell, waiting for the peer's EOF
    pub half_closed: bool,
    /// Bytes thrown away while half-closed
    pub discarded: usize,
    interest: Interest,
}

impl Connection {
    fn new(id: ConnectionId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            stream,
            frames: FrameDecoder::new(),
            outbox: Vec::new(),
            session: Some(Session::new()),
            accepting_commands: true,
            finished: false,
            read_paused: false,
            half_closed: false,
            discarded: 0,
            interest: Interest::READABLE,
        }
    }

    /// True while a command for this connection is executing
    pub fn in_flight(&self) -> bool {
        self.session.is_none()
    }

    /// Append an encoded frame to the outbox
    pub fn queue(&mut self, frame: Vec<u8>) {
        self.outbox.extend_from_slice(&frame);
    }

    pub fn has_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// True when the peer is not reading its responses fast enough
    pub fn outbox_full(&self) -> bool {
        self.outbox.len() >= MAX_OUTBOX
    }

    /// Send FIN after the last response, keeping the read side open
    pub fn shutdown_write(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Write) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    /// Write as much of the outbox as the socket accepts
    ///
    /// Returns `Ok(true)` once the outbox is empty, `Ok(false)` if the
    /// socket stopped accepting data first.
    pub fn flush(&mut self) -> io::Result<bool> {
        let mut written = 0;
        let result = loop {
            if written == self.outbox.len() {
                break Ok(true);
            }
            match self.stream.write(&self.outbox[written..]) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.outbox.drain(..written);
        result
    }

    /// Change the readiness interest, if it differs from the current one
    pub fn set_interest(&mut self, registry: &Registry, interest: Interest) -> io::Result<()> {
        if self.interest == interest {
            return Ok(());
        }
        registry.reregister(&mut self.stream, self.id.token(), interest)?;
        debug!("{} interest -> {:?}", self.id, interest);
        self.interest = interest;
        Ok(())
    }
}

/// All live connections, keyed by id
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_id: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry handing out ids from `first_id` upward
    pub fn new(first_id: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: first_id,
        }
    }

    /// Register an accepted stream for reads and attach a fresh session
    pub fn on_accept(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
        registry: &Registry,
    ) -> io::Result<ConnectionId> {
        let id = ConnectionId(self.next_id);
        registry.register(&mut stream, id.token(), Interest::READABLE)?;
        self.next_id += 1;

        self.connections.insert(id, Connection::new(id, stream, peer));
        debug!("Total connections: {}", self.connections.len());
        Ok(id)
    }

    /// The connection (and its session slot) for `id`
    pub fn attachment_for(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Deregister and drop a connection
    ///
    /// Idempotent: removing an unknown or already removed id returns `None`.
    pub fn remove(&mut self, id: ConnectionId, registry: &Registry) -> Option<Connection> {
        let mut conn = self.connections.remove(&id)?;
        if let Err(e) = registry.deregister(&mut conn.stream) {
            debug!("Deregister of {} failed: {}", id, e);
        }
        debug!("Total connections: {}", self.connections.len());
        Some(conn)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of every live connection
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;
    use mio::Poll;
    use std::time::Duration;

    /// Accept one loopback connection through a real listener
    fn accepted_pair(listener: &TcpListener) -> (TcpStream, SocketAddr, std::net::TcpStream) {
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        for _ in 0..200 {
            match listener.accept() {
                Ok((stream, peer)) => return (stream, peer, client),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        }
        panic!("no connection accepted");
    }

    #[test]
    fn test_accept_assigns_fresh_session() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (stream, peer, _client) = accepted_pair(&listener);
        let id = registry.on_accept(stream, peer, poll.registry()).unwrap();
        assert_eq!(id, ConnectionId(2));

        let conn = registry.attachment_for(id).unwrap();
        let session = conn.session.as_ref().unwrap();
        assert!(!session.is_playing());
        assert_eq!(session.score(), 0);
        assert!(!conn.in_flight());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (stream, peer, _c1) = accepted_pair(&listener);
        let first = registry.on_accept(stream, peer, poll.registry()).unwrap();
        registry.remove(first, poll.registry());

        let (stream, peer, _c2) = accepted_pair(&listener);
        let second = registry.on_accept(stream, peer, poll.registry()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_outbox_limit() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (stream, peer, _client) = accepted_pair(&listener);
        let id = registry.on_accept(stream, peer, poll.registry()).unwrap();
        let conn = registry.attachment_for(id).unwrap();

        conn.queue(vec![b'a'; MAX_OUTBOX - 1]);
        assert!(!conn.outbox_full());
        conn.queue(vec![b'\n']);
        assert!(conn.outbox_full());
    }

    #[test]
    fn test_shutdown_write_sends_eof() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (stream, peer, mut client) = accepted_pair(&listener);
        let id = registry.on_accept(stream, peer, poll.registry()).unwrap();
        registry.attachment_for(id).unwrap().shutdown_write().unwrap();

        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(std::io::Read::read(&mut client, &mut buf).unwrap(), 0);
        assert!(registry.contains(id));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (stream, peer, _client) = accepted_pair(&listener);
        let id = registry.on_accept(stream, peer, poll.registry()).unwrap();

        assert!(registry.remove(id, poll.registry()).is_some());
        assert!(registry.remove(id, poll.registry()).is_none());
        assert!(registry.is_empty());
        assert!(registry.attachment_for(id).is_none());
    }
}
