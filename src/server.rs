//! Reactor implementation
//!
//! A single-threaded event loop over one `mio::Poll` shared by the
//! listening socket, every accepted connection and a `Waker` that worker
//! threads use to signal finished commands.
//!
//! The loop blocks in `poll` until socket readiness or a [`WorkerEvent`]
//! arrives; worker events are always delivered through the channel before
//! the waker fires. Readiness is edge-triggered, so a connection that still
//! has unread input when its read budget runs out (or whose reads were
//! paused for backpressure) is parked in a ready set and the next poll does
//! not block. Connections closing after DISCONNECT linger half-closed until
//! the peer hangs up or a deadline passes.

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{encode, Command};
use crate::oracle::WordOracle;
use crate::pool::{Notifier, WorkerEvent, WorkerPool};
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use crate::types::ConnectionId;

/// Token of the listening socket
const LISTENER: Token = Token(0);

/// Token of the worker waker
const WAKER: Token = Token(1);

/// First token handed to an accepted connection
const FIRST_CONNECTION: usize = 2;

/// Readiness events processed per poll call
const EVENT_CAPACITY: usize = 1024;

/// Bytes read from a socket per `read` call
const READ_CHUNK: usize = 4096;

/// Chunks read from one connection before yielding to the others
const READ_BUDGET: usize = 16;

/// How long a half-closed connection waits for the peer to close
const LINGER_TIME: Duration = Duration::from_secs(10);

/// Bytes discarded from a half-closed connection before giving up on it
const LINGER_BYTES: usize = 64 * 1024;

/// How a read burst ended
enum ReadStatus {
    /// Socket drained or budget spent, connection still open
    Open,
    /// Peer closed its side
    Eof,
    /// Read failed
    Failed(io::Error),
}

/// Cloneable handle for stopping a running server from another thread
#[derive(Debug, Clone)]
pub struct ServerHandle {
    notifier: Notifier,
}

impl ServerHandle {
    /// Ask the reactor to stop after the current iteration
    pub fn shutdown(&self) -> io::Result<()> {
        self.notifier.notify(WorkerEvent::Shutdown)
    }
}

/// The hangman server reactor
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionRegistry,
    pool: WorkerPool,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    notifier: Notifier,
    /// Connections with input left to read on the next iteration
    ready: HashSet<ConnectionId>,
    /// Half-closed connections in deadline order
    lingering: VecDeque<(Instant, ConnectionId)>,
    running: bool,
}

impl Server {
    /// Bind the listening socket and start the worker pool
    pub fn bind(config: &ServerConfig, oracle: Arc<dyn WordOracle>) -> Result<Self, AppError> {
        let addr = config.listen_addr();
        let poll = Poll::new()?;

        let mut listener = TcpListener::bind(addr).map_err(|source| AppError::Bind { addr, source })?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (sender, events) = mpsc::unbounded_channel();
        let notifier = Notifier::new(sender, waker);
        let pool = WorkerPool::new(config.workers, oracle, notifier.clone())?;

        Ok(Self {
            poll,
            listener,
            connections: ConnectionRegistry::new(FIRST_CONNECTION),
            pool,
            events,
            notifier,
            ready: HashSet::new(),
            lingering: VecDeque::new(),
            running: false,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the server from another thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            notifier: self.notifier.clone(),
        }
    }

    /// Run the event loop until shut down
    ///
    /// Connection failures are handled per connection; only a failing
    /// `poll` ends the loop with an error.
    pub fn run(mut self) -> Result<(), AppError> {
        info!("Hangman server listening on {}", self.local_addr()?);
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        self.running = true;

        while self.running {
            let timeout = self.poll_timeout();
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Poll failed: {}", e);
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => self.drain_worker_events(),
                    token => self.connection_event(ConnectionId::from(token), event),
                }
            }
            self.read_ready();
            self.expire_lingering();
        }

        info!(
            "Hangman server shutting down, closing {} connection(s)",
            self.connections.len()
        );
        for id in self.connections.ids() {
            self.close(id, "server shutdown");
        }
        Ok(())
    }

    /// Don't block while reads are pending, wake up for the next linger deadline
    fn poll_timeout(&self) -> Option<Duration> {
        if !self.ready.is_empty() {
            return Some(Duration::ZERO);
        }
        self.lingering
            .front()
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
    }

    /// Accept every pending connection
    fn accept(&mut self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    return;
                }
            };

            let id = match self.connections.on_accept(stream, peer, self.poll.registry()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Failed to register connection from {}: {}", peer, e);
                    continue;
                }
            };
            info!("{} connected from {}", id, peer);

            if let Some(conn) = self.connections.attachment_for(id) {
                if let Some(session) = conn.session.as_mut() {
                    session.greet();
                    let frame = encode(&session.take_responses());
                    conn.queue(frame);
                }
            }
            self.want_write(id);
        }
    }

    /// Dispatch readiness for one connection
    fn connection_event(&mut self, id: ConnectionId, event: &Event) {
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.read_from(id);
        }
        if event.is_writable() && self.connections.contains(id) {
            self.write_to(id);
        }
    }

    /// Read and submit frames until the socket is drained, the read budget
    /// is spent or the connection has to wait for backpressure to clear
    ///
    /// Frames are taken out of the decoder after every chunk, so an
    /// oversized line is discarded as it arrives instead of piling up.
    fn read_from(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };
        if conn.half_closed {
            return self.linger(id);
        }

        let mut buf = [0u8; READ_CHUNK];
        let mut chunks = 0;
        let status = loop {
            if !self.submit_frames(id) {
                break ReadStatus::Open;
            }
            if chunks == READ_BUDGET {
                self.ready.insert(id);
                break ReadStatus::Open;
            }
            let Some(conn) = self.connections.attachment_for(id) else {
                return;
            };
            match conn.stream.read(&mut buf) {
                Ok(0) => break ReadStatus::Eof,
                Ok(n) => {
                    conn.frames.extend(&buf[..n]);
                    chunks += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break ReadStatus::Open,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break ReadStatus::Failed(e),
            }
        };

        match status {
            ReadStatus::Open => {}
            ReadStatus::Eof => self.close(id, "peer closed connection"),
            ReadStatus::Failed(e) => {
                warn!("Read from {} failed: {}", id, e);
                self.close(id, "read failure");
            }
        }
    }

    /// Hand every buffered frame to the pool
    ///
    /// Returns `false` and pauses reading when the connection's backlog or
    /// outbox is full.
    fn submit_frames(&mut self, id: ConnectionId) -> bool {
        let Some(conn) = self.connections.attachment_for(id) else {
            return false;
        };

        loop {
            if conn.outbox_full() || !self.pool.has_capacity(id) {
                if !conn.read_paused {
                    debug!("{} reads paused, {} command(s) queued", id, self.pool.queued(id));
                    conn.read_paused = true;
                }
                return false;
            }
            let Some(inbound) = conn.frames.next_command() else {
                return true;
            };
            if !conn.accepting_commands {
                debug!("{} ignoring frame after DISCONNECT", id);
                continue;
            }
            if matches!(inbound, Ok(Command::Disconnect)) {
                conn.accepting_commands = false;
            }
            self.pool.submit(id, &mut conn.session, inbound);
        }
    }

    /// Unpause a connection whose backlog and outbox have room again
    fn resume_reads(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };
        if conn.read_paused && !conn.outbox_full() && self.pool.has_capacity(id) {
            debug!("{} reads resumed", id);
            conn.read_paused = false;
            self.ready.insert(id);
        }
    }

    /// Give every parked connection another read turn
    fn read_ready(&mut self) {
        let ids: Vec<ConnectionId> = self.ready.drain().collect();
        for id in ids {
            self.read_from(id);
        }
    }

    /// Flush queued responses
    fn write_to(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };

        match conn.flush() {
            Ok(true) if conn.finished => return self.half_close(id),
            Ok(true) => {
                if let Err(e) = conn.set_interest(self.poll.registry(), Interest::READABLE) {
                    warn!("Failed to update interest for {}: {}", id, e);
                    return self.close(id, "registration failure");
                }
            }
            Ok(false) => debug!("{} socket full, {} byte(s) pending", id, conn.outbox.len()),
            Err(e) => {
                warn!("Write to {} failed: {}", id, e);
                return self.close(id, "write failure");
            }
        }
        self.resume_reads(id);
    }

    /// Shut down the write side once the farewell is out
    ///
    /// The socket stays open for reading so that input the peer sent after
    /// DISCONNECT is consumed instead of turning the close into a reset.
    fn half_close(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };
        if conn.half_closed {
            return;
        }
        conn.half_closed = true;

        if let Err(e) = conn.shutdown_write() {
            debug!("Shutdown of {} failed: {}", id, e);
            return self.close(id, "client disconnected");
        }
        if let Err(e) = conn.set_interest(self.poll.registry(), Interest::READABLE) {
            warn!("Failed to update interest for {}: {}", id, e);
            return self.close(id, "registration failure");
        }
        debug!("{} write side closed, waiting for peer", id);
        self.lingering.push_back((Instant::now() + LINGER_TIME, id));
        self.ready.insert(id);
    }

    /// Discard input on a half-closed connection until the peer closes
    fn linger(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };

        let mut buf = [0u8; READ_CHUNK];
        let status = loop {
            if conn.discarded > LINGER_BYTES {
                break ReadStatus::Eof;
            }
            match conn.stream.read(&mut buf) {
                Ok(0) => break ReadStatus::Eof,
                Ok(n) => conn.discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break ReadStatus::Open,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break ReadStatus::Failed(e),
            }
        };

        match status {
            ReadStatus::Open => {}
            ReadStatus::Eof => self.close(id, "client disconnected"),
            ReadStatus::Failed(e) => {
                debug!("Read from half-closed {} failed: {}", id, e);
                self.close(id, "client disconnected");
            }
        }
    }

    /// Close half-closed connections whose peer never hung up
    fn expire_lingering(&mut self) {
        let now = Instant::now();
        while let Some(&(deadline, id)) = self.lingering.front() {
            if deadline > now {
                break;
            }
            self.lingering.pop_front();
            self.close(id, "linger timeout");
        }
    }

    /// Ask for write readiness on a connection with pending output
    fn want_write(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.attachment_for(id) else {
            return;
        };
        if !conn.has_output() {
            return;
        }
        let interest = Interest::READABLE | Interest::WRITABLE;
        if let Err(e) = conn.set_interest(self.poll.registry(), interest) {
            warn!("Failed to update interest for {}: {}", id, e);
            self.close(id, "registration failure");
        }
    }

    /// Handle everything worker threads have reported since the last wake-up
    fn drain_worker_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                WorkerEvent::Completed { id, session } => self.on_completed(id, session),
                WorkerEvent::Crashed { id } => self.close(id, "command handler crashed"),
                WorkerEvent::Shutdown => self.running = false,
            }
        }
    }

    /// A command finished: frame its responses and start the next one
    fn on_completed(&mut self, id: ConnectionId, mut session: Session) {
        let Some(conn) = self.connections.attachment_for(id) else {
            debug!("Discarding result for closed {}", id);
            return;
        };

        if session.has_responses() {
            conn.queue(encode(&session.take_responses()));
        }
        let finished = session.is_disconnected();
        conn.session = Some(session);

        if finished {
            conn.finished = true;
            self.pool.cancel(id);
        } else {
            self.pool.resume(id, &mut conn.session);
        }

        if conn.finished && !conn.has_output() {
            self.half_close(id);
        } else {
            self.want_write(id);
            self.resume_reads(id);
        }
    }

    /// Release a connection and everything queued for it
    fn close(&mut self, id: ConnectionId, reason: &str) {
        self.pool.cancel(id);
        self.ready.remove(&id);
        if let Some(conn) = self.connections.remove(id, self.poll.registry()) {
            info!("{} ({}) closed: {}", id, conn.peer, reason);
        }
    }
}
