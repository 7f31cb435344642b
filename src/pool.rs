//! Worker pool
//!
//! Executes command handling on a tokio runtime so that game logic never
//! runs on the reactor thread. At most one command per connection is in
//! flight: the session itself is moved into the job, and commands arriving
//! while it is away wait in that connection's backlog.
//!
//! Finished jobs hand the session back through a [`Notifier`], which pushes
//! a [`WorkerEvent`] onto a channel and wakes the reactor's blocked poll.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use mio::Waker;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::AppError;
use crate::handler::{handle_inbound, Inbound};
use crate::oracle::WordOracle;
use crate::session::Session;
use crate::types::ConnectionId;

/// Commands a connection may have waiting behind its in-flight one
pub const MAX_BACKLOG: usize = 32;

/// Messages from worker threads (and shutdown handles) to the reactor
#[derive(Debug)]
pub enum WorkerEvent {
    /// A command finished; the session comes back with its new responses
    Completed { id: ConnectionId, session: Session },
    /// A command panicked; the session is lost
    Crashed { id: ConnectionId },
    /// Stop the reactor loop
    Shutdown,
}

/// Sends events to the reactor and wakes it
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<WorkerEvent>,
    waker: Arc<Waker>,
}

impl Notifier {
    pub fn new(sender: mpsc::UnboundedSender<WorkerEvent>, waker: Arc<Waker>) -> Self {
        Self { sender, waker }
    }

    /// Deliver an event, then wake the reactor
    ///
    /// Fails only if the reactor is gone.
    pub fn notify(&self, event: WorkerEvent) -> io::Result<()> {
        self.sender
            .send(event)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "reactor closed"))?;
        self.waker.wake()
    }
}

/// Runs session commands off the reactor thread
pub struct WorkerPool {
    runtime: Runtime,
    oracle: Arc<dyn WordOracle>,
    notifier: Notifier,
    /// Commands waiting for their connection's in-flight job to finish
    backlog: HashMap<ConnectionId, VecDeque<Inbound>>,
}

impl WorkerPool {
    /// Start a pool with `workers` threads
    pub fn new(workers: usize, oracle: Arc<dyn WordOracle>, notifier: Notifier) -> Result<Self, AppError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("hangman-worker")
            .build()
            .map_err(AppError::Runtime)?;

        Ok(Self {
            runtime,
            oracle,
            notifier,
            backlog: HashMap::new(),
        })
    }

    /// Submit a command for a connection
    ///
    /// Runs immediately if the session is in `slot`, otherwise queues
    /// behind the command currently in flight. Returns `false` once the
    /// backlog has reached [`MAX_BACKLOG`]; the caller must stop submitting
    /// for `id` until [`has_capacity`](Self::has_capacity) is true again.
    pub fn submit(&mut self, id: ConnectionId, slot: &mut Option<Session>, inbound: Inbound) -> bool {
        match slot.take() {
            Some(session) => self.spawn(id, session, inbound),
            None => {
                let queue = self.backlog.entry(id).or_default();
                queue.push_back(inbound);
                debug!("{} busy, {} command(s) queued", id, queue.len());
            }
        }
        self.has_capacity(id)
    }

    /// Start the next queued command once the session is back in `slot`
    pub fn resume(&mut self, id: ConnectionId, slot: &mut Option<Session>) {
        let Some(queue) = self.backlog.get_mut(&id) else {
            return;
        };
        let Some(inbound) = queue.pop_front() else {
            self.backlog.remove(&id);
            return;
        };
        if queue.is_empty() {
            self.backlog.remove(&id);
        }

        match slot.take() {
            Some(session) => self.spawn(id, session, inbound),
            None => self.backlog.entry(id).or_default().push_front(inbound),
        }
    }

    /// Drop every queued command for a closed connection
    pub fn cancel(&mut self, id: ConnectionId) {
        if let Some(queue) = self.backlog.remove(&id) {
            debug!("Discarded {} queued command(s) for {}", queue.len(), id);
        }
    }

    /// Number of commands waiting behind the in-flight one
    pub fn queued(&self, id: ConnectionId) -> usize {
        self.backlog.get(&id).map_or(0, VecDeque::len)
    }

    /// True while `id` may submit another command
    pub fn has_capacity(&self, id: ConnectionId) -> bool {
        self.queued(id) < MAX_BACKLOG
    }

    fn spawn(&self, id: ConnectionId, mut session: Session, inbound: Inbound) {
        let oracle = Arc::clone(&self.oracle);
        let notifier = self.notifier.clone();

        self.runtime.spawn(async move {
            let result = panic::catch_unwind(AssertUnwindSafe(move || {
                handle_inbound(id, &mut session, oracle.as_ref(), inbound);
                session
            }));

            let event = match result {
                Ok(session) => WorkerEvent::Completed { id, session },
                Err(_) => {
                    error!("Command handler for {} panicked", id);
                    WorkerEvent::Crashed { id }
                }
            };

            if let Err(e) = notifier.notify(event) {
                debug!("Result for {} dropped: {}", id, e);
            }
        });
    }
}
