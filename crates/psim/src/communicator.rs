//! Channel matrix and point-to-point transport.
//!
//! A [`Communicator`] owns one rendezvous channel for every ordered pair of
//! ranks, `pipe[sender][receiver]`. Each channel has capacity zero: a send
//! blocks until the matching receive takes the message, and vice versa.
//! Ordering between a fixed pair of ranks follows from that hand-off; there
//! is no ordering across different pairs.
//!
//! Every operation validates the rank range and the topology before it
//! touches a channel. A rejected operation returns an error immediately and
//! never blocks.
//!
//! [`Communicator::close`] shuts the whole matrix down: operations blocked
//! on a rendezvous wake with [`PsimError::Disconnected`], and every later
//! operation fails the same way.

use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TryRecvError, select};

use crate::config::check_processes;
use crate::topology::Topology;
use crate::{PsimError, Result};

/// What travels through a channel cell.
pub(crate) enum Envelope<T> {
    Value(T),
    Sequence(Vec<T>),
    /// Content-free synchronization token.
    Signal,
}

impl<T> Envelope<T> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Sequence(_) => "sequence",
            Self::Signal => "signal",
        }
    }
}

/// One directed channel cell.
struct Pipe<T> {
    tx: Sender<Envelope<T>>,
    rx: Receiver<Envelope<T>>,
}

impl<T> Pipe<T> {
    fn rendezvous() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self { tx, rx }
    }
}

/// Process count, topology, and the `P × P` channel matrix of one run.
///
/// Shared by every worker. Only channel contents and the closed state
/// change, and channel access is the sole synchronization point.
pub struct Communicator<T> {
    processes: usize,
    topology: Topology,
    /// Row-major: `pipes[from * processes + to]`.
    pipes: Vec<Pipe<T>>,
    /// Never sent on; dropping it disconnects `closed`.
    closer: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

impl<T: Send> Communicator<T> {
    /// Allocates the full channel matrix, whatever the topology.
    pub fn new(processes: usize, topology: Topology) -> Result<Self> {
        check_processes(processes)?;

        let pipes = (0..processes * processes)
            .map(|_| Pipe::rendezvous())
            .collect();
        let (closer, closed) = crossbeam_channel::bounded(0);

        Ok(Self {
            processes,
            topology,
            pipes,
            closer: Mutex::new(Some(closer)),
            closed,
        })
    }

    /// Number of simulated processes.
    pub fn processes(&self) -> usize {
        self.processes
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Closes every channel. Blocked and future sends and receives return
    /// [`PsimError::Disconnected`]. Closing twice is a no-op.
    pub fn close(&self) {
        let closer = self
            .closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closer.is_some() {
            tracing::debug!(processes = self.processes, "channel matrix closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.closed.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Returns true if `from` may send to `to`: both in range and adjacent.
    pub fn can_send(&self, from: usize, to: usize) -> bool {
        from < self.processes && to < self.processes && self.topology.is_adjacent(from, to)
    }

    /// Sends `payload` from rank `from` to rank `to`, blocking until `to`
    /// receives it.
    pub fn send(&self, from: usize, to: usize, payload: T) -> Result<()> {
        self.send_envelope(from, to, Envelope::Value(payload))
    }

    /// Blocks rank `at` until a value from rank `from` arrives.
    pub fn receive(&self, at: usize, from: usize) -> Result<T> {
        match self.receive_envelope(at, from)? {
            Envelope::Value(payload) => Ok(payload),
            other => Err(unexpected(from, at, "value", &other)),
        }
    }

    /// Sends a whole sequence as one message.
    pub fn send_sequence(&self, from: usize, to: usize, sequence: Vec<T>) -> Result<()> {
        self.send_envelope(from, to, Envelope::Sequence(sequence))
    }

    /// Receives a sequence sent with [`send_sequence`](Self::send_sequence).
    pub fn receive_sequence(&self, at: usize, from: usize) -> Result<Vec<T>> {
        match self.receive_envelope(at, from)? {
            Envelope::Sequence(sequence) => Ok(sequence),
            other => Err(unexpected(from, at, "sequence", &other)),
        }
    }

    pub(crate) fn send_signal(&self, from: usize, to: usize) -> Result<()> {
        self.send_envelope(from, to, Envelope::Signal)
    }

    pub(crate) fn receive_signal(&self, at: usize, from: usize) -> Result<()> {
        match self.receive_envelope(at, from)? {
            Envelope::Signal => Ok(()),
            other => Err(unexpected(from, at, "signal", &other)),
        }
    }

    pub(crate) fn check_rank(&self, rank: usize) -> Result<()> {
        if rank >= self.processes {
            tracing::warn!(rank, processes = self.processes, "rank out of range");
            return Err(PsimError::RankOutOfRange {
                rank,
                processes: self.processes,
            });
        }
        Ok(())
    }

    /// Validates the directed link `from -> to` against range and topology.
    pub(crate) fn check_link(&self, from: usize, to: usize) -> Result<()> {
        self.check_rank(from)?;
        self.check_rank(to)?;
        if !self.topology.is_adjacent(from, to) {
            tracing::warn!(from, to, topology = ?self.topology, "topology violation");
            return Err(PsimError::TopologyViolation { from, to });
        }
        Ok(())
    }

    fn pipe(&self, from: usize, to: usize) -> &Pipe<T> {
        &self.pipes[from * self.processes + to]
    }

    fn check_open(&self, from: usize, to: usize) -> Result<()> {
        if self.is_closed() {
            return Err(disconnected(from, to));
        }
        Ok(())
    }

    fn send_envelope(&self, from: usize, to: usize, envelope: Envelope<T>) -> Result<()> {
        self.check_link(from, to)?;
        self.check_open(from, to)?;
        let kind = envelope.kind();
        let pipe = self.pipe(from, to);
        select! {
            send(pipe.tx, envelope) -> sent => sent.map_err(|_| disconnected(from, to))?,
            recv(self.closed) -> _ => return Err(disconnected(from, to)),
        }
        tracing::trace!(from, to, kind, "delivered");
        Ok(())
    }

    fn receive_envelope(&self, at: usize, from: usize) -> Result<Envelope<T>> {
        self.check_link(from, at)?;
        self.check_open(from, at)?;
        let pipe = self.pipe(from, at);
        let envelope = select! {
            recv(pipe.rx) -> received => received.map_err(|_| disconnected(from, at))?,
            recv(self.closed) -> _ => return Err(disconnected(from, at)),
        };
        tracing::trace!(from, to = at, kind = envelope.kind(), "received");
        Ok(envelope)
    }
}

fn disconnected(from: usize, to: usize) -> PsimError {
    tracing::debug!(from, to, "channel closed");
    PsimError::Disconnected { from, to }
}

fn unexpected<T>(
    from: usize,
    to: usize,
    expected: &'static str,
    found: &Envelope<T>,
) -> PsimError {
    tracing::warn!(from, to, expected, found = found.kind(), "unexpected payload kind");
    PsimError::UnexpectedPayload {
        from,
        to,
        expected,
        found: found.kind(),
    }
}

impl<T: Send> std::fmt::Debug for Communicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("processes", &self.processes)
            .field("topology", &self.topology)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
