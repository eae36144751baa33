//! Collective operations built on point-to-point transport.
//!
//! Every rank calls the same collective with the same `root`; behaviour
//! branches on whether the caller is the root. All collectives are
//! star-shaped around the root, so each one first checks, locally and
//! without touching a channel, that the root is adjacent to every other
//! rank in the direction the pattern needs. The check gives the same
//! answer on every rank, so an illegal pattern fails everywhere instead of
//! leaving the adjacent ranks blocked.
//!
//! Fold and partition orders are fixed:
//!
//! - reduce seeds with the root's payload and folds the others in
//!   ascending rank order, `acc = op(acc, payload[i])`
//! - scatter cuts chunks of `ceil(len / P)` elements; rank `i` gets chunk `i`

use std::ops::Range;

use crate::communicator::Communicator;
use crate::{PsimError, Result};

/// Rank that anchors the all-to-all operations and the barrier.
pub const ANCHOR_RANK: usize = 0;

/// Direction of the messages a star-shaped collective exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Root to every other rank.
    Fanout,
    /// Every other rank to root.
    Fanin,
    /// Fan-in followed by fan-out.
    Both,
}

impl<T: Send> Communicator<T> {
    /// One-to-all broadcast: `root` sends `payload` to every other rank.
    /// Every rank returns the root's payload; non-root ranks ignore their
    /// own `payload` argument.
    pub fn one_to_all_broadcast(&self, rank: usize, root: usize, payload: T) -> Result<T>
    where
        T: Clone,
    {
        self.check_pattern(rank, root, Flow::Fanout)?;
        tracing::debug!(rank, root, "one-to-all broadcast");
        if rank == root {
            self.fan_out(root, payload)
        } else {
            self.receive(rank, root)
        }
    }

    /// All-to-one collect: the root returns every rank's payload indexed
    /// by rank; other ranks return `None`.
    pub fn all_to_one_collect(
        &self,
        rank: usize,
        root: usize,
        payload: T,
    ) -> Result<Option<Vec<T>>> {
        self.check_pattern(rank, root, Flow::Fanin)?;
        tracing::debug!(rank, root, "all-to-one collect");
        self.collect_values(rank, root, payload)
    }

    /// All-to-one gather: like collect, but every rank contributes a chunk
    /// and the root returns the chunks concatenated in rank order. Undoes
    /// [`one_to_all_scatter`](Self::one_to_all_scatter).
    pub fn all_to_one_gather(
        &self,
        rank: usize,
        root: usize,
        chunk: Vec<T>,
    ) -> Result<Option<Vec<T>>> {
        self.check_pattern(rank, root, Flow::Fanin)?;
        tracing::debug!(rank, root, len = chunk.len(), "all-to-one gather");

        if rank != root {
            self.send_sequence(rank, root, chunk)?;
            return Ok(None);
        }

        let mut gathered = Vec::new();
        for peer in 0..root {
            gathered.extend(self.receive_sequence(root, peer)?);
        }
        gathered.extend(chunk);
        for peer in root + 1..self.processes() {
            gathered.extend(self.receive_sequence(root, peer)?);
        }
        Ok(Some(gathered))
    }

    /// All-to-one reduce. The root returns `op` folded over all payloads;
    /// other ranks return `None`.
    ///
    /// `op` should be associative. The fold order is fixed regardless, so
    /// results are reproducible even for non-commutative operators.
    pub fn all_to_one_reduce<F>(
        &self,
        rank: usize,
        root: usize,
        payload: T,
        op: F,
    ) -> Result<Option<T>>
    where
        F: Fn(T, T) -> T,
    {
        self.check_pattern(rank, root, Flow::Fanin)?;
        tracing::debug!(rank, root, "all-to-one reduce");
        self.reduce_values(rank, root, payload, &op)
    }

    /// All-to-all broadcast: every rank returns the payloads of all ranks,
    /// indexed by rank. Collects at [`ANCHOR_RANK`], then broadcasts the
    /// sequence from there.
    pub fn all_to_all_broadcast(&self, rank: usize, payload: T) -> Result<Vec<T>>
    where
        T: Clone,
    {
        self.check_pattern(rank, ANCHOR_RANK, Flow::Both)?;
        tracing::debug!(rank, "all-to-all broadcast");
        match self.collect_values(rank, ANCHOR_RANK, payload)? {
            Some(all) => self.fan_out_sequence(ANCHOR_RANK, all),
            None => self.receive_sequence(rank, ANCHOR_RANK),
        }
    }

    /// All-to-all reduce: every rank returns the same reduced value.
    /// Reduces at [`ANCHOR_RANK`], then broadcasts the result.
    pub fn all_to_all_reduce<F>(&self, rank: usize, payload: T, op: F) -> Result<T>
    where
        T: Clone,
        F: Fn(T, T) -> T,
    {
        self.check_pattern(rank, ANCHOR_RANK, Flow::Both)?;
        tracing::debug!(rank, "all-to-all reduce");
        match self.reduce_values(rank, ANCHOR_RANK, payload, &op)? {
            Some(total) => self.fan_out(ANCHOR_RANK, total),
            None => self.receive(rank, ANCHOR_RANK),
        }
    }

    /// One-to-all scatter: the root cuts `sequence` into `P` contiguous
    /// chunks of `ceil(len / P)` elements (trailing chunks may be short or
    /// empty) and rank `i` returns chunk `i`. Non-root ranks ignore their
    /// `sequence` argument.
    pub fn one_to_all_scatter(&self, rank: usize, root: usize, sequence: &[T]) -> Result<Vec<T>>
    where
        T: Clone,
    {
        self.check_pattern(rank, root, Flow::Fanout)?;
        tracing::debug!(rank, root, len = sequence.len(), "one-to-all scatter");

        if rank != root {
            return self.receive_sequence(rank, root);
        }

        let processes = self.processes();
        let mut kept = Vec::new();
        for peer in 0..processes {
            let chunk = sequence[chunk_range(sequence.len(), processes, peer)].to_vec();
            if peer == root {
                kept = chunk;
            } else {
                self.send_sequence(root, peer, chunk)?;
            }
        }
        Ok(kept)
    }

    /// Blocks until every rank has reached the barrier. A content-free
    /// all-to-all broadcast through [`ANCHOR_RANK`].
    pub fn barrier(&self, rank: usize) -> Result<()> {
        self.check_pattern(rank, ANCHOR_RANK, Flow::Both)?;
        tracing::debug!(rank, "barrier");

        if rank != ANCHOR_RANK {
            self.send_signal(rank, ANCHOR_RANK)?;
            return self.receive_signal(rank, ANCHOR_RANK);
        }

        for peer in self.peers(ANCHOR_RANK) {
            self.receive_signal(ANCHOR_RANK, peer)?;
        }
        for peer in self.peers(ANCHOR_RANK) {
            self.send_signal(ANCHOR_RANK, peer)?;
        }
        Ok(())
    }

    /// Every rank except `root`, ascending.
    fn peers(&self, root: usize) -> impl Iterator<Item = usize> {
        (0..self.processes()).filter(move |&peer| peer != root)
    }

    fn check_pattern(&self, rank: usize, root: usize, flow: Flow) -> Result<()> {
        self.check_rank(rank)?;
        self.check_rank(root)?;

        for peer in self.peers(root) {
            if matches!(flow, Flow::Fanin | Flow::Both) && !self.topology().is_adjacent(peer, root)
            {
                tracing::warn!(rank, from = peer, to = root, "collective needs missing link");
                return Err(PsimError::TopologyViolation {
                    from: peer,
                    to: root,
                });
            }
            if matches!(flow, Flow::Fanout | Flow::Both) && !self.topology().is_adjacent(root, peer)
            {
                tracing::warn!(rank, from = root, to = peer, "collective needs missing link");
                return Err(PsimError::TopologyViolation {
                    from: root,
                    to: peer,
                });
            }
        }
        Ok(())
    }

    fn fan_out(&self, root: usize, payload: T) -> Result<T>
    where
        T: Clone,
    {
        for peer in self.peers(root) {
            self.send(root, peer, payload.clone())?;
        }
        Ok(payload)
    }

    fn fan_out_sequence(&self, root: usize, sequence: Vec<T>) -> Result<Vec<T>>
    where
        T: Clone,
    {
        for peer in self.peers(root) {
            self.send_sequence(root, peer, sequence.clone())?;
        }
        Ok(sequence)
    }

    fn collect_values(&self, rank: usize, root: usize, payload: T) -> Result<Option<Vec<T>>> {
        if rank != root {
            self.send(rank, root, payload)?;
            return Ok(None);
        }

        let mut collected = Vec::with_capacity(self.processes());
        for peer in 0..root {
            collected.push(self.receive(root, peer)?);
        }
        collected.push(payload);
        for peer in root + 1..self.processes() {
            collected.push(self.receive(root, peer)?);
        }
        Ok(Some(collected))
    }

    fn reduce_values<F>(&self, rank: usize, root: usize, payload: T, op: &F) -> Result<Option<T>>
    where
        F: Fn(T, T) -> T,
    {
        if rank != root {
            self.send(rank, root, payload)?;
            return Ok(None);
        }

        let mut acc = payload;
        for peer in self.peers(root) {
            acc = op(acc, self.receive(root, peer)?);
        }
        Ok(Some(acc))
    }
}

/// Index range of chunk `index` when `len` elements are cut into `parts`
/// chunks of `ceil(len / parts)` elements.
pub(crate) fn chunk_range(len: usize, parts: usize, index: usize) -> Range<usize> {
    let size = len.div_ceil(parts);
    let start = (index * size).min(len);
    let end = (start + size).min(len);
    start..end
}
