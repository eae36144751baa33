//! Launching a simulation run.
//!
//! [`Simulation::run`] builds a fresh [`Communicator`] (the whole channel
//! matrix is allocated before any worker starts), spawns exactly one
//! thread per rank, and joins every one of them before returning.
//!
//! A worker that blocks on a send or receive with no matching counterpart
//! keeps the join from completing. That deadlock is a programming error in
//! the worker and is not detected.
//!
//! A worker that panics, or a rank whose thread cannot be started, closes
//! the channel matrix so the remaining ranks fail with
//! [`PsimError::Disconnected`] instead of waiting forever.

use std::io;
use std::thread;

use crate::communicator::Communicator;
use crate::config::SimConfig;
use crate::topology::Topology;
use crate::{PsimError, Result};

/// Launcher for simulation runs.
///
/// Holds configuration only; no state survives from one run to the next.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    config: SimConfig,
    /// Overrides `config.topology` when set.
    topology: Option<Topology>,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
}

/// Closes the matrix if the owning worker unwinds.
struct CloseOnPanic<'a, T: Send>(&'a Communicator<T>);

impl<T: Send> Drop for CloseOnPanic<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            topology: None,
            #[cfg(test)]
            fail_spawn_at: None,
        }
    }

    /// Makes the spawn of `rank` fail as if the OS had refused it.
    #[cfg(test)]
    pub(crate) fn with_spawn_failure_at(mut self, rank: usize) -> Self {
        self.fail_spawn_at = Some(rank);
        self
    }

    /// Uses `topology` instead of the configured kind. Needed for
    /// [`Topology::custom`] predicates.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs `worker(rank, communicator)` on `P` concurrent threads and
    /// waits for all of them.
    ///
    /// Returns each worker's return value in rank order.
    ///
    /// # Errors
    ///
    /// - [`PsimError::Config`] if the configuration is invalid
    /// - [`PsimError::WorkerPanicked`] for the lowest rank whose worker
    ///   panicked, after every worker has been joined
    /// - [`PsimError::Spawn`] if a worker thread could not be started; the
    ///   ranks already running are released by closing the channel matrix
    pub fn run<T, R, F>(&self, worker: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &Communicator<T>) -> R + Sync,
    {
        self.config.validate()?;
        let processes = self.config.processes;
        let topology = self
            .topology
            .clone()
            .unwrap_or_else(|| self.config.build_topology());

        let comm = Communicator::new(processes, topology)?;
        tracing::debug!(processes, topology = ?comm.topology(), "starting simulation");

        let comm = &comm;
        let worker = &worker;
        let (outcomes, spawn_error) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(processes);
            let mut spawn_error = None;
            for rank in 0..processes {
                let spawned = self.spawn_allowed(rank).and_then(|()| {
                    thread::Builder::new()
                        .name(format!("psim-rank-{rank}"))
                        .spawn_scoped(scope, move || {
                            let span = tracing::debug_span!("psim.worker", rank);
                            let _entered = span.enter();
                            let _guard = CloseOnPanic(comm);
                            worker(rank, comm)
                        })
                });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        // Started ranks may be waiting on this one.
                        comm.close();
                        spawn_error = Some(PsimError::Spawn { rank, source });
                        break;
                    }
                }
            }

            let outcomes = handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| PsimError::WorkerPanicked { rank })
                })
                .collect::<Vec<_>>();
            (outcomes, spawn_error)
        });

        let mut results = Vec::with_capacity(processes);
        for outcome in outcomes.into_iter().chain(spawn_error.map(Err)) {
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => {
                    tracing::warn!(error = %e, "worker did not complete");
                    return Err(e);
                }
            }
        }

        tracing::debug!(processes, "simulation finished");
        Ok(results)
    }

    #[cfg(test)]
    fn spawn_allowed(&self, rank: usize) -> io::Result<()> {
        if self.fail_spawn_at == Some(rank) {
            return Err(io::Error::other("thread limit reached"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn spawn_allowed(&self, _rank: usize) -> io::Result<()> {
        Ok(())
    }
}
