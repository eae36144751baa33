//! # psim: Simulated parallel processes on one machine
//!
//! `psim` runs a fixed number of logical processes (ranks) as threads that
//! share nothing but explicit messages. Ranks may only talk directly along
//! the edges of a configurable interconnection [`Topology`], which makes
//! it a small laboratory for collective-communication patterns,
//! distributed sorting, and reductions without a real cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Simulation::run(worker)                                  │
//! │   builds Communicator, spawns P workers, joins them all  │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ worker(rank, &comm)
//! ┌────────────────────────────┴─────────────────────────────┐
//! │ Collectives                                              │
//! │   broadcast · collect · gather · reduce · scatter ·      │
//! │   all-to-all broadcast/reduce · barrier                  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Transport: send / receive                                │
//! │   rank range check → topology check → rendezvous channel │
//! ├──────────────────────────────────────────────────────────┤
//! │ Channel matrix pipe[from][to] (capacity 0)  │ Topology   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use psim::{SimConfig, Simulation};
//!
//! let sim = Simulation::new(SimConfig::default().with_processes(4));
//! let totals = sim.run(|rank, comm| comm.all_to_all_reduce(rank, rank, |a, b| a + b))?;
//!
//! for total in totals {
//!     assert_eq!(total?, 6);
//! }
//! # Ok::<(), psim::PsimError>(())
//! ```
//!
//! # Failure model
//!
//! Rank and topology violations are returned as [`PsimError`] at the call
//! site and never block. A send or receive whose counterpart never arrives
//! blocks forever; every rank must issue the same collectives in the same
//! order.

mod collective;
mod communicator;
mod config;
mod error;
mod launcher;
mod topology;

pub use collective::ANCHOR_RANK;
pub use communicator::Communicator;
pub use config::SimConfig;
pub use error::{PsimError, Result};
pub use launcher::Simulation;
pub use topology::{AdjacencyFn, Topology, TopologyKind, grid_side};
