//! Interconnection topologies.
//!
//! A [`Topology`] answers one question: may rank `i` send directly to rank
//! `j`? Channels exist between every ordered pair of ranks; the topology
//! only gates which of them an operation is permitted to use.
//!
//! # Shapes
//!
//! | Shape             | Adjacent when                                         |
//! |-------------------|-------------------------------------------------------|
//! | Fully connected   | always                                                |
//! | 1-D mesh          | `|i - j| == 1`                                        |
//! | 1-D torus         | `i` and `j` are neighbours modulo `p`                 |
//! | 2-D mesh          | Manhattan neighbours on a `q × q` grid                |
//! | 2-D torus         | Manhattan neighbours with wrap-around on both axes    |
//! | Tree              | one rank is the binary-tree parent of the other       |
//!
//! The grid side is `q = floor(sqrt(p) + 0.1)`, fixed when the topology is
//! built. A process count that is not a perfect square leaves a partial
//! last row; adjacency still follows the formula.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// User-supplied adjacency predicate for [`Topology::Custom`].
pub type AdjacencyFn = Arc<dyn Fn(usize, usize) -> bool + Send + Sync>;

/// Configuration-level selector for the built-in topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyKind {
    /// Bus or switch: every rank reaches every other rank.
    #[default]
    #[serde(alias = "bus", alias = "switch")]
    FullyConnected,
    #[serde(rename = "mesh-1d")]
    Mesh1D,
    #[serde(rename = "torus-1d")]
    Torus1D,
    #[serde(rename = "mesh-2d")]
    Mesh2D,
    #[serde(rename = "torus-2d")]
    Torus2D,
    Tree,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FullyConnected => "fully-connected",
            Self::Mesh1D => "mesh-1d",
            Self::Torus1D => "torus-1d",
            Self::Mesh2D => "mesh-2d",
            Self::Torus2D => "torus-2d",
            Self::Tree => "tree",
        };
        f.write_str(name)
    }
}

/// Adjacency predicate over ranks, together with the state it derives from
/// the process count.
#[derive(Clone, Default)]
pub enum Topology {
    #[default]
    FullyConnected,
    Mesh1D,
    Torus1D { processes: usize },
    Mesh2D { side: usize },
    Torus2D { side: usize },
    Tree,
    Custom(AdjacencyFn),
}

impl Topology {
    pub fn fully_connected() -> Self {
        Self::FullyConnected
    }

    /// Alias of [`fully_connected`](Self::fully_connected).
    pub fn bus() -> Self {
        Self::FullyConnected
    }

    /// Alias of [`fully_connected`](Self::fully_connected).
    pub fn switch() -> Self {
        Self::FullyConnected
    }

    pub fn mesh_1d() -> Self {
        Self::Mesh1D
    }

    pub fn torus_1d(processes: usize) -> Self {
        Self::Torus1D { processes }
    }

    pub fn mesh_2d(processes: usize) -> Self {
        Self::Mesh2D {
            side: grid_side(processes),
        }
    }

    pub fn torus_2d(processes: usize) -> Self {
        Self::Torus2D {
            side: grid_side(processes),
        }
    }

    pub fn tree() -> Self {
        Self::Tree
    }

    /// Wraps an arbitrary predicate. It should be pure: the same pair must
    /// always give the same answer.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(usize, usize) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Builds the topology named by `kind` for `processes` ranks.
    pub fn from_kind(kind: TopologyKind, processes: usize) -> Self {
        match kind {
            TopologyKind::FullyConnected => Self::fully_connected(),
            TopologyKind::Mesh1D => Self::mesh_1d(),
            TopologyKind::Torus1D => Self::torus_1d(processes),
            TopologyKind::Mesh2D => Self::mesh_2d(processes),
            TopologyKind::Torus2D => Self::torus_2d(processes),
            TopologyKind::Tree => Self::tree(),
        }
    }

    /// Returns the built-in kind, or `None` for a custom predicate.
    pub fn kind(&self) -> Option<TopologyKind> {
        match self {
            Self::FullyConnected => Some(TopologyKind::FullyConnected),
            Self::Mesh1D => Some(TopologyKind::Mesh1D),
            Self::Torus1D { .. } => Some(TopologyKind::Torus1D),
            Self::Mesh2D { .. } => Some(TopologyKind::Mesh2D),
            Self::Torus2D { .. } => Some(TopologyKind::Torus2D),
            Self::Tree => Some(TopologyKind::Tree),
            Self::Custom(_) => None,
        }
    }

    /// Returns true if rank `from` may send directly to rank `to`.
    ///
    /// Ranks are not range-checked here; the communicator does that before
    /// consulting the topology.
    pub fn is_adjacent(&self, from: usize, to: usize) -> bool {
        match self {
            Self::FullyConnected => true,
            Self::Mesh1D => from.abs_diff(to) == 1,
            Self::Torus1D { processes } => {
                if *processes == 0 {
                    return false;
                }
                let p = *processes as i64;
                let delta = from as i64 - to as i64;
                delta.rem_euclid(p) == 1 || (-delta).rem_euclid(p) == 1
            }
            Self::Mesh2D { side } => {
                if *side == 0 {
                    return false;
                }
                let rows = (from / side).abs_diff(to / side);
                let cols = (from % side).abs_diff(to % side);
                is_unit_step(rows, cols)
            }
            Self::Torus2D { side } => {
                if *side == 0 {
                    return false;
                }
                let rows = wrapped_distance(from / side, to / side, *side);
                let cols = wrapped_distance(from % side, to % side, *side);
                is_unit_step(rows, cols)
            }
            Self::Tree => from == tree_parent(to) || to == tree_parent(from),
            Self::Custom(predicate) => predicate(from, to),
        }
    }

    /// Ranks in `[0, processes)` that `rank` may send to directly, in
    /// ascending order. Never includes `rank` itself.
    pub fn neighbors(&self, rank: usize, processes: usize) -> Vec<usize> {
        (0..processes)
            .filter(|&peer| peer != rank && self.is_adjacent(rank, peer))
            .collect()
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullyConnected => f.write_str("FullyConnected"),
            Self::Mesh1D => f.write_str("Mesh1D"),
            Self::Torus1D { processes } => f
                .debug_struct("Torus1D")
                .field("processes", processes)
                .finish(),
            Self::Mesh2D { side } => f.debug_struct("Mesh2D").field("side", side).finish(),
            Self::Torus2D { side } => f.debug_struct("Torus2D").field("side", side).finish(),
            Self::Tree => f.write_str("Tree"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Side of the square grid used by the 2-D shapes.
pub fn grid_side(processes: usize) -> usize {
    ((processes as f64).sqrt() + 0.1).floor() as usize
}

/// Parent of `rank` in the binary tree: `ceil((rank - 1) / 2)`, with the
/// root as its own parent.
fn tree_parent(rank: usize) -> usize {
    rank / 2
}

/// Distance between two grid coordinates when the axis wraps at `modulus`.
fn wrapped_distance(a: usize, b: usize, modulus: usize) -> usize {
    let m = modulus as i64;
    let delta = a as i64 - b as i64;
    delta.rem_euclid(m).min((-delta).rem_euclid(m)) as usize
}

fn is_unit_step(rows: usize, cols: usize) -> bool {
    (rows == 1 && cols == 0) || (rows == 0 && cols == 1)
}
