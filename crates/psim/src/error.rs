//! Error types for the process simulation.

use thiserror::Error;

/// Errors raised by transport, collective, and launcher operations.
#[derive(Error, Debug)]
pub enum PsimError {
    /// A rank argument lies outside `[0, processes)`.
    #[error("rank {rank} out of range for {processes} processes")]
    RankOutOfRange { rank: usize, processes: usize },

    /// The configured topology does not link the two ranks directly.
    #[error("topology does not permit direct communication from rank {from} to rank {to}")]
    TopologyViolation { from: usize, to: usize },

    /// The receiver expected a different kind of message than was sent.
    ///
    /// This usually means the ranks issued mismatched collective calls.
    #[error("rank {to} expected a {expected} from rank {from} but received a {found}")]
    UnexpectedPayload {
        from: usize,
        to: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The channel matrix was closed before or during the operation,
    /// typically because another rank panicked or failed to start.
    #[error("channel from rank {from} to rank {to} is disconnected")]
    Disconnected { from: usize, to: usize },

    /// A worker thread panicked before returning.
    #[error("worker for rank {rank} panicked")]
    WorkerPanicked { rank: usize },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker for rank {rank}: {source}")]
    Spawn {
        rank: usize,
        #[source]
        source: std::io::Error,
    },

    /// Invalid simulation configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, PsimError>;
