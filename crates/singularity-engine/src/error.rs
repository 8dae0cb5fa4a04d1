//! Error types for the Singularity engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup, the tick loop, and snapshot I/O.

use std::path::PathBuf;

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: singularity_core::config::ConfigError,
    },

    /// The tick loop refused to start.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: singularity_core::runner::RunnerError,
    },

    /// Scenario selection from config failed.
    #[error("scenario error: {source}")]
    Scenario {
        /// The underlying scenario error.
        #[from]
        source: singularity_core::scenario::ScenarioError,
    },

    /// Reading or writing the scheduler snapshot failed.
    #[error("snapshot I/O error at {}: {source}", path.display())]
    SnapshotIo {
        /// The snapshot file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The scheduler snapshot could not be encoded or decoded.
    #[error("snapshot format error at {}: {source}", path.display())]
    SnapshotFormat {
        /// The snapshot file.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}
