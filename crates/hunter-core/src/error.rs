//! Error types shared by every subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading a catalog, running a ranker,
/// or driving a search session.
#[derive(Debug, Error)]
pub enum HunterError {
    /// A catalog or feature file could not be read or did not match the
    /// expected format.
    #[error("failed to load {path}: {reason}")]
    Load {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// A caller-supplied argument was outside its valid domain (negative
    /// page, zero display size, unknown temporal slot, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An index (frame, video, context) was not found in the catalog or
    /// history.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A query requires at least one non-empty term and none was given.
    #[error("query is empty")]
    EmptyQuery,

    /// The self-organizing map has not produced a display yet for the
    /// requested temporal slot.
    #[error("som not ready for temporal slot {0}")]
    SomNotReady(usize),

    /// An evaluation-server action was attempted without a valid session.
    #[error("not authorized")]
    NotAuthorized,

    /// A remote call (submission, secondary text ranker, ...) failed in a
    /// way that is expected to be retryable.
    #[error("transient I/O failure: {0}")]
    TransientIoFailure(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HunterError>;
