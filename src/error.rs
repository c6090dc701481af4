//! Unified error type for track conflation.
//!
//! Every failure is scoped to the track being imported: the importer rolls
//! the track back and the caller may continue with the next one.

use std::path::PathBuf;

use thiserror::Error;

use crate::NodeId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConflationError>;

/// Errors raised while reading or conflating a track.
#[derive(Debug, Error)]
pub enum ConflationError {
    /// A track point lacks a required field or carries an invalid value.
    #[error("malformed track point at index {index}: {reason}")]
    MalformedInput { index: usize, reason: String },

    /// The graph store rejected an operation.
    #[error("graph store failure: {0}")]
    Store(String),

    /// The spatial index rejected an operation.
    #[error("spatial index failure: {0}")]
    Index(String),

    /// A node id returned by the index is unknown to the store.
    #[error("node {0} not found in graph store")]
    UnknownNode(NodeId),

    /// A track file could not be parsed.
    #[error("failed to parse track {path}: {reason}")]
    TrackParse { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "persistence")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse classification of a [`ConflationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, detected before the engine runs.
    MalformedInput,
    /// The index, store, or track source failed mid-batch.
    CollaboratorFailure,
}

impl ConflationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConflationError::MalformedInput { .. } | ConflationError::Config(_) => {
                ErrorKind::MalformedInput
            }
            _ => ErrorKind::CollaboratorFailure,
        }
    }

    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        ConflationError::MalformedInput {
            index,
            reason: reason.into(),
        }
    }
}

/// Extension trait for turning lookups into conflation errors.
pub trait OptionExt<T> {
    /// Map `None` to [`ConflationError::UnknownNode`].
    fn ok_or_unknown_node(self, id: NodeId) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_node(self, id: NodeId) -> Result<T> {
        self.ok_or(ConflationError::UnknownNode(id))
    }
}
