//! Error types for instance construction, allocation and state export.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the negotiation pipeline.
///
/// A routing or selection call that finds no plan is recovered where it
/// happens and never becomes an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Nodes that are neither a depot nor part of an assigned pickup-delivery pair.
    #[error("{} node(s) are neither a depot nor part of a pickup-delivery pair: {ids:?}", ids.len())]
    OrphanNodes { ids: Vec<usize> },

    /// A node listed in more than one pickup-delivery pair.
    #[error("node {0} belongs to more than one pickup-delivery pair")]
    SharedNode(usize),

    /// Two nodes share the same id.
    #[error("duplicate node id {0}")]
    DuplicateNode(usize),

    /// A company definition is unusable (missing depot, zero capacity, ...).
    #[error("invalid company {index}: {reason}")]
    InvalidCompany { index: usize, reason: String },

    /// A route assignment breaks one of the allocation invariants.
    #[error("allocation invariant violated: {0}")]
    Invariant(String),

    /// Malformed instance file.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
