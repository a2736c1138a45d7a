//! Error types for the B+ tree index.

use snafu::Snafu;

use crate::{config::ConfigError, types::Handle};

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during tree operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The node pool has no free slot left for a required allocation.
    ///
    /// The operation that reported it has not modified the tree.
    #[snafu(display("Node pool exhausted: all {capacity} slots in use"))]
    PoolExhausted {
        /// Fixed capacity of the pool.
        capacity: usize,
    },

    /// The key is not present in the tree.
    #[snafu(display("Key not found"))]
    KeyNotFound,

    /// The tree configuration cannot satisfy the occupancy invariants.
    #[snafu(display("Invalid configuration: {source}"))]
    InvalidConfiguration {
        /// The validation failure.
        source: ConfigError,
    },

    /// Payload larger than the configured payload size.
    #[snafu(display("Payload too large: {size} bytes (max {max})"))]
    PayloadTooLarge {
        /// Actual size of the payload in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// Handle is out of range or refers to a free slot.
    #[snafu(display("Invalid node handle: {handle}"))]
    InvalidHandle {
        /// The offending handle.
        handle: Handle,
    },

    /// A slot holds a different node variant than the caller expected.
    #[snafu(display("Node {handle} kind mismatch: expected {expected:?}, found {found:?}"))]
    NodeKindMismatch {
        /// The slot that was read.
        handle: Handle,
        /// The expected node kind.
        expected: NodeKind,
        /// The node kind actually stored.
        found: NodeKind,
    },

    /// A node violates a structural invariant the operation relies on.
    #[snafu(display("Corrupt node {handle}: {reason}"))]
    Corrupted {
        /// The offending node.
        handle: Handle,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<ConfigError> for Error {
    fn from(source: ConfigError) -> Self {
        Error::InvalidConfiguration { source }
    }
}

/// Node variants stored in pool slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Internal (branch) node.
    Internal,
    /// Leaf node.
    Leaf,
    /// Single data payload.
    Data,
    /// Duplicate-key payload chain link.
    Duplicate,
}
