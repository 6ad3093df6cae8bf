use thiserror::Error;

/// Errors reported by the tree, heap and tracker operations.
///
/// Every variant describes a precondition the caller violated; none of them
/// are transient and no operation retries internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Lookup or deletion of a key that is not stored in the tree
    #[error("key not found")]
    NotFound,

    /// Extraction or deletion attempted on an empty heap
    #[error("heap is empty")]
    Empty,

    /// Heap position outside `[1, size]`
    #[error("index {index} is out of range for a heap of size {size}")]
    OutOfRange {
        /// Requested 1-indexed position
        index: usize,
        /// Number of nodes in the heap at the time of the request
        size: usize,
    },

    /// A structural precondition of a link operation does not hold
    #[error("invalid structure: {0}")]
    InvalidStructure(&'static str),

    /// The node reference does not name a live node of this structure,
    /// either because it was removed or because it came from elsewhere
    #[error("node reference is stale or belongs to another structure")]
    InvalidNode,

    /// The observation is older than the most recent one recorded
    #[error("observation is older than the latest recorded timestamp")]
    OutOfOrder,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
