//! Error types for tree construction and updates.

use thiserror::Error;

/// Errors reported by [`VebTree`](crate::VebTree).
///
/// Universe and allocation errors are returned from construction and mean no
/// tree was built. [`VebError::OutOfBounds`] is returned from `insert` and
/// `remove`; the tree is left unchanged and stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VebError {
    /// Universe smaller than two elements.
    #[error("universe size {universe} must be at least 2")]
    UniverseTooSmall { universe: u64 },

    /// Universe size that is not a power of two.
    #[error("universe size {universe} must be a power of two")]
    UniverseNotPowerOfTwo { universe: u64 },

    /// Universe exponent outside `1..=63`.
    #[error("universe exponent {bits} must be in 1..=63")]
    UniverseBits { bits: u32 },

    /// Cluster storage for a node could not be reserved.
    #[error("failed to allocate clusters for universe {universe}")]
    Allocation { universe: u64 },

    /// Key outside `[0, universe)`.
    #[error("value {value} out of bounds for universe {universe}")]
    OutOfBounds { value: u64, universe: u64 },
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, VebError>;
