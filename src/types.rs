//! Core identifier newtypes and the crate-wide error type.

use std::fmt;
use std::io;

/// Position of a node within its table, dense from zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeOffset(pub u64);

/// Identifier of a node table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableId(pub u64);

/// Fully qualified node identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId {
    /// Table the node belongs to.
    pub table: TableId,
    /// The node's offset within that table.
    pub offset: NodeOffset,
}

/// Identifier of a relationship, unique within its relationship table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RelId(pub i64);

/// Physical page number within one paged file.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageId(pub u64);

/// Identifier of one list file within a relationship table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListFileId(pub u32);

impl fmt::Display for NodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.offset)
    }
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ListFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum VesperError {
    /// Underlying file I/O failed.
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    /// Persisted data failed a structural or checksum validation.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// The caller violated an interface contract.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The transaction was interrupted by the caller.
    #[error("transaction interrupted")]
    Interrupted,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VesperError>;
