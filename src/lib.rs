//! Vesper: variable-length list storage for an embedded property-graph
//! database.
//!
//! The crate implements the on-disk list layer a graph store builds its
//! relationship tables on: adjacency lists, per-relationship property lists
//! (fixed-width, string, and nested-list values), and relationship
//! identifier lists, all sharing one batched, transaction-aware scan path.
//! Reads stream over immutable published snapshots; a write transaction
//! stages its changes in an in-memory overlay and commits by rewriting the
//! affected lists into fresh pages and atomically publishing a new snapshot.
//!
//! Entry points: [`lists::Lists`] for the core engine,
//! [`lists::AdjLists`] / [`lists::PropertyLists`] / [`lists::RelIdList`]
//! for the per-file specializations, and [`pager::BufferManager`] for the
//! shared page cache underneath them.

pub mod lists;
pub mod overflow;
pub mod pager;
pub mod transaction;
pub mod types;
pub mod vector;

pub use transaction::{Transaction, TransactionType};
pub use types::{Result, VesperError};
