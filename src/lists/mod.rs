//! Variable-length list storage for relationship tables.
//!
//! A relationship table keeps, per direction, a family of aligned list
//! files: an adjacency list of neighbor identifiers, one property list per
//! relationship property, and a relationship-identifier list. Element `i` of
//! each file describes the same relationship, so every file shares the same
//! per-node list shape.
//!
//! Lists up to [`header::SMALL_LIST_CAPACITY`] elements are packed into a
//! shared CSR-addressed page region; longer lists own their page chains and
//! are reached through per-list metadata. Scans stream batches through a
//! [`handle::ListHandle`]; a write transaction's pending changes live in the
//! [`update_store::ListsUpdateStore`] overlay until commit rewrites the
//! affected lists and publishes a new snapshot.

pub mod adjacency;
pub mod cursor;
pub mod engine;
pub mod handle;
pub mod header;
pub mod in_mem;
pub mod layout;
pub mod metadata;
pub mod props;
pub mod rel_id;
pub mod update_store;

pub use adjacency::{AdjLists, NodeIdCompression};
pub use engine::{ListFileWriter, Lists};
pub use handle::{ListHandle, ListSourceStore};
pub use header::{ListHeader, ListHeaders, SMALL_LIST_CAPACITY};
pub use in_mem::InMemList;
pub use props::{ListPropertyLists, PropertyLists, StringPropertyLists};
pub use rel_id::RelIdList;
pub use update_store::{DeletionOutcome, ListsUpdateStore, UpdateElement};
