//! Minimal transaction context threaded through every read and write path.
//!
//! The storage layer only needs two facts from a transaction: whether it may
//! observe the update overlay (write transactions do, read-only ones never
//! do) and whether the caller has asked it to stop. Long-running operations
//! poll the interrupt flag at batch or page granularity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{Result, VesperError};

/// Whether a transaction may mutate and observe pending updates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransactionType {
    /// Sees only published snapshots.
    ReadOnly,
    /// Sees published snapshots plus its own update overlay.
    Write,
}

/// Transaction context for scans and rewrites.
pub struct Transaction {
    ty: TransactionType,
    interrupt: Arc<AtomicBool>,
}

impl Transaction {
    /// New read-only transaction.
    pub fn read_only() -> Self {
        Self {
            ty: TransactionType::ReadOnly,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// New write transaction.
    pub fn write() -> Self {
        Self {
            ty: TransactionType::Write,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The transaction's type.
    pub fn transaction_type(&self) -> TransactionType {
        self.ty
    }

    /// Whether this transaction never observes pending updates.
    pub fn is_read_only(&self) -> bool {
        self.ty == TransactionType::ReadOnly
    }

    /// Shared flag another thread may set to abort this transaction's
    /// in-flight operations.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Fails with [`VesperError::Interrupted`] once the interrupt flag is
    /// set. Operations poll this between batches and pages.
    pub fn check_interrupted(&self) -> Result<()> {
        if self.interrupt.load(Ordering::Acquire) {
            Err(VesperError::Interrupted)
        } else {
            Ok(())
        }
    }
}
