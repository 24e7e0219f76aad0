//! The transaction capability the heap evicts through.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ashdb_common::{NodeId, Result};

use crate::heap::NodeHeap;

/// A tree transaction that owns heap nodes.
///
/// The heap only needs two things from a transaction: a stable identity and
/// a way to push nodes out to durable storage.
pub trait Transaction: Send + Sync {
    /// Makes the listed nodes durable.
    ///
    /// Called by [`NodeHeap::flush`] at most once per transaction per pass,
    /// with `ids` sorted ascending. The implementation must call
    /// [`NodeHeap::delete`] for every node it has fully persisted; the heap
    /// never removes evicted nodes on its own. Nodes it leaves resident stay
    /// eligible for the next pass.
    ///
    /// `heap` is the same heap running the flush. Implementations must not
    /// try to lock the heap again from another thread.
    fn flush_nodes(&self, heap: &mut NodeHeap, ids: &[NodeId]) -> Result<()>;
}

/// Shared handle to a transaction, compared by identity.
#[derive(Clone)]
pub struct TransactionRef(Arc<dyn Transaction>);

impl TransactionRef {
    /// Wraps a transaction.
    pub fn new<T: Transaction + 'static>(tx: T) -> Self {
        Self(Arc::new(tx))
    }

    /// Returns the underlying transaction.
    pub fn get(&self) -> &dyn Transaction {
        self.0.as_ref()
    }

    /// Returns true if both handles refer to the same transaction.
    #[inline]
    pub fn same(&self, other: &TransactionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl From<Arc<dyn Transaction>> for TransactionRef {
    fn from(tx: Arc<dyn Transaction>) -> Self {
        Self(tx)
    }
}

impl PartialEq for TransactionRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for TransactionRef {}

impl Hash for TransactionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionRef({:#x})", self.addr())
    }
}
