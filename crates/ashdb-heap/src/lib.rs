//! Node heap for ashdb tree transactions.
//!
//! This crate provides in-memory node caching with:
//! - Transient node id allocation
//! - Branch and leaf node content with copy-on-write support
//! - Hash-indexed lookup by node id
//! - Creation-order recency tracking and memory accounting
//! - Eviction delegated to the owning transactions

mod heap;
mod index;
mod node;
mod recency;
mod slot;
mod transaction;

pub use heap::{FlushStats, HeapStats, NodeHeap};
pub use node::{BranchEntry, NodeKind, TreeBranch, TreeLeaf, TreeNode};
pub use slot::ENTRY_OVERHEAD;
pub use transaction::{Transaction, TransactionRef};
