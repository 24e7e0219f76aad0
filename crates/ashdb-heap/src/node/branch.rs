//! Branch nodes: ordered child references with separator keys.

use ashdb_common::{AshError, Key, NodeId, Result};

/// Estimated bytes per branch entry (16-byte id + 16-byte key).
const ENTRY_FOOTPRINT: u64 = 32;

/// Fixed per-branch overhead (header, length, allocation slack).
const BRANCH_BASE_FOOTPRINT: u64 = 8 + 4 + 64;

/// A single child reference inside a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEntry {
    /// Child node.
    pub child: NodeId,
    /// Lowest key reachable through `child`.
    pub key: Key,
}

/// Internal tree node.
///
/// Entries are kept in the order the tree layer places them. The separator
/// of entry `i` is the lowest key reachable through child `i`, so a lookup
/// descends into the last entry whose key is `<=` the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBranch {
    entries: Vec<BranchEntry>,
    max_children: usize,
}

impl TreeBranch {
    /// Creates an empty branch bounded by `max_children`.
    pub fn new(max_children: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_children),
            max_children,
        }
    }

    /// Copies `other` into a branch bounded by `max_children`.
    ///
    /// Entries beyond the new bound are dropped.
    pub fn copy_bounded(other: &TreeBranch, max_children: usize) -> Self {
        let mut entries = Vec::with_capacity(max_children);
        entries.extend(other.entries.iter().take(max_children).copied());
        Self {
            entries,
            max_children,
        }
    }

    /// Returns the number of children.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the branch has no children.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if no more children fit.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_children
    }

    /// Returns the fan-out bound.
    #[inline]
    pub fn max_children(&self) -> usize {
        self.max_children
    }

    /// Returns all entries in order.
    pub fn entries(&self) -> &[BranchEntry] {
        &self.entries
    }

    /// Returns the child at `index`.
    pub fn child(&self, index: usize) -> Result<NodeId> {
        self.entry(index).map(|e| e.child)
    }

    /// Returns the separator key at `index`.
    pub fn key(&self, index: usize) -> Result<Key> {
        self.entry(index).map(|e| e.key)
    }

    /// Replaces the child at `index`, e.g. after a copy-on-write of it.
    pub fn set_child(&mut self, index: usize, child: NodeId) -> Result<()> {
        self.entry_mut(index)?.child = child;
        Ok(())
    }

    /// Replaces the separator key at `index`.
    pub fn set_key(&mut self, index: usize, key: Key) -> Result<()> {
        self.entry_mut(index)?.key = key;
        Ok(())
    }

    /// Appends a child.
    pub fn push(&mut self, child: NodeId, key: Key) -> Result<()> {
        self.insert(self.entries.len(), child, key)
    }

    /// Inserts a child at `index`, shifting later entries right.
    pub fn insert(&mut self, index: usize, child: NodeId, key: Key) -> Result<()> {
        if self.is_full() {
            return Err(AshError::invalid(format!(
                "branch full ({} children)",
                self.max_children
            )));
        }
        if index > self.entries.len() {
            return Err(AshError::invalid(format!(
                "branch insert index {} past length {}",
                index,
                self.entries.len()
            )));
        }
        self.entries.insert(index, BranchEntry { child, key });
        Ok(())
    }

    /// Removes and returns the entry at `index`.
    pub fn remove(&mut self, index: usize) -> Result<BranchEntry> {
        self.entry(index)?;
        Ok(self.entries.remove(index))
    }

    /// Returns the index of the child whose key range covers `key`.
    ///
    /// Keys below the first separator map to child 0. Returns 0 for an empty
    /// branch.
    pub fn search(&self, key: &Key) -> usize {
        self.entries
            .partition_point(|e| e.key <= *key)
            .saturating_sub(1)
    }

    /// Estimated resident size in bytes, excluding heap bookkeeping.
    pub fn memory_footprint(&self) -> u64 {
        BRANCH_BASE_FOOTPRINT + self.max_children as u64 * ENTRY_FOOTPRINT
    }

    fn entry(&self, index: usize) -> Result<&BranchEntry> {
        let len = self.entries.len();
        self.entries.get(index).ok_or_else(|| {
            AshError::invalid(format!("branch index {index} out of range (len {len})"))
        })
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut BranchEntry> {
        let len = self.entries.len();
        self.entries.get_mut(index).ok_or_else(|| {
            AshError::invalid(format!("branch index {index} out of range (len {len})"))
        })
    }
}
