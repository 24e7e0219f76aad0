//! Heap slots: stable indices for resident nodes.

use ashdb_common::NodeId;

use crate::node::{NodeKind, TreeNode};
use crate::transaction::TransactionRef;

/// Per-entry bookkeeping charged on top of the node's own footprint
/// (hash chain link plus two recency links plus the owner handle).
pub const ENTRY_OVERHEAD: u64 = 8 * 4;

/// Stable index of a resident node in the heap's side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

impl SlotId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot:{}", self.0)
    }
}

/// Content half of a heap entry. Links live in the index and recency list.
pub struct HeapEntry {
    /// Node identifier.
    pub id: NodeId,
    /// Node content.
    pub node: TreeNode,
    /// Transaction that created or copied the node. Fixed while resident.
    pub owner: TransactionRef,
    /// Footprint charged against the heap's memory counter.
    pub footprint: u64,
}

impl HeapEntry {
    /// Builds an entry, computing its footprint from the node.
    pub fn new(id: NodeId, node: TreeNode, owner: TransactionRef) -> Self {
        let footprint = node.memory_footprint() + ENTRY_OVERHEAD;
        Self {
            id,
            node,
            owner,
            footprint,
        }
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }
}

/// Arena of heap entries addressed by [`SlotId`], reusing freed slots.
pub struct SlotArena {
    entries: Vec<Option<HeapEntry>>,
    free: Vec<SlotId>,
}

impl Default for SlotArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotArena {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores an entry and returns its slot.
    pub fn insert(&mut self, entry: HeapEntry) -> SlotId {
        match self.free.pop() {
            Some(slot) => {
                debug_assert!(self.entries[slot.index()].is_none());
                self.entries[slot.index()] = Some(entry);
                slot
            }
            None => {
                let slot = SlotId(self.entries.len());
                self.entries.push(Some(entry));
                slot
            }
        }
    }

    /// Takes the entry out of `slot`, freeing it for reuse.
    pub fn remove(&mut self, slot: SlotId) -> Option<HeapEntry> {
        let entry = self.entries.get_mut(slot.index())?.take()?;
        self.free.push(slot);
        Some(entry)
    }

    #[inline]
    pub fn get(&self, slot: SlotId) -> Option<&HeapEntry> {
        self.entries.get(slot.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut HeapEntry> {
        self.entries.get_mut(slot.index())?.as_mut()
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &HeapEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (SlotId(i), e)))
    }
}
