//! Node heap: allocator and cache for nodes of in-flight tree transactions.

use std::collections::HashMap;

use ashdb_common::node_id::SEQUENCE_MASK;
use ashdb_common::{AshError, HeapConfig, NodeId, Result};
use tracing::{debug, info, warn};

use crate::index::NodeIndex;
use crate::node::{NodeKind, TreeBranch, TreeLeaf, TreeNode};
use crate::recency::RecencyList;
use crate::slot::{HeapEntry, SlotArena, SlotId, ENTRY_OVERHEAD};
use crate::transaction::TransactionRef;

/// First sequence number handed out. 0 and 1 are reserved markers.
const FIRST_SEQUENCE: u64 = 2;

/// Share of resident nodes selected by one eviction pass, in tenths.
const EVICT_TENTHS: usize = 3;

/// Outcome of a [`NodeHeap::flush`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    /// Nodes handed to transactions for persisting.
    pub selected: usize,
    /// Number of `flush_nodes` calls made.
    pub transactions: usize,
    /// Memory in use when the pass started.
    pub memory_before: u64,
    /// Memory in use after all callbacks returned.
    pub memory_after: u64,
}

/// Statistics about the node heap.
#[derive(Debug, Clone)]
pub struct HeapStats {
    /// Number of resident nodes.
    pub resident_nodes: usize,
    /// Number of resident branches.
    pub branch_nodes: usize,
    /// Number of resident leaves.
    pub leaf_nodes: usize,
    /// Sum of resident footprints in bytes.
    pub memory_used: u64,
    /// Eviction threshold in bytes.
    pub max_memory: u64,
    /// Hash bucket count.
    pub hash_buckets: usize,
    /// Longest hash chain.
    pub max_chain_len: usize,
}

/// Node heap.
///
/// Holds every node a transaction has created or copied but not yet made
/// durable:
/// - NodeId to slot mapping (chained hash index)
/// - Creation-order recency list for eviction
/// - Incremental memory accounting against `max_memory`
///
/// The heap is not synchronized. When several transactions share one heap,
/// the caller serializes every call (create, copy, fetch, delete, flush)
/// behind one lock. `flush` hands the heap itself to
/// [`Transaction::flush_nodes`](crate::Transaction::flush_nodes), so the
/// callback deletes through that borrow instead of re-locking.
pub struct NodeHeap {
    /// Configuration.
    config: HeapConfig,
    /// Next transient sequence number.
    next_sequence: u64,
    /// Node content by slot.
    arena: SlotArena,
    /// NodeId to slot mapping.
    index: NodeIndex,
    /// Slots ordered by creation/copy time.
    recency: RecencyList,
    /// Resident branch count.
    branch_count: usize,
    /// Resident leaf count.
    leaf_count: usize,
    /// Sum of resident footprints.
    memory_used: u64,
}

impl NodeHeap {
    /// Creates a new node heap.
    pub fn new(config: HeapConfig) -> Result<Self> {
        config.validate()?;
        let index = NodeIndex::new(config.hash_buckets);
        Ok(Self {
            config,
            next_sequence: FIRST_SEQUENCE,
            arena: SlotArena::new(),
            index,
            recency: RecencyList::new(),
            branch_count: 0,
            leaf_count: 0,
            memory_used: 0,
        })
    }

    /// Creates a heap with the given bucket count and memory ceiling.
    pub fn with_limits(hash_buckets: usize, max_memory: u64) -> Result<Self> {
        Self::new(HeapConfig {
            hash_buckets,
            max_memory,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Returns the number of resident nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.branch_count + self.leaf_count
    }

    /// Returns true if no nodes are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of resident branches.
    pub fn branch_count(&self) -> usize {
        self.branch_count
    }

    /// Returns the number of resident leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Returns the sum of resident footprints in bytes.
    #[inline]
    pub fn memory_used(&self) -> u64 {
        self.memory_used
    }

    /// Returns the eviction threshold in bytes.
    pub fn max_memory(&self) -> u64 {
        self.config.max_memory
    }

    /// Returns true if the next `flush` would consider evicting.
    pub fn is_over_limit(&self) -> bool {
        self.memory_used > self.config.max_memory
    }

    /// Returns true if `id` is resident.
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains(&id)
    }

    fn next_node_id(&mut self) -> Result<NodeId> {
        let seq = self.next_sequence;
        if seq < FIRST_SEQUENCE {
            return Err(AshError::NodeIdExhausted);
        }
        self.next_sequence = (seq + 1) & SEQUENCE_MASK;
        Ok(NodeId::transient(seq))
    }

    /// Registers `node` as the most recent entry under a fresh id.
    fn register(&mut self, node: TreeNode, tx: &TransactionRef) -> Result<NodeId> {
        let id = self.next_node_id()?;
        let entry = HeapEntry::new(id, node, tx.clone());
        let footprint = entry.footprint;
        match entry.kind() {
            NodeKind::Branch => self.branch_count += 1,
            NodeKind::Leaf => self.leaf_count += 1,
        }

        let slot = self.arena.insert(entry);
        self.index.insert(id, slot);
        self.recency.push_front(slot);
        self.memory_used += footprint;
        Ok(id)
    }

    /// Allocates an empty branch bounded by `max_children`.
    pub fn create_branch(&mut self, tx: &TransactionRef, max_children: usize) -> Result<NodeId> {
        let id = self.register(TreeNode::Branch(TreeBranch::new(max_children)), tx)?;
        debug!(node_id = %id, max_children, memory_used = self.memory_used, "heap: created branch");
        Ok(id)
    }

    /// Allocates an empty leaf with room for `max_capacity` bytes.
    pub fn create_leaf(&mut self, tx: &TransactionRef, max_capacity: usize) -> Result<NodeId> {
        let id = self.register(TreeNode::Leaf(TreeLeaf::new(max_capacity)), tx)?;
        debug!(node_id = %id, max_capacity, memory_used = self.memory_used, "heap: created leaf");
        Ok(id)
    }

    /// Deep-copies `source` into a new node owned by `tx`.
    ///
    /// Branches are re-bounded to `max_branch` children and leaves to
    /// `max_leaf` bytes. `source` itself is not touched, so it stays valid
    /// for other readers.
    pub fn copy(
        &mut self,
        source: &TreeNode,
        max_branch: usize,
        max_leaf: usize,
        tx: &TransactionRef,
    ) -> Result<NodeId> {
        let node = source.copy_bounded(max_branch, max_leaf)?;
        let kind = node.kind();
        let id = self.register(node, tx)?;
        debug!(node_id = %id, %kind, memory_used = self.memory_used, "heap: copied node");
        Ok(id)
    }

    /// Copy-on-write of a node already resident in the heap.
    pub fn copy_resident(
        &mut self,
        source: NodeId,
        max_branch: usize,
        max_leaf: usize,
        tx: &TransactionRef,
    ) -> Result<NodeId> {
        let node = self
            .fetch(source)
            .ok_or(AshError::NodeNotFound { node_id: source })?
            .copy_bounded(max_branch, max_leaf)?;
        let kind = node.kind();
        let id = self.register(node, tx)?;
        debug!(node_id = %id, source = %source, %kind, "heap: copied resident node");
        Ok(id)
    }

    /// Fetches a resident node. Does not change its recency.
    #[inline]
    pub fn fetch(&self, id: NodeId) -> Option<&TreeNode> {
        let slot = self.index.get(&id)?;
        self.arena.get(slot).map(|e| &e.node)
    }

    /// Fetches a resident node for mutation. Does not change its recency.
    #[inline]
    pub fn fetch_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        let slot = self.index.get(&id)?;
        self.arena.get_mut(slot).map(|e| &mut e.node)
    }

    /// Returns the transaction that owns a resident node.
    pub fn owner(&self, id: NodeId) -> Option<&TransactionRef> {
        let slot = self.index.get(&id)?;
        self.arena.get(slot).map(|e| &e.owner)
    }

    /// Removes a resident node and returns its content.
    pub fn delete(&mut self, id: NodeId) -> Result<TreeNode> {
        let slot = self
            .index
            .remove(&id)
            .ok_or(AshError::NodeNotFound { node_id: id })?;
        self.recency.remove(slot);
        let entry = self
            .arena
            .remove(slot)
            .ok_or_else(|| AshError::Internal(format!("{id} indexed at empty {slot}")))?;

        self.memory_used -= entry.footprint;
        match entry.kind() {
            NodeKind::Branch => self.branch_count -= 1,
            NodeKind::Leaf => self.leaf_count -= 1,
        }
        debug!(node_id = %id, memory_used = self.memory_used, "heap: deleted node");
        Ok(entry.node)
    }

    /// Pressure-relief pass.
    ///
    /// When memory use is above `max_memory`, selects the least recently
    /// created/copied 30% of resident nodes, groups them by owning
    /// transaction, and calls each transaction's `flush_nodes` once with
    /// its ids sorted ascending. The transactions delete what they persist.
    ///
    /// An error from a transaction stops the pass and is returned as is.
    pub fn flush(&mut self) -> Result<FlushStats> {
        let memory_before = self.memory_used;
        let mut stats = FlushStats {
            memory_before,
            memory_after: memory_before,
            ..Default::default()
        };
        if memory_before <= self.config.max_memory {
            return Ok(stats);
        }

        let total = self.len();
        let to_clean = total * EVICT_TENTHS / 10;
        if to_clean == 0 {
            warn!(
                resident = total,
                memory_used = memory_before,
                max_memory = self.config.max_memory,
                "heap: over memory limit but too few nodes to evict"
            );
            return Ok(stats);
        }

        let victims: Vec<SlotId> = self.recency.iter_from_tail().take(to_clean).collect();
        let groups = self.group_by_owner(&victims)?;

        for (tx, ids) in &groups {
            tx.get().flush_nodes(self, ids)?;
        }

        stats.selected = victims.len();
        stats.transactions = groups.len();
        stats.memory_after = self.memory_used;
        info!(
            selected = stats.selected,
            transactions = stats.transactions,
            memory_before = stats.memory_before,
            memory_after = stats.memory_after,
            "heap: flushed nodes"
        );
        Ok(stats)
    }

    /// Groups victim ids by owner, in order of first appearance, each group
    /// sorted ascending.
    fn group_by_owner(&self, victims: &[SlotId]) -> Result<Vec<(TransactionRef, Vec<NodeId>)>> {
        let mut groups: Vec<(TransactionRef, Vec<NodeId>)> = Vec::new();
        let mut positions: HashMap<TransactionRef, usize> = HashMap::new();

        for &slot in victims {
            let entry = self
                .arena
                .get(slot)
                .ok_or_else(|| AshError::Internal(format!("recency list links empty {slot}")))?;
            let pos = *positions.entry(entry.owner.clone()).or_insert_with(|| {
                groups.push((entry.owner.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[pos].1.push(entry.id);
        }

        for (_, ids) in &mut groups {
            ids.sort_unstable();
        }
        Ok(groups)
    }

    /// Returns resident ids from most to least recent.
    pub fn recency_order(&self) -> Vec<NodeId> {
        self.recency
            .iter_from_head()
            .filter_map(|slot| self.arena.get(slot).map(|e| e.id))
            .collect()
    }

    /// Recomputes accounting by full traversal and checks it against the
    /// incremental counters.
    pub fn verify_accounting(&self) -> Result<()> {
        let mut memory = 0u64;
        let mut branches = 0usize;
        let mut leaves = 0usize;

        for (slot, entry) in self.arena.iter() {
            let expected = entry.node.memory_footprint() + ENTRY_OVERHEAD;
            if entry.footprint != expected {
                return Err(AshError::Internal(format!(
                    "{} footprint {} != recomputed {}",
                    entry.id, entry.footprint, expected
                )));
            }
            if self.index.get(&entry.id) != Some(slot) {
                return Err(AshError::Internal(format!("{} not indexed at {slot}", entry.id)));
            }
            if !self.recency.contains(slot) {
                return Err(AshError::Internal(format!("{} missing from recency list", entry.id)));
            }
            memory += entry.footprint;
            match entry.kind() {
                NodeKind::Branch => branches += 1,
                NodeKind::Leaf => leaves += 1,
            }
        }

        if memory != self.memory_used {
            return Err(AshError::Internal(format!(
                "memory_used {} != recomputed {}",
                self.memory_used, memory
            )));
        }
        if branches != self.branch_count || leaves != self.leaf_count {
            return Err(AshError::Internal(format!(
                "counts {}/{} != recomputed {}/{}",
                self.branch_count, self.leaf_count, branches, leaves
            )));
        }
        let total = branches + leaves;
        if self.index.len() != total || self.recency.len() != total {
            return Err(AshError::Internal(format!(
                "index {} / recency {} != resident {}",
                self.index.len(),
                self.recency.len(),
                total
            )));
        }
        Ok(())
    }

    /// Returns statistics about the heap.
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            resident_nodes: self.len(),
            branch_nodes: self.branch_count,
            leaf_nodes: self.leaf_count,
            memory_used: self.memory_used,
            max_memory: self.config.max_memory,
            hash_buckets: self.index.num_buckets(),
            max_chain_len: self.index.max_chain_len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }
}
