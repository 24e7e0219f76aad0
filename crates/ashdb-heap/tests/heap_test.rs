//! Node heap integration tests.
//!
//! Drives the heap the way a tree transaction does:
//! - copy-on-write of leaves and branches
//! - eviction through a transaction that persists to an in-memory block map
//! - several transactions sharing one heap behind a single lock

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use ashdb_common::{AshError, DataAddress, Key, NodeId, Result, TreeConfig};
use ashdb_heap::{NodeHeap, Transaction, TransactionRef, TreeLeaf, TreeNode, ENTRY_OVERHEAD};

/// In-memory stand-in for block storage.
#[derive(Default)]
struct BlockStore {
    next_block: AtomicU64,
    blocks: Mutex<HashMap<DataAddress, Bytes>>,
}

impl BlockStore {
    fn encode(node: &TreeNode) -> Bytes {
        match node {
            TreeNode::Leaf(leaf) => leaf.to_bytes(),
            TreeNode::Branch(branch) => {
                let mut buf = BytesMut::with_capacity(branch.len() * 32);
                for entry in branch.entries() {
                    buf.put_u64(entry.child.high());
                    buf.put_u64(entry.child.low());
                    buf.put_slice(&entry.key.to_bytes());
                }
                buf.freeze()
            }
        }
    }
}

/// Transaction that writes evicted nodes to a block store and deletes them
/// from the heap.
struct PersistingTransaction {
    store: Arc<BlockStore>,
    flushed: Mutex<Vec<Vec<NodeId>>>,
    /// Transient id -> durable id of everything this transaction persisted.
    remapped: Mutex<HashMap<NodeId, NodeId>>,
}

impl PersistingTransaction {
    fn new(store: Arc<BlockStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            flushed: Mutex::new(Vec::new()),
            remapped: Mutex::new(HashMap::new()),
        })
    }
}

impl Transaction for PersistingTransaction {
    fn flush_nodes(&self, heap: &mut NodeHeap, ids: &[NodeId]) -> Result<()> {
        self.flushed.lock().push(ids.to_vec());
        for &id in ids {
            let node = heap.fetch(id).ok_or(AshError::NodeNotFound { node_id: id })?;
            let image = BlockStore::encode(node);
            let block = self.store.next_block.fetch_add(1, Ordering::Relaxed);
            let addr = DataAddress::new(block, 0);
            self.store.blocks.lock().insert(addr, image);
            self.remapped.lock().insert(id, NodeId::durable(addr));
            heap.delete(id)?;
        }
        Ok(())
    }
}

fn persisting(store: &Arc<BlockStore>) -> (Arc<PersistingTransaction>, TransactionRef) {
    let tx = PersistingTransaction::new(store.clone());
    let shared: Arc<dyn Transaction> = tx.clone();
    (tx, TransactionRef::from(shared))
}

fn write_leaf(heap: &mut NodeHeap, id: NodeId, pos: usize, data: &[u8]) {
    heap.fetch_mut(id)
        .unwrap()
        .as_leaf_mut()
        .unwrap()
        .write(pos, data)
        .unwrap();
}

fn leaf_bytes(heap: &NodeHeap, id: NodeId) -> Vec<u8> {
    heap.fetch(id).unwrap().as_leaf().unwrap().as_bytes().to_vec()
}

#[test]
fn test_leaf_footprint_is_408_at_capacity_300() {
    let store = Arc::new(BlockStore::default());
    let (_, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1000).unwrap();

    heap.create_leaf(&tx, 300).unwrap();
    assert_eq!(heap.memory_used(), 408);
    assert_eq!(ENTRY_OVERHEAD, 32);
}

#[test]
fn test_eviction_sizing_boundary() {
    let store = Arc::new(BlockStore::default());
    let (recorded, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1000).unwrap();

    heap.create_leaf(&tx, 300).unwrap();
    heap.create_leaf(&tx, 300).unwrap();
    assert_eq!(heap.memory_used(), 816);
    assert_eq!(heap.flush().unwrap().selected, 0);

    heap.create_leaf(&tx, 300).unwrap();
    assert_eq!(heap.memory_used(), 1224);
    // floor(3 * 0.30) = 0: over the limit, nothing to evict.
    let stats = heap.flush().unwrap();
    assert_eq!(stats.selected, 0);
    assert_eq!(stats.transactions, 0);
    assert_eq!(heap.len(), 3);
    assert!(recorded.flushed.lock().is_empty());
}

#[test]
fn test_eviction_batching_persists_oldest_three() {
    let store = Arc::new(BlockStore::default());
    let (recorded, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1000).unwrap();

    let ids: Vec<NodeId> = (0..10u8)
        .map(|i| {
            let id = heap.create_leaf(&tx, 300).unwrap();
            write_leaf(&mut heap, id, 0, &[i; 4]);
            id
        })
        .collect();

    let stats = heap.flush().unwrap();
    assert_eq!(stats.selected, 3);
    assert_eq!(stats.transactions, 1);

    let flushed = recorded.flushed.lock();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0], ids[..3].to_vec());
    assert!(flushed[0].windows(2).all(|w| w[0] < w[1]));

    for id in &ids[..3] {
        assert!(!heap.contains(*id));
    }
    for id in &ids[3..] {
        assert!(heap.contains(*id));
    }
    assert_eq!(heap.memory_used(), 7 * 408);
    assert_eq!(store.blocks.lock().len(), 3);

    // Persisted images carry the leaf payloads.
    let remapped = recorded.remapped.lock();
    let durable = remapped[&ids[1]];
    assert!(durable.is_durable());
    let addr = durable.data_address().unwrap();
    assert_eq!(store.blocks.lock()[&addr], Bytes::from_static(&[1, 1, 1, 1]));
    heap.verify_accounting().unwrap();
}

#[test]
fn test_cross_transaction_grouping() {
    let store = Arc::new(BlockStore::default());
    let (rec_a, tx_a) = persisting(&store);
    let (rec_b, tx_b) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1000).unwrap();

    // Oldest four belong to b, then a mixes in.
    let mut owner_of = HashMap::new();
    for i in 0..20 {
        let tx = if i < 4 || i % 3 == 0 { &tx_b } else { &tx_a };
        let id = heap.create_leaf(tx, 300).unwrap();
        owner_of.insert(id, tx.clone());
    }

    let stats = heap.flush().unwrap();
    assert_eq!(stats.selected, 6);
    assert_eq!(stats.transactions, 2);

    let calls_a = rec_a.flushed.lock();
    let calls_b = rec_b.flushed.lock();
    assert_eq!(calls_a.len(), 1);
    assert_eq!(calls_b.len(), 1);
    assert!(calls_a[0].iter().all(|id| owner_of[id] == tx_a));
    assert!(calls_b[0].iter().all(|id| owner_of[id] == tx_b));
    assert_eq!(calls_a[0].len() + calls_b[0].len(), 6);
    assert_eq!(heap.len(), 14);
}

#[test]
fn test_transaction_without_victims_not_called() {
    let store = Arc::new(BlockStore::default());
    let (rec_old, tx_old) = persisting(&store);
    let (rec_new, tx_new) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1000).unwrap();

    for _ in 0..5 {
        heap.create_leaf(&tx_old, 300).unwrap();
    }
    for _ in 0..5 {
        heap.create_leaf(&tx_new, 300).unwrap();
    }

    heap.flush().unwrap();
    assert_eq!(rec_old.flushed.lock().len(), 1);
    assert!(rec_new.flushed.lock().is_empty());
}

#[test]
fn test_repeated_flush_drains_to_limit() {
    let store = Arc::new(BlockStore::default());
    let (_, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 2000).unwrap();

    for _ in 0..40 {
        heap.create_leaf(&tx, 300).unwrap();
    }
    let mut passes = 0;
    while heap.is_over_limit() {
        let stats = heap.flush().unwrap();
        if stats.selected == 0 {
            break;
        }
        passes += 1;
        heap.verify_accounting().unwrap();
    }
    // 40 -> 28 -> 20 -> 14 -> 10 -> 7 -> 5 -> 4
    assert_eq!(passes, 7);
    assert_eq!(heap.len(), 4);
    assert!(!heap.is_over_limit());
}

#[test]
fn test_copy_on_write_of_persisted_leaf() {
    let store = Arc::new(BlockStore::default());
    let (_, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1 << 20).unwrap();

    // A node read back from block storage, not resident in the heap.
    let mut durable = TreeLeaf::new(64);
    durable.write(0, b"committed").unwrap();
    let durable = TreeNode::Leaf(durable);

    let copy = heap.copy(&durable, 24, 128, &tx).unwrap();
    assert!(copy.is_transient());
    heap.fetch_mut(copy)
        .unwrap()
        .as_leaf_mut()
        .unwrap()
        .shift(0, 4)
        .unwrap();
    write_leaf(&mut heap, copy, 0, b"new:");

    assert_eq!(leaf_bytes(&heap, copy), b"new:committed");
    assert_eq!(durable.as_leaf().unwrap().as_bytes(), b"committed");
    assert_eq!(heap.fetch(copy).unwrap().as_leaf().unwrap().capacity(), 128);
}

#[test]
fn test_copy_on_write_of_branch() {
    let store = Arc::new(BlockStore::default());
    let (_, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(32, 1 << 20).unwrap();

    let shape = TreeConfig::default();
    shape.validate().unwrap();
    let (fanout, leaf_size) = (shape.max_branch_children, shape.max_leaf_size);

    let left = heap.create_leaf(&tx, leaf_size).unwrap();
    let right = heap.create_leaf(&tx, leaf_size).unwrap();
    let root = heap.create_branch(&tx, fanout).unwrap();
    {
        let branch = heap.fetch_mut(root).unwrap().as_branch_mut().unwrap();
        branch.push(left, Key::MIN).unwrap();
        branch.push(right, Key::new(0, 100, 0)).unwrap();
    }

    // Mutating a leaf under a shared root: copy leaf, copy root, repoint.
    let new_right = heap.copy_resident(right, fanout, leaf_size, &tx).unwrap();
    let new_root = heap.copy_resident(root, fanout, leaf_size, &tx).unwrap();
    let index = {
        let branch = heap.fetch(new_root).unwrap().as_branch().unwrap();
        branch.search(&Key::new(0, 150, 0))
    };
    heap.fetch_mut(new_root)
        .unwrap()
        .as_branch_mut()
        .unwrap()
        .set_child(index, new_right)
        .unwrap();

    let old = heap.fetch(root).unwrap().as_branch().unwrap();
    assert_eq!(old.child(1).unwrap(), right);
    let new = heap.fetch(new_root).unwrap().as_branch().unwrap();
    assert_eq!(new.child(0).unwrap(), left);
    assert_eq!(new.child(1).unwrap(), new_right);

    // The old root is unreachable now; the transaction deletes it.
    heap.delete(root).unwrap();
    heap.delete(right).unwrap();
    assert_eq!(heap.branch_count(), 1);
    assert_eq!(heap.leaf_count(), 2);
    heap.verify_accounting().unwrap();
}

#[test]
fn test_fetch_delete_consistency() {
    let store = Arc::new(BlockStore::default());
    let (_, tx) = persisting(&store);
    let mut heap = NodeHeap::with_limits(8, 1 << 20).unwrap();

    let id = heap.create_branch(&tx, 4).unwrap();
    assert!(heap.fetch(id).unwrap().as_branch().unwrap().is_empty());

    heap.delete(id).unwrap();
    assert!(heap.fetch(id).is_none());
    assert!(heap.owner(id).is_none());
    assert!(matches!(
        heap.delete(id),
        Err(AshError::NodeNotFound { node_id }) if node_id == id
    ));

    // Durable ids are never resident.
    let durable = NodeId::durable(DataAddress::new(1, 1));
    assert!(heap.fetch(durable).is_none());
    assert!(heap.delete(durable).is_err());
}

#[test]
fn test_shared_heap_behind_one_lock() {
    let store = Arc::new(BlockStore::default());
    let heap = Arc::new(Mutex::new(NodeHeap::with_limits(256, 20_000).unwrap()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let heap = heap.clone();
            let (_, tx) = persisting(&store);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..50 {
                    let mut heap = heap.lock();
                    mine.push(heap.create_leaf(&tx, 300).unwrap());
                    // flush_nodes runs on this thread with the lock held.
                    heap.flush().unwrap();
                }
                mine
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    let heap = heap.lock();
    let mut unique = all.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 200);
    assert_eq!(heap.len() + store.blocks.lock().len(), 200);
    heap.verify_accounting().unwrap();
}
