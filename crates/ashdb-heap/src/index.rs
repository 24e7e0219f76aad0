//! Hash index mapping node ids to heap slots.

use ashdb_common::NodeId;

use crate::slot::SlotId;

/// Chain link stored per slot.
#[derive(Clone, Copy)]
struct Link {
    id: NodeId,
    next: Option<SlotId>,
}

/// Separate-chaining hash index from NodeId to SlotId.
///
/// Buckets hold the head of a singly-linked chain; chain links live in a
/// side table addressed by slot, so the index owns no node content. The
/// bucket count only affects chain length, never correctness.
pub struct NodeIndex {
    /// Head slot of each bucket's chain.
    buckets: Box<[Option<SlotId>]>,
    /// Chain link of each slot (None when the slot is not indexed).
    links: Vec<Option<Link>>,
    /// Number of indexed ids.
    len: usize,
}

impl NodeIndex {
    /// Creates an index with `num_buckets` buckets (at least one).
    pub fn new(num_buckets: usize) -> Self {
        Self {
            buckets: vec![None; num_buckets.max(1)].into_boxed_slice(),
            links: Vec::new(),
            len: 0,
        }
    }

    /// Returns the bucket count.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of indexed ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Computes the bucket for an id.
    #[inline(always)]
    fn bucket(&self, id: &NodeId) -> usize {
        // FxHash-style multiply for distribution
        let mixed = (id.high().rotate_left(17) ^ id.low()).wrapping_mul(0x517cc1b727220a95);
        (mixed % self.buckets.len() as u64) as usize
    }

    /// Looks up the slot holding `id`.
    #[inline]
    pub fn get(&self, id: &NodeId) -> Option<SlotId> {
        let mut cursor = self.buckets[self.bucket(id)];
        while let Some(slot) = cursor {
            let link = self.links[slot.index()]?;
            if link.id == *id {
                return Some(slot);
            }
            cursor = link.next;
        }
        None
    }

    /// Returns true if `id` is indexed.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Indexes `id` at `slot`, pushing it on the front of its chain.
    ///
    /// The caller guarantees `id` is not already indexed.
    pub fn insert(&mut self, id: NodeId, slot: SlotId) {
        debug_assert!(!self.contains(&id), "duplicate node id {id}");
        if slot.index() >= self.links.len() {
            self.links.resize(slot.index() + 1, None);
        }
        let bucket = self.bucket(&id);
        self.links[slot.index()] = Some(Link {
            id,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(slot);
        self.len += 1;
    }

    /// Unlinks `id` from its chain. Returns the slot it occupied.
    pub fn remove(&mut self, id: &NodeId) -> Option<SlotId> {
        let bucket = self.bucket(id);
        let mut previous: Option<SlotId> = None;
        let mut cursor = self.buckets[bucket];

        while let Some(slot) = cursor {
            let link = self.links[slot.index()]?;
            if link.id == *id {
                match previous {
                    None => self.buckets[bucket] = link.next,
                    Some(prev) => {
                        if let Some(prev_link) = self.links[prev.index()].as_mut() {
                            prev_link.next = link.next;
                        }
                    }
                }
                self.links[slot.index()] = None;
                self.len -= 1;
                return Some(slot);
            }
            previous = Some(slot);
            cursor = link.next;
        }
        None
    }

    /// Returns the length of the longest chain.
    pub fn max_chain_len(&self) -> usize {
        self.buckets
            .iter()
            .map(|head| {
                let mut n = 0;
                let mut cursor = *head;
                while let Some(slot) = cursor {
                    n += 1;
                    cursor = self.links[slot.index()].and_then(|l| l.next);
                }
                n
            })
            .max()
            .unwrap_or(0)
    }
}
