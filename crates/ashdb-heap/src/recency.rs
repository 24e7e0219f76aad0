//! Creation-order recency list for heap eviction.

use crate::slot::SlotId;

#[derive(Clone, Copy, Default)]
struct Links {
    prev: Option<SlotId>,
    next: Option<SlotId>,
    linked: bool,
}

/// Doubly-linked list of slots addressed by index.
///
/// The head is the most recently created or copied node, the tail the least
/// recent. Reads never reorder the list: only `push_front` and `remove`
/// change it.
pub struct RecencyList {
    links: Vec<Links>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl Default for RecencyList {
    fn default() -> Self {
        Self::new()
    }
}

impl RecencyList {
    pub fn new() -> Self {
        Self {
            links: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of linked slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if `slot` is linked.
    pub fn contains(&self, slot: SlotId) -> bool {
        self.links.get(slot.index()).is_some_and(|l| l.linked)
    }

    /// Links `slot` as the most recent entry.
    pub fn push_front(&mut self, slot: SlotId) {
        if slot.index() >= self.links.len() {
            self.links.resize(slot.index() + 1, Links::default());
        }
        debug_assert!(!self.links[slot.index()].linked, "{slot} already linked");

        self.links[slot.index()] = Links {
            prev: None,
            next: self.head,
            linked: true,
        };
        match self.head {
            Some(old_head) => self.links[old_head.index()].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.len += 1;
    }

    /// Unlinks `slot`, patching its neighbours. Returns false if it was not
    /// linked.
    pub fn remove(&mut self, slot: SlotId) -> bool {
        if !self.contains(slot) {
            return false;
        }
        let Links { prev, next, .. } = self.links[slot.index()];

        match prev {
            Some(p) => self.links[p.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links[n.index()].prev = prev,
            None => self.tail = prev,
        }

        self.links[slot.index()] = Links::default();
        self.len -= 1;
        true
    }

    /// Iterates from the least recent slot toward the most recent.
    pub fn iter_from_tail(&self) -> impl Iterator<Item = SlotId> + '_ {
        std::iter::successors(self.tail, move |s| self.links[s.index()].prev)
    }

    /// Iterates from the most recent slot toward the least recent.
    pub fn iter_from_head(&self) -> impl Iterator<Item = SlotId> + '_ {
        std::iter::successors(self.head, move |s| self.links[s.index()].next)
    }
}
