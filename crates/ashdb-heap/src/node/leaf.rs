//! Leaf nodes: bounded byte buffers holding variable-length records.

use ashdb_common::{AshError, Result};
use bytes::Bytes;

/// Fixed per-leaf overhead (header, length, allocation slack).
const LEAF_BASE_FOOTPRINT: u64 = 8 + 4 + 64;

/// Payload-bearing tree node.
///
/// The buffer is allocated at full capacity up front; `len` tracks the
/// logical end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLeaf {
    data: Box<[u8]>,
    len: usize,
}

impl TreeLeaf {
    /// Creates an empty leaf with room for `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Copies the payload of `other` into a leaf of `capacity` bytes.
    pub fn copy_bounded(other: &TreeLeaf, capacity: usize) -> Result<Self> {
        if other.len > capacity {
            return Err(AshError::invalid(format!(
                "leaf payload of {} bytes does not fit capacity {}",
                other.len, capacity
            )));
        }
        let mut leaf = Self::new(capacity);
        leaf.data[..other.len].copy_from_slice(other.as_bytes());
        leaf.len = other.len;
        Ok(leaf)
    }

    /// Returns the logical payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum payload length.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the payload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Returns an owned image of the payload for persisting.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Reads `buf.len()` bytes starting at `position`.
    pub fn read(&self, position: usize, buf: &mut [u8]) -> Result<()> {
        let end = position
            .checked_add(buf.len())
            .filter(|&end| end <= self.len)
            .ok_or_else(|| {
                AshError::invalid(format!(
                    "leaf read {}..+{} past length {}",
                    position,
                    buf.len(),
                    self.len
                ))
            })?;
        buf.copy_from_slice(&self.data[position..end]);
        Ok(())
    }

    /// Writes `src` at `position`, extending the length if the write ends
    /// past it.
    pub fn write(&mut self, position: usize, src: &[u8]) -> Result<()> {
        let end = position
            .checked_add(src.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                AshError::invalid(format!(
                    "leaf write {}..+{} past capacity {}",
                    position,
                    src.len(),
                    self.data.len()
                ))
            })?;
        self.data[position..end].copy_from_slice(src);
        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    /// Moves the bytes in `[position, len)` by `offset` and adjusts the
    /// length by the same amount.
    ///
    /// A positive offset opens a gap at `position`; a negative one closes the
    /// gap before it, overwriting those bytes.
    pub fn shift(&mut self, position: usize, offset: i64) -> Result<()> {
        if offset == 0 {
            return Ok(());
        }
        if position > self.len {
            return Err(AshError::invalid(format!(
                "leaf shift position {} past length {}",
                position, self.len
            )));
        }

        let out_of_range = || {
            AshError::invalid(format!(
                "leaf shift of {} at {} out of range (len {}, capacity {})",
                offset,
                position,
                self.len,
                self.data.len()
            ))
        };
        let new_len = (self.len as i64)
            .checked_add(offset)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= self.data.len())
            .ok_or_else(out_of_range)?;
        let dest = (position as i64)
            .checked_add(offset)
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(out_of_range)?;

        self.data.copy_within(position..self.len, dest);
        self.len = new_len;
        Ok(())
    }

    /// Sets the logical payload length.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.data.len() {
            return Err(AshError::invalid(format!(
                "leaf length {} out of range (capacity {})",
                len,
                self.data.len()
            )));
        }
        self.len = len;
        Ok(())
    }

    /// Estimated resident size in bytes, excluding heap bookkeeping.
    pub fn memory_footprint(&self) -> u64 {
        LEAF_BASE_FOOTPRINT + self.data.len() as u64
    }
}
