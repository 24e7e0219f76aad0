//! Node identifiers for ashdb trees.

use serde::{Deserialize, Serialize};

use crate::error::{AshError, Result};

/// Range discriminator for ids that resolve to block storage.
const DURABLE_TAG: u8 = 0x00;

/// Range discriminator for ids of heap-resident nodes.
const TRANSIENT_TAG: u8 = 0x01;

/// Bits of `high` that carry the range discriminator.
const TAG_SHIFT: u32 = 56;

/// Mask applied to transient sequence numbers (63 bits).
pub const SEQUENCE_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Location of a node in persistent block storage.
///
/// The heap never dereferences an address; it only needs ordering and
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataAddress {
    /// Block identifier.
    pub block_id: u64,
    /// Slot of the node within the block.
    pub data_id: u16,
}

impl DataAddress {
    /// Creates a new DataAddress.
    pub fn new(block_id: u64, data_id: u16) -> Self {
        Self { block_id, data_id }
    }
}

impl std::fmt::Display for DataAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.block_id, self.data_id)
    }
}

/// Identifier of a tree node.
///
/// 128 bits split into two disjoint ranges selected by the top byte of
/// `high`:
/// - durable: `high = block_id >> 48`, `low = (block_id << 16) | data_id`
/// - transient: `high = 0x01 << 56`, `low = sequence`
///
/// Ordering is `(high, low)`, so every durable id sorts before every
/// transient id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawNodeId")]
pub struct NodeId {
    high: u64,
    low: u64,
}

/// Unchecked wire form of a [`NodeId`].
#[derive(Deserialize)]
struct RawNodeId {
    high: u64,
    low: u64,
}

impl TryFrom<RawNodeId> for NodeId {
    type Error = AshError;

    fn try_from(raw: RawNodeId) -> Result<Self> {
        NodeId::from_parts(raw.high, raw.low)
    }
}

impl NodeId {
    /// Creates a transient id for the given heap sequence number.
    #[inline]
    pub fn transient(sequence: u64) -> Self {
        Self {
            high: (TRANSIENT_TAG as u64) << TAG_SHIFT,
            low: sequence & SEQUENCE_MASK,
        }
    }

    /// Creates a durable id for a block storage location.
    #[inline]
    pub fn durable(addr: DataAddress) -> Self {
        Self {
            high: addr.block_id >> 48,
            low: (addr.block_id << 16) | addr.data_id as u64,
        }
    }

    /// Decodes an id from its raw halves.
    pub fn from_parts(high: u64, low: u64) -> Result<Self> {
        match (high >> TAG_SHIFT) as u8 {
            DURABLE_TAG => {
                if high > 0xFFFF {
                    return Err(AshError::invalid(format!(
                        "durable node id high word out of range: {high:#x}"
                    )));
                }
                Ok(Self { high, low })
            }
            TRANSIENT_TAG => {
                if high != (TRANSIENT_TAG as u64) << TAG_SHIFT || low > SEQUENCE_MASK {
                    return Err(AshError::invalid(format!(
                        "malformed transient node id: {high:#x}:{low:#x}"
                    )));
                }
                Ok(Self { high, low })
            }
            tag => Err(AshError::invalid(format!(
                "unknown node id discriminator: {tag:#04x}"
            ))),
        }
    }

    /// Returns the high 64 bits.
    #[inline]
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Returns the low 64 bits.
    #[inline]
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Returns true if the node lives only in the heap.
    #[inline]
    pub fn is_transient(&self) -> bool {
        (self.high >> TAG_SHIFT) as u8 == TRANSIENT_TAG
    }

    /// Returns true if the node resolves to block storage.
    #[inline]
    pub fn is_durable(&self) -> bool {
        (self.high >> TAG_SHIFT) as u8 == DURABLE_TAG
    }

    /// Returns the heap sequence number of a transient id.
    pub fn sequence(&self) -> Option<u64> {
        self.is_transient().then_some(self.low)
    }

    /// Returns the storage location of a durable id.
    pub fn data_address(&self) -> Option<DataAddress> {
        if !self.is_durable() {
            return None;
        }
        Some(DataAddress {
            block_id: (self.high << 48) | (self.low >> 16),
            data_id: self.low as u16,
        })
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data_address() {
            Some(addr) => write!(f, "d:{addr}"),
            None => write!(f, "t:{}", self.low),
        }
    }
}
