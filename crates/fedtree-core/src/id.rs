//! Identity types for the federation overlay
//!
//! Broker ids are 64-bit integers assigned by configuration. They are
//! compared numerically: parent admission and eviction favour lower ids.

use std::fmt;

/// Broker identity - unique per broker in the overlay
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BrokerId(pub u64);

impl BrokerId {
    #[inline]
    pub fn new(id: u64) -> Self {
        BrokerId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        BrokerId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Broker({})", self.0)
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BrokerId {
    fn from(id: u64) -> Self {
        BrokerId(id)
    }
}

/// Publication identity - deduplication key for routed publications.
///
/// Sequence numbers are allocated per topic by the originating broker and
/// never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PubId {
    pub origin: BrokerId,
    pub seq: u64,
}

impl PubId {
    /// Encoded size on the wire
    pub const SIZE: usize = 16;

    #[inline]
    pub fn new(origin: BrokerId, seq: u64) -> Self {
        PubId { origin, seq }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.origin.to_bytes());
        buf[8..16].copy_from_slice(&self.seq.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let mut origin = [0u8; 8];
        let mut seq = [0u8; 8];
        origin.copy_from_slice(&bytes[0..8]);
        seq.copy_from_slice(&bytes[8..16]);
        PubId {
            origin: BrokerId::from_bytes(origin),
            seq: u64::from_le_bytes(seq),
        }
    }
}

impl fmt::Debug for PubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pub({}:{})", self.origin.0, self.seq)
    }
}
