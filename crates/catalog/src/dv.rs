//! Per-chunk deletion vectors.

use roaring::RoaringBitmap;

/// A deletion vector for one `(data file, chunk)` pair.
///
/// Bit `k` set means the row at `chunk_start + k` is logically deleted.
/// Offsets are bounded by the engine's vector size; a vector exists only
/// while at least one row in its chunk is deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionVector {
    bits: RoaringBitmap,
}

impl DeletionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the row at `offset` deleted. Returns `false` if the bit was
    /// already set.
    pub fn mark(&mut self, offset: u32) -> bool {
        self.bits.insert(offset)
    }

    /// Constant-time deleted-bit test.
    pub fn is_deleted(&self, offset: u32) -> bool {
        self.bits.contains(offset)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of deleted rows in this chunk.
    pub fn cardinality(&self) -> u64 {
        self.bits.len()
    }

    /// OR-merges `other` into `self`.
    pub fn union_with(&mut self, other: &DeletionVector) {
        self.bits |= &other.bits;
    }

    /// The bits set in `self` but not in `other`.
    pub fn difference(&self, other: &DeletionVector) -> DeletionVector {
        DeletionVector {
            bits: &self.bits - &other.bits,
        }
    }

    /// Set offsets in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    /// Serializes to roaring's portable wire format for lake persistence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.bits.serialized_size());
        self.bits
            .serialize_into(&mut buf)
            .expect("serializing into a Vec cannot fail");
        buf
    }

    /// Deserializes from roaring's portable wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeletionVectorDecodeError> {
        let bits =
            RoaringBitmap::deserialize_from(bytes).map_err(DeletionVectorDecodeError)?;
        Ok(Self { bits })
    }
}

/// The stored bitmap bytes could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode deletion vector")]
pub struct DeletionVectorDecodeError(#[source] std::io::Error);
