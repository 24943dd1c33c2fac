//! Packed logical row identifiers.

/// A 64-bit logical row id: file number in the high 32 bits, file row
/// number in the low 32 bits.
///
/// The file number is the row's file's position in the table's ordered
/// file list at scan time, so a row id is only meaningful within one
/// scan's file-list snapshot and is not stable across compactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(i64);

impl RowId {
    pub fn new(file_number: u32, file_row_number: u32) -> Self {
        Self(((file_number as i64) << 32) | file_row_number as i64)
    }

    pub fn from_i64(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Index of the row's file in the scan-time file list.
    pub fn file_number(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Zero-based row index within the file, in insertion order.
    pub fn file_row_number(&self) -> u32 {
        self.0 as u32
    }

    /// The chunk the row falls in, at the given vector width.
    pub fn chunk_index(&self, vector_size: u64) -> u64 {
        self.file_row_number() as u64 / vector_size
    }

    /// The row's offset within its chunk.
    pub fn offset_in_chunk(&self, vector_size: u64) -> u32 {
        (self.file_row_number() as u64 % vector_size) as u32
    }
}

impl From<RowId> for i64 {
    fn from(row_id: RowId) -> Self {
        row_id.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_number(), self.file_row_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let id = RowId::new(3, 70_000);
        assert_eq!(id.file_number(), 3);
        assert_eq!(id.file_row_number(), 70_000);
        assert_eq!(id.as_i64(), (3i64 << 32) | 70_000);
        assert_eq!(RowId::from_i64(id.as_i64()), id);
    }

    #[test]
    fn boundary_values() {
        let id = RowId::new(0, u32::MAX);
        assert_eq!(id.file_number(), 0);
        assert_eq!(id.file_row_number(), u32::MAX);

        let id = RowId::new(u32::MAX >> 1, 0);
        assert_eq!(id.file_number(), u32::MAX >> 1);
        assert_eq!(id.file_row_number(), 0);
    }

    #[test]
    fn chunk_math() {
        let id = RowId::new(0, 5000);
        assert_eq!(id.chunk_index(2048), 2);
        assert_eq!(id.offset_in_chunk(2048), 5000 - 2 * 2048);
    }
}
