//! Index-based storage primitives behind the override table.

/// Fixed-width rows in one contiguous byte buffer.
///
/// Growth allocates the larger buffer, copies every existing row, and swaps
/// it in as one step; row `i` keeps its contents and index across growth.
#[derive(Clone, Debug)]
pub struct RowTable {
    bytes: Vec<u8>,
    row_bytes: usize,
    rows: u32,
}

impl RowTable {
    pub fn new(row_bytes: usize, rows: u32) -> Self {
        Self {
            bytes: vec![0; row_bytes * rows as usize],
            row_bytes,
            rows,
        }
    }

    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of row `index`. Panics if the row is out of range.
    #[must_use]
    pub fn row(&self, index: u32) -> &[u8] {
        let start = index as usize * self.row_bytes;
        &self.bytes[start..start + self.row_bytes]
    }

    pub fn row_mut(&mut self, index: u32) -> &mut [u8] {
        let start = index as usize * self.row_bytes;
        &mut self.bytes[start..start + self.row_bytes]
    }

    /// Grow to `rows` rows, preserving existing rows. Returns the range of
    /// newly added row indices (empty if `rows` is not larger).
    pub fn grow_to(&mut self, rows: u32) -> std::ops::Range<u32> {
        if rows <= self.rows {
            return self.rows..self.rows;
        }
        let mut bytes = vec![0; self.row_bytes * rows as usize];
        bytes[..self.bytes.len()].copy_from_slice(&self.bytes);
        self.bytes = bytes;
        let added = self.rows..rows;
        self.rows = rows;
        added
    }
}

/// LIFO free list of row indices.
#[derive(Clone, Debug, Default)]
pub struct FreeList {
    free: Vec<u32>,
}

impl FreeList {
    /// Free list holding every index in `range`, lowest handed out first.
    pub fn with_range(range: std::ops::Range<u32>) -> Self {
        let mut list = Self::default();
        list.extend(range);
        list
    }

    /// Add fresh indices; the lowest of them is handed out next.
    pub fn extend(&mut self, range: std::ops::Range<u32>) {
        self.free.extend(range.rev());
    }

    pub fn allocate(&mut self) -> Option<u32> {
        self.free.pop()
    }

    /// Return an index; it is the next one handed out.
    pub fn release(&mut self, index: u32) {
        debug_assert!(!self.free.contains(&index), "row {index} released twice");
        self.free.push(index);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}
