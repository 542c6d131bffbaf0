//! Tree-index to transform-row allocator.

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::packing::{BYTES_PER_FLOAT, pack_float, unpack_float};
use crate::table::{FreeList, RowTable};

/// Rows allocated before the first growth.
pub const DEFAULT_INITIAL_CAPACITY: u32 = 16;

const FLOATS_PER_ROW: usize = 16;
const ROW_BYTES: usize = FLOATS_PER_ROW * BYTES_PER_FLOAT;

/// Where a [`TransformOverrideAllocator::set`] landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverrideWrite {
    /// Table row holding the transform.
    pub row: u32,
    /// The table doubled to make room for this write.
    pub grew: bool,
}

/// Table of per-object transform overrides, one 64-byte row per object.
///
/// Each row holds a column-major 4x4 matrix with every float packed into
/// four bytes, so the table can be uploaded as-is to an RGBA8 texture with
/// one texel per float. Row `r`, element `i` lives at texel `r * 16 + i`.
///
/// Element order is glam's column-major order, so texels `r * 16 + 4 * c`
/// through `r * 16 + 4 * c + 3` hold column `c` and map directly onto a
/// WGSL `mat4x4<f32>` built from four `vec4` columns. This is the transpose
/// of a row-major table, so a shader written for row-major rows must drop
/// its transpose when reading this one.
#[derive(Clone, Debug)]
pub struct TransformOverrideAllocator {
    table: RowTable,
    free: FreeList,
    rows: FxHashMap<u32, u32>,
    dirty: bool,
    generation: u64,
}

impl Default for TransformOverrideAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformOverrideAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// Allocator with room for `rows` overrides, rounded up to a power of two.
    #[must_use]
    pub fn with_capacity(rows: u32) -> Self {
        let rows = rows.max(1).next_power_of_two();
        Self {
            table: RowTable::new(ROW_BYTES, rows),
            free: FreeList::with_range(0..rows),
            rows: FxHashMap::default(),
            dirty: true,
            generation: 0,
        }
    }

    /// Write the override for `tree_index`, allocating a row on first use.
    pub fn set(&mut self, tree_index: u32, transform: &Mat4) -> OverrideWrite {
        let mut grew = false;
        let row = match self.rows.get(&tree_index) {
            Some(&row) => row,
            None => {
                let row = match self.free.allocate() {
                    Some(row) => row,
                    None => {
                        self.grow();
                        grew = true;
                        // Growth always adds at least one row.
                        self.free.allocate().unwrap_or(self.table.rows() - 1)
                    }
                };
                self.rows.insert(tree_index, row);
                row
            }
        };

        let bytes = self.table.row_mut(row);
        for (element, value) in transform.to_cols_array().into_iter().enumerate() {
            let start = element * BYTES_PER_FLOAT;
            bytes[start..start + BYTES_PER_FLOAT].copy_from_slice(&pack_float(value));
        }
        self.dirty = true;

        OverrideWrite { row, grew }
    }

    /// Drop the override for `tree_index` and return its freed row.
    ///
    /// The row's bytes stay stale until it is reused; no valid index points
    /// at a free row.
    pub fn remove(&mut self, tree_index: u32) -> Option<u32> {
        let row = self.rows.remove(&tree_index)?;
        self.free.release(row);
        Some(row)
    }

    /// Decoded transform currently stored for `tree_index`.
    #[must_use]
    pub fn get(&self, tree_index: u32) -> Option<Mat4> {
        let row = *self.rows.get(&tree_index)?;
        let bytes = self.table.row(row);
        let mut cols = [0.0f32; FLOATS_PER_ROW];
        for (element, value) in cols.iter_mut().enumerate() {
            let start = element * BYTES_PER_FLOAT;
            let mut packed = [0u8; BYTES_PER_FLOAT];
            packed.copy_from_slice(&bytes[start..start + BYTES_PER_FLOAT]);
            *value = unpack_float(packed);
        }
        Some(Mat4::from_cols_array(&cols))
    }

    #[must_use]
    pub fn row(&self, tree_index: u32) -> Option<u32> {
        self.rows.get(&tree_index).copied()
    }

    /// Live overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in the backing table.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.table.rows()
    }

    /// Packed table contents, `capacity() * 64` bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.table.as_bytes()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning whether an upload is due.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Bumped on every growth; GPU mirrors recreate their texture when it changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Texture size covering the whole table.
    #[must_use]
    pub fn texture_size(&self) -> (u32, u32) {
        texture_dimensions(self.capacity())
    }

    fn grow(&mut self) {
        let old = self.table.rows();
        let added = self.table.grow_to(old * 2);
        self.free.extend(added);
        self.generation += 1;
        tracing::debug!(from = old, to = self.table.rows(), "grew transform override table");
    }
}

/// Power-of-two texture size holding `rows * 16` texels, width >= height.
#[must_use]
pub fn texture_dimensions(rows: u32) -> (u32, u32) {
    let texels = u64::from(rows.max(1)) * FLOATS_PER_ROW as u64;
    let width = ((texels as f64).sqrt().ceil() as u64).next_power_of_two();
    let height = texels.div_ceil(width).next_power_of_two();
    (width as u32, height as u32)
}
