//! GPU-resident per-object transform overrides.
//!
//! [`TransformOverrideAllocator`] maps an object's tree index to a row of a
//! byte table holding its 4x4 transform as 16 packed floats. The table grows
//! by doubling and is mirrored to an RGBA8 texture by [`OverrideTexture`].

mod allocator;
mod packing;
mod table;
mod texture;

pub use allocator::{
    DEFAULT_INITIAL_CAPACITY, OverrideWrite, TransformOverrideAllocator, texture_dimensions,
};
pub use packing::{BYTES_PER_FLOAT, pack_float, unpack_float};
pub use table::{FreeList, RowTable};
pub use texture::OverrideTexture;
