//! Sector id encoding in RGBA8 pixels and the coverage stipple pattern.
//!
//! Encoded ids are 24-bit and stored big-endian in R, G, B; alpha is unused.
//! Id 0 is reserved for empty pixels, so the clear color is transparent black.

use bytemuck::{Pod, Zeroable};

/// Encoded id of a pixel no sector covered.
pub const EMPTY_ID: u32 = 0;

/// Largest encodable id.
pub const MAX_ENCODED_ID: u32 = 0x00ff_ffff;

#[must_use]
pub fn encode_rgba(id: u32) -> [u8; 4] {
    [(id >> 16) as u8, (id >> 8) as u8, id as u8, 255]
}

#[must_use]
pub fn decode_rgba(pixel: [u8; 4]) -> u32 {
    (u32::from(pixel[0]) << 16) | (u32::from(pixel[1]) << 8) | u32::from(pixel[2])
}

/// One candidate box as uploaded to the coverage pass. Model-space bounds.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SectorInstance {
    pub min: [f32; 3],
    pub encoded_id: u32,
    pub max: [f32; 3],
    /// Fraction of the box's pixels kept; lets sparse parents reveal children.
    pub coverage: f32,
}

impl SectorInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
        wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: 12,
            shader_location: 1,
            format: wgpu::VertexFormat::Uint32,
        },
        wgpu::VertexAttribute {
            offset: 16,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: 28,
            shader_location: 3,
            format: wgpu::VertexFormat::Float32,
        },
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SectorInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Integer hash of a pixel position. Mirrored in the coverage shader.
fn pixel_hash(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841);
    h = (h ^ (h >> 16)).wrapping_mul(0x7feb_352d);
    h ^ (h >> 15)
}

/// Whether a box with the given coverage writes pixel `(x, y)`.
#[must_use]
pub fn stipple_keep(x: u32, y: u32, coverage: f32) -> bool {
    if coverage >= 1.0 {
        return true;
    }
    let threshold = (pixel_hash(x, y) & 0xffff) as f32 / 65536.0;
    threshold < coverage
}
