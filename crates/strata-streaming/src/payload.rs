//! Binary sector payloads and their decoded geometry.
//!
//! Layout, all little-endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | magic `SSEC` |
//! | 4 | 2 | version |
//! | 6 | 1 | fidelity (0 simple, 1 detailed) |
//! | 7 | 1 | reserved |
//! | 8 | 4 | element count |
//! | 12 | 4 | index count |
//! | 16 | .. | elements, then `u32` indices |

use bytemuck::{Pod, Zeroable};
use strata_sector::Fidelity;

pub const PAYLOAD_MAGIC: [u8; 4] = *b"SSEC";
pub const PAYLOAD_VERSION: u16 = 1;
const HEADER_LEN: usize = 16;

/// Coarse primitive of a simple payload: an oriented quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadPrimitive {
    pub center: [f32; 3],
    pub normal: [f32; 3],
    pub size: [f32; 2],
    pub color: u32,
}

/// Vertex of a detailed payload mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: u32,
    /// Object key used to look up transform overrides.
    pub tree_index: u32,
}

/// Renderable data decoded from one payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SectorGeometry {
    Simple {
        quads: Vec<QuadPrimitive>,
    },
    Detailed {
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
    },
}

impl SectorGeometry {
    #[must_use]
    pub fn fidelity(&self) -> Fidelity {
        match self {
            SectorGeometry::Simple { .. } => Fidelity::Simple,
            SectorGeometry::Detailed { .. } => Fidelity::Detailed,
        }
    }

    /// Approximate resident size, used for memory budgeting.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            SectorGeometry::Simple { quads } => std::mem::size_of_val(quads.as_slice()),
            SectorGeometry::Detailed { vertices, indices } => {
                std::mem::size_of_val(vertices.as_slice()) + std::mem::size_of_val(indices.as_slice())
            }
        }
    }

    #[must_use]
    pub fn primitive_count(&self) -> usize {
        match self {
            SectorGeometry::Simple { quads } => quads.len(),
            SectorGeometry::Detailed { indices, .. } => indices.len() / 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is {len} bytes, shorter than its header")]
    TooShort { len: usize },

    #[error("payload magic {found:?} is not SSEC")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u16),

    #[error("payload holds {found} geometry, {expected} was requested")]
    FidelityMismatch { expected: Fidelity, found: Fidelity },

    #[error("unknown fidelity tag {0}")]
    UnknownFidelity(u8),

    #[error("payload body is {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("simple payload declares {0} indices")]
    UnexpectedIndices(u32),

    #[error("index count {0} is not a multiple of 3")]
    PartialTriangle(u32),

    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: u32 },
}

/// Decodes raw payload bytes. Runs on fetch worker threads.
pub trait SectorPayloadParser: Send + Sync {
    fn parse(&self, fidelity: Fidelity, bytes: &[u8]) -> Result<SectorGeometry, PayloadError>;
}

/// Parser for the `SSEC` layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryPayloadParser;

struct Header {
    fidelity: Fidelity,
    element_count: u32,
    index_count: u32,
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn fidelity_tag(fidelity: Fidelity) -> u8 {
    match fidelity {
        Fidelity::Simple => 0,
        Fidelity::Detailed => 1,
    }
}

fn read_header(bytes: &[u8]) -> Result<Header, PayloadError> {
    if bytes.len() < HEADER_LEN {
        return Err(PayloadError::TooShort { len: bytes.len() });
    }
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != PAYLOAD_MAGIC {
        return Err(PayloadError::BadMagic { found: magic });
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != PAYLOAD_VERSION {
        return Err(PayloadError::UnsupportedVersion(version));
    }
    let fidelity = match bytes[6] {
        0 => Fidelity::Simple,
        1 => Fidelity::Detailed,
        tag => return Err(PayloadError::UnknownFidelity(tag)),
    };
    Ok(Header {
        fidelity,
        element_count: read_u32(bytes, 8),
        index_count: read_u32(bytes, 12),
    })
}

fn read_elements<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

impl SectorPayloadParser for BinaryPayloadParser {
    fn parse(&self, fidelity: Fidelity, bytes: &[u8]) -> Result<SectorGeometry, PayloadError> {
        let header = read_header(bytes)?;
        if header.fidelity != fidelity {
            return Err(PayloadError::FidelityMismatch {
                expected: fidelity,
                found: header.fidelity,
            });
        }

        let element_size = match fidelity {
            Fidelity::Simple => std::mem::size_of::<QuadPrimitive>(),
            Fidelity::Detailed => std::mem::size_of::<MeshVertex>(),
        };
        let elements_len = header.element_count as usize * element_size;
        let indices_len = header.index_count as usize * 4;
        let body = &bytes[HEADER_LEN..];
        if body.len() != elements_len + indices_len {
            return Err(PayloadError::LengthMismatch {
                expected: elements_len + indices_len,
                actual: body.len(),
            });
        }
        let (elements, indices) = body.split_at(elements_len);

        match fidelity {
            Fidelity::Simple => {
                if header.index_count != 0 {
                    return Err(PayloadError::UnexpectedIndices(header.index_count));
                }
                Ok(SectorGeometry::Simple {
                    quads: read_elements(elements),
                })
            }
            Fidelity::Detailed => {
                if header.index_count % 3 != 0 {
                    return Err(PayloadError::PartialTriangle(header.index_count));
                }
                let indices: Vec<u32> = read_elements(indices);
                let vertex_count = header.element_count;
                if let Some(&index) = indices.iter().find(|&&i| i >= vertex_count) {
                    return Err(PayloadError::IndexOutOfRange {
                        index,
                        vertex_count,
                    });
                }
                Ok(SectorGeometry::Detailed {
                    vertices: read_elements(elements),
                    indices,
                })
            }
        }
    }
}

fn encode(fidelity: Fidelity, elements: &[u8], element_count: usize, indices: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + elements.len() + indices.len() * 4);
    out.extend_from_slice(&PAYLOAD_MAGIC);
    out.extend_from_slice(&PAYLOAD_VERSION.to_le_bytes());
    out.push(fidelity_tag(fidelity));
    out.push(0);
    out.extend_from_slice(&(element_count as u32).to_le_bytes());
    out.extend_from_slice(&(indices.len() as u32).to_le_bytes());
    out.extend_from_slice(elements);
    for index in indices {
        out.extend_from_slice(&index.to_le_bytes());
    }
    out
}

/// Serialize a simple payload.
#[must_use]
pub fn encode_simple(quads: &[QuadPrimitive]) -> Vec<u8> {
    encode(Fidelity::Simple, bytemuck::cast_slice(quads), quads.len(), &[])
}

/// Serialize a detailed payload.
#[must_use]
pub fn encode_detailed(vertices: &[MeshVertex], indices: &[u32]) -> Vec<u8> {
    encode(
        Fidelity::Detailed,
        bytemuck::cast_slice(vertices),
        vertices.len(),
        indices,
    )
}
