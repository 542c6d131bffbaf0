//! Sector hierarchy for a streamed model: metadata parsing, the immutable
//! [`SectorTree`] arena, and the detailed/simple [`Classification`] rule.

mod error;
mod id;
mod metadata;
mod quality;
mod tree;

pub use error::MetadataCorruptError;
pub use id::{Fidelity, ModelId, SectorId};
pub use metadata::{
    BoundingBoxRecord, CoverageFactors, FacesFile, IndexFile, ModelMetadata, Point3Record,
    SectorRecord,
};
pub use quality::{Classification, resolve_quality};
pub use tree::{Ancestors, Descendants, Sector, SectorTree};
