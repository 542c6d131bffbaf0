use glam::Vec3;

use crate::SectorId;

/// Model metadata that cannot form a valid sector tree.
///
/// Loading a model fails as a whole on any of these; no partial tree is built.
#[derive(Debug, thiserror::Error)]
pub enum MetadataCorruptError {
    /// The document is not valid metadata JSON.
    #[error("failed to parse model metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model metadata contains no sectors")]
    Empty,

    #[error("sector {sector} has no bounding box")]
    MissingBounds { sector: SectorId },

    /// NaN, infinite, or inverted (min > max) on some axis.
    #[error("sector {sector} has an invalid bounding box {min} .. {max}")]
    InvalidBounds {
        sector: SectorId,
        min: Vec3,
        max: Vec3,
    },

    #[error("sector {sector} is listed more than once")]
    DuplicateSector { sector: SectorId },

    #[error("sector {sector} references unknown parent {parent}")]
    UnknownParent { sector: SectorId, parent: i64 },

    #[error("model metadata has no root sector")]
    NoRoot,

    #[error("model metadata has more than one root sector ({first} and {second})")]
    MultipleRoots { first: SectorId, second: SectorId },

    /// The sector is not reachable from the root, so its parent chain loops.
    #[error("sector {sector} is part of a parent cycle")]
    Cycle { sector: SectorId },
}
