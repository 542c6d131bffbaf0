//! Serde model of the `scene.json` metadata document.
//!
//! Field names follow the document's camelCase convention. Bounding box
//! components are optional because exporters write non-finite values as
//! `null`; such boxes are rejected when the tree is built.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strata_math::Aabb;

/// Top-level metadata document for one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub max_tree_index: u64,
    #[serde(default)]
    pub unit: Option<String>,
    pub sectors: Vec<SectorRecord>,
}

impl ModelMetadata {
    pub fn new(sectors: Vec<SectorRecord>) -> Self {
        Self {
            version: 8,
            max_tree_index: 0,
            unit: None,
            sectors,
        }
    }

    /// Parse a metadata document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One sector as listed in the metadata document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorRecord {
    pub id: u32,
    /// Parent id; `-1` or absent marks the root.
    #[serde(default = "root_parent_id")]
    pub parent_id: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub estimated_draw_call_count: u32,
    #[serde(default)]
    pub bounding_box: Option<BoundingBoxRecord>,
    #[serde(default)]
    pub index_file: IndexFile,
    #[serde(default)]
    pub faces_file: Option<FacesFile>,
}

fn root_parent_id() -> i64 {
    -1
}

impl SectorRecord {
    /// A record with default file sections, mostly useful for fixtures.
    pub fn new(id: u32, parent: Option<u32>, bounds: Aabb) -> Self {
        Self {
            id,
            parent_id: parent.map_or(-1, i64::from),
            path: String::new(),
            depth: 0,
            estimated_draw_call_count: 0,
            bounding_box: Some(BoundingBoxRecord::from(bounds)),
            index_file: IndexFile {
                file_name: format!("sector_{id}.i3d"),
                peripheral_files: Vec::new(),
                download_size: 0,
            },
            faces_file: None,
        }
    }

    /// Attach a faces file (simple geometry) with uniform coverage factors.
    #[must_use]
    pub fn with_faces(mut self, coverage: f32, download_size: u64) -> Self {
        let factors = CoverageFactors {
            xy: coverage,
            yz: coverage,
            xz: coverage,
        };
        self.faces_file = Some(FacesFile {
            quad_size: 0.5,
            coverage_factors: factors,
            recursive_coverage_factors: None,
            file_name: Some(format!("sector_{}.f3d", self.id)),
            download_size,
        });
        self
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent_id < 0
    }
}

/// Axis-aligned box as written in the document.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxRecord {
    pub min: Point3Record,
    pub max: Point3Record,
}

impl From<Aabb> for BoundingBoxRecord {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min.into(),
            max: aabb.max.into(),
        }
    }
}

impl BoundingBoxRecord {
    /// Convert to an [`Aabb`], mapping missing components to NaN.
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.min.to_vec3(), self.max.to_vec3())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3Record {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl Point3Record {
    fn to_vec3(self) -> Vec3 {
        Vec3::new(
            self.x.unwrap_or(f32::NAN),
            self.y.unwrap_or(f32::NAN),
            self.z.unwrap_or(f32::NAN),
        )
    }
}

impl From<Vec3> for Point3Record {
    fn from(v: Vec3) -> Self {
        Self {
            x: Some(v.x),
            y: Some(v.y),
            z: Some(v.z),
        }
    }
}

/// Detailed geometry file section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexFile {
    pub file_name: String,
    pub peripheral_files: Vec<String>,
    pub download_size: u64,
}

/// Simple geometry file section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacesFile {
    pub quad_size: f32,
    pub coverage_factors: CoverageFactors,
    #[serde(default)]
    pub recursive_coverage_factors: Option<CoverageFactors>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub download_size: u64,
}

impl FacesFile {
    /// Factors this sector hands down to descendants without a faces file.
    pub fn inherited_factors(&self) -> CoverageFactors {
        self.recursive_coverage_factors
            .unwrap_or(self.coverage_factors)
    }
}

/// Fraction of each axis-aligned plane covered by the sector's geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageFactors {
    pub xy: f32,
    pub yz: f32,
    pub xz: f32,
}
