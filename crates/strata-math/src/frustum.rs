//! View frustum extraction and AABB classification.
//!
//! Planes are pulled from a combined view-projection matrix, so the same code
//! serves the sector tree's frustum query and the coverage pass's candidate
//! selection. Projections are reverse-Z (near maps to 1, far maps to 0).

use glam::{Mat4, Vec3, Vec4};

use crate::Aabb;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Result of classifying a box against a frustum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Intersecting,
    Inside,
}

/// Six inward-pointing planes, each `Vec4(a, b, c, d)` with a unit normal.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a reverse-Z view-projection matrix
    /// (Griggs-Hartmann).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Reverse-Z: clip z in [0, w] with near at z = w, far at z = 0.
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Conservative visibility test using the p-vertex of each plane.
    ///
    /// May report boxes near frustum corners as visible, never the reverse.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.classify(aabb) != FrustumTest::Outside
    }

    /// Classify a box as fully outside, straddling, or fully inside.
    pub fn classify(&self, aabb: &Aabb) -> FrustumTest {
        let mut result = FrustumTest::Inside;
        for plane in &self.planes {
            let normal = plane.truncate();
            let positive = select(normal, aabb.max, aabb.min);
            if normal.dot(positive) + plane.w < 0.0 {
                return FrustumTest::Outside;
            }
            let negative = select(normal, aabb.min, aabb.max);
            if normal.dot(negative) + plane.w < 0.0 {
                result = FrustumTest::Intersecting;
            }
        }
        result
    }
}

/// Per-axis pick: `when_positive` where the normal component is >= 0.
fn select(normal: Vec3, when_positive: Vec3, otherwise: Vec3) -> Vec3 {
    Vec3::new(
        if normal.x >= 0.0 { when_positive.x } else { otherwise.x },
        if normal.y >= 0.0 { when_positive.y } else { otherwise.y },
        if normal.z >= 0.0 { when_positive.z } else { otherwise.z },
    )
}
