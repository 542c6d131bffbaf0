//! f32 bounding volumes and view-frustum tests shared by the Strata crates.

mod aabb;
mod frustum;

pub use aabb::Aabb;
pub use frustum::{Frustum, FrustumTest};
