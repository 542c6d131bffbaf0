//! Scripted camera path around a model.

use std::f32::consts::TAU;

use glam::Vec3;
use strata_math::Aabb;
use strata_render::Camera;

/// Circles the model once over `ticks` ticks, slightly above its centre.
#[derive(Clone, Copy, Debug)]
pub struct OrbitPath {
    center: Vec3,
    radius: f32,
    height: f32,
    ticks: u32,
}

impl OrbitPath {
    pub fn around(bounds: &Aabb, radius_factor: f32, ticks: u32) -> Self {
        let bounding_radius = (bounds.size().length() * 0.5).max(1.0);
        let radius = bounding_radius * radius_factor.max(1.0);
        Self {
            center: bounds.center(),
            radius,
            height: radius * 0.25,
            ticks: ticks.max(1),
        }
    }

    pub fn camera_at(&self, tick: u32) -> Camera {
        let angle = TAU * (tick % self.ticks) as f32 / self.ticks as f32;
        let offset = Vec3::new(angle.cos() * self.radius, self.height, angle.sin() * self.radius);
        let mut camera = Camera::looking_at(self.center + offset, self.center, Vec3::Y);
        camera.far = camera.far.max(self.radius * 4.0);
        camera
    }
}
