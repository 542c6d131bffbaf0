//! CPU rasterizer for the coverage pass, used when no GPU adapter exists.
//!
//! Each box is reduced to its screen-space bounding rectangle at the box's
//! nearest depth. Coarser than rasterizing faces, but it applies the same
//! reverse-Z depth test and stipple as the GPU pass so rankings agree on
//! ordering.

use glam::{Mat4, Vec3, Vec4Swizzles};
use strata_math::Aabb;

use crate::encoding::{EMPTY_ID, stipple_keep};
use crate::error::GpuReadbackError;
use crate::renderer::{CoverageFrame, CoverageRenderer, IdBuffer, Occluders};

/// Screen rectangle covered by a projected box, in NDC, plus its depth.
#[derive(Clone, Copy, Debug)]
struct ScreenRect {
    min_x: f32,
    max_x: f32,
    min_y: f32,
    max_y: f32,
    depth: f32,
}

fn project_box(clip_from_model: &Mat4, min: Vec3, max: Vec3) -> Option<ScreenRect> {
    let aabb = Aabb::new(min, max);
    let mut rect = ScreenRect {
        min_x: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        min_y: f32::INFINITY,
        max_y: f32::NEG_INFINITY,
        depth: f32::NEG_INFINITY,
    };
    let mut behind = 0;
    for corner in aabb.corners() {
        let clip = *clip_from_model * corner.extend(1.0);
        if clip.w <= 0.0 {
            behind += 1;
            continue;
        }
        let ndc = clip.xyz() / clip.w;
        rect.min_x = rect.min_x.min(ndc.x);
        rect.max_x = rect.max_x.max(ndc.x);
        rect.min_y = rect.min_y.min(ndc.y);
        rect.max_y = rect.max_y.max(ndc.y);
        rect.depth = rect.depth.max(ndc.z);
    }

    match behind {
        8 => None,
        // Box straddles the eye plane: it surrounds the camera and covers
        // the whole view at the near plane.
        1..=7 => Some(ScreenRect {
            min_x: -1.0,
            max_x: 1.0,
            min_y: -1.0,
            max_y: 1.0,
            depth: 1.0,
        }),
        _ => {
            let on_screen = rect.max_x >= -1.0
                && rect.min_x <= 1.0
                && rect.max_y >= -1.0
                && rect.min_y <= 1.0
                && rect.depth >= 0.0;
            on_screen.then(|| ScreenRect {
                depth: rect.depth.min(1.0),
                ..rect
            })
        }
    }
}

/// Coverage renderer rasterizing on the CPU. Results are available
/// immediately after `submit`.
#[derive(Debug)]
pub struct SoftwareCoverageRenderer {
    width: u32,
    height: u32,
    occluders: Vec<Aabb>,
    depth: Vec<f32>,
    pending: Option<IdBuffer>,
}

impl SoftwareCoverageRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self, GpuReadbackError> {
        if width == 0 || height == 0 {
            return Err(GpuReadbackError::ZeroSizedTarget);
        }
        Ok(Self {
            width,
            height,
            occluders: Vec::new(),
            depth: Vec::new(),
            pending: None,
        })
    }

    /// World-space boxes written to depth before sector boxes are drawn.
    pub fn set_occluder_boxes(&mut self, occluders: Vec<Aabb>) {
        self.occluders = occluders;
    }

    fn pixel_range(&self, rect: &ScreenRect) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
        // Pixel centre (px + 0.5) / w * 2 - 1 must lie inside the rect.
        let (w, h) = (self.width as f32, self.height as f32);
        let x0 = ((rect.min_x + 1.0) * 0.5 * w - 0.5).ceil().max(0.0) as u32;
        let x1 = ((rect.max_x + 1.0) * 0.5 * w - 0.5).floor().min(w - 1.0);
        // Row 0 is the top of the target, NDC y points up.
        let y0 = ((1.0 - rect.max_y) * 0.5 * h - 0.5).ceil().max(0.0) as u32;
        let y1 = ((1.0 - rect.min_y) * 0.5 * h - 0.5).floor().min(h - 1.0);
        if x1 < 0.0 || y1 < 0.0 {
            return (0..0, 0..0);
        }
        (x0..x1 as u32 + 1, y0..y1 as u32 + 1)
    }

    fn draw_rect(&mut self, rect: &ScreenRect, ids: Option<(&mut [u32], u32, f32)>) {
        let (xs, ys) = self.pixel_range(rect);
        let width = self.width as usize;
        match ids {
            None => {
                for y in ys {
                    for x in xs.clone() {
                        let slot = &mut self.depth[y as usize * width + x as usize];
                        if rect.depth >= *slot {
                            *slot = rect.depth;
                        }
                    }
                }
            }
            Some((buffer, id, coverage)) => {
                for y in ys {
                    for x in xs.clone() {
                        let index = y as usize * width + x as usize;
                        if rect.depth >= self.depth[index] && stipple_keep(x, y, coverage) {
                            self.depth[index] = rect.depth;
                            buffer[index] = id;
                        }
                    }
                }
            }
        }
    }
}

impl CoverageRenderer for SoftwareCoverageRenderer {
    fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn submit(&mut self, frame: &CoverageFrame<'_>) -> Result<(), GpuReadbackError> {
        let pixels = self.width as usize * self.height as usize;
        self.depth.clear();
        self.depth.resize(pixels, 0.0);
        let mut ids = vec![EMPTY_ID; pixels];

        let occluders = std::mem::take(&mut self.occluders);
        for occluder in &occluders {
            if let Some(rect) = project_box(&frame.view_projection, occluder.min, occluder.max) {
                self.draw_rect(&rect, None);
            }
        }
        self.occluders = occluders;

        for batch in frame.batches {
            let clip_from_model = frame.view_projection * batch.model_matrix;
            for instance in &batch.instances {
                let rect = project_box(
                    &clip_from_model,
                    Vec3::from(instance.min),
                    Vec3::from(instance.max),
                );
                if let Some(rect) = rect {
                    let target = (ids.as_mut_slice(), instance.encoded_id, instance.coverage);
                    self.draw_rect(&rect, Some(target));
                }
            }
        }

        self.pending = Some(IdBuffer {
            width: self.width,
            height: self.height,
            ids,
        });
        Ok(())
    }

    fn poll(&mut self, _wait: bool) -> Option<Result<IdBuffer, GpuReadbackError>> {
        self.pending.take().map(Ok)
    }

    fn set_occluders(&mut self, occluders: Occluders) -> bool {
        match occluders {
            Occluders::None => self.occluders.clear(),
            Occluders::Boxes(boxes) => self.occluders = boxes,
            Occluders::Pass(_) => return false,
        }
        true
    }
}
