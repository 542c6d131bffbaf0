//! wgpu implementation of the coverage id pass.
//!
//! Candidate boxes are expanded from instance bounds in the vertex shader,
//! so no mesh buffers are needed. Each model gets one instanced draw with its
//! own `clip_from_model` matrix at a dynamic uniform offset.

use std::num::NonZeroU64;

use strata_render::{DepthBuffer, GpuContext, ReadbackTicket, RenderPassBuilder, TextureReadback};

use crate::encoding::{MAX_ENCODED_ID, SectorInstance, decode_rgba};
use crate::error::GpuReadbackError;
use crate::renderer::{CoverageFrame, CoverageRenderer, IdBuffer, Occluders};

/// WGSL source for the coverage id pass. The pixel hash must stay in sync
/// with [`crate::stipple_keep`].
pub const COVERAGE_SHADER_SOURCE: &str = r#"
struct ModelUniform {
    clip_from_model: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> model: ModelUniform;

struct InstanceInput {
    @location(0) min: vec3<f32>,
    @location(1) encoded_id: u32,
    @location(2) max: vec3<f32>,
    @location(3) coverage: f32,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) @interpolate(flat) color: vec4<f32>,
    @location(1) @interpolate(flat) coverage: f32,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32, instance: InstanceInput) -> VertexOutput {
    // Corner i has x = bit 0, y = bit 1, z = bit 2.
    var indices = array<u32, 36>(
        0u, 2u, 6u, 0u, 6u, 4u,
        1u, 5u, 7u, 1u, 7u, 3u,
        0u, 4u, 5u, 0u, 5u, 1u,
        2u, 3u, 7u, 2u, 7u, 6u,
        0u, 1u, 3u, 0u, 3u, 2u,
        4u, 6u, 7u, 4u, 7u, 5u,
    );
    let corner = indices[vertex_index];
    let select_max = vec3<f32>(
        f32(corner & 1u),
        f32((corner >> 1u) & 1u),
        f32((corner >> 2u) & 1u),
    );
    let position = mix(instance.min, instance.max, select_max);

    let id = instance.encoded_id;
    var out: VertexOutput;
    out.clip_position = model.clip_from_model * vec4<f32>(position, 1.0);
    out.color = vec4<f32>(
        f32((id >> 16u) & 0xffu),
        f32((id >> 8u) & 0xffu),
        f32(id & 0xffu),
        255.0,
    ) / 255.0;
    out.coverage = instance.coverage;
    return out;
}

fn pixel_hash(x: u32, y: u32) -> u32 {
    var h = (x * 0x8da6b343u) ^ (y * 0xd8163841u);
    h = (h ^ (h >> 16u)) * 0x7feb352du;
    return h ^ (h >> 15u);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if in.coverage < 1.0 {
        let pixel = vec2<u32>(in.clip_position.xy);
        let threshold = f32(pixel_hash(pixel.x, pixel.y) & 0xffffu) / 65536.0;
        if threshold >= in.coverage {
            discard;
        }
    }
    return in.color;
}
"#;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const UNIFORM_SIZE: u64 = 64;
const VERTICES_PER_BOX: u32 = 36;

/// Depth-only geometry drawn before the coverage pass, typically the scene
/// geometry already resident, so sector boxes behind it lose pixels.
///
/// The pass has no color attachments and a `Depth32Float` reverse-Z target;
/// pipelines must use [`DepthBuffer::stencil_state`].
pub trait OccluderPass: Send {
    fn draw_depth(&self, pass: &mut wgpu::RenderPass<'_>, view_projection: &glam::Mat4);
}

/// Coverage renderer drawing on a wgpu device with asynchronous readback.
pub struct GpuCoverageRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_stride: u64,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: usize,
    bind_group: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: DepthBuffer,
    width: u32,
    height: u32,
    occluder: Option<Box<dyn OccluderPass>>,
    pending: Option<ReadbackTicket>,
}

impl GpuCoverageRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuReadbackError> {
        if width == 0 || height == 0 {
            return Err(GpuReadbackError::ZeroSizedTarget);
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("coverage-shader"),
            source: wgpu::ShaderSource::Wgsl(COVERAGE_SHADER_SOURCE.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("coverage-model-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("coverage-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("coverage-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[SectorInstance::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(DepthBuffer::stencil_state(true)),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_stride = UNIFORM_SIZE.div_ceil(alignment) * alignment;
        let uniform_capacity = 4;
        let uniform_buffer = create_uniform_buffer(device, uniform_stride, uniform_capacity);
        let bind_group = create_bind_group(device, &bind_group_layout, &uniform_buffer);
        let instance_capacity = 256;
        let instance_buffer = create_instance_buffer(device, instance_capacity);
        let (color, color_view) = create_color_target(device, width, height);
        let depth = DepthBuffer::with_label(device, "coverage-depth", width, height);

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline,
            bind_group_layout,
            uniform_stride,
            uniform_buffer,
            uniform_capacity,
            bind_group,
            instance_buffer,
            instance_capacity,
            color,
            color_view,
            depth,
            width,
            height,
            occluder: None,
            pending: None,
        })
    }

    pub fn from_context(
        context: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuReadbackError> {
        Self::new(&context.device, &context.queue, width, height)
    }

    /// Install the depth pre-pass. `None` clears depth before sector boxes.
    pub fn set_occluder(&mut self, occluder: Option<Box<dyn OccluderPass>>) {
        self.occluder = occluder;
    }

    /// Depth written by the last coverage pass, for a following main pass.
    pub fn depth_view(&self) -> &wgpu::TextureView {
        self.depth.view()
    }

    fn ensure_capacity(&mut self, models: usize, instances: usize) {
        if models > self.uniform_capacity {
            self.uniform_capacity = models.next_power_of_two();
            self.uniform_buffer =
                create_uniform_buffer(&self.device, self.uniform_stride, self.uniform_capacity);
            self.bind_group =
                create_bind_group(&self.device, &self.bind_group_layout, &self.uniform_buffer);
        }
        if instances > self.instance_capacity {
            self.instance_capacity = instances.next_power_of_two();
            self.instance_buffer = create_instance_buffer(&self.device, self.instance_capacity);
        }
    }
}

impl CoverageRenderer for GpuCoverageRenderer {
    fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn submit(&mut self, frame: &CoverageFrame<'_>) -> Result<(), GpuReadbackError> {
        let count = frame.instance_count();
        if count > MAX_ENCODED_ID as usize {
            return Err(GpuReadbackError::TooManySectors { count });
        }
        self.ensure_capacity(frame.batches.len(), count);

        let mut instances = Vec::with_capacity(count);
        let mut draws = Vec::with_capacity(frame.batches.len());
        for (slot, batch) in frame.batches.iter().enumerate() {
            let clip_from_model = frame.view_projection * batch.model_matrix;
            self.queue.write_buffer(
                &self.uniform_buffer,
                slot as u64 * self.uniform_stride,
                bytemuck::cast_slice(&clip_from_model.to_cols_array()),
            );
            let start = instances.len() as u32;
            instances.extend_from_slice(&batch.instances);
            draws.push(((slot as u64 * self.uniform_stride) as u32, start..instances.len() as u32));
        }
        if !instances.is_empty() {
            self.queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("coverage-encoder"),
            });

        let mut coverage_pass = RenderPassBuilder::new().label("coverage-ids");
        if let Some(occluder) = &self.occluder {
            let prepass = RenderPassBuilder::new()
                .depth(self.depth.view().clone(), DepthBuffer::CLEAR_VALUE)
                .label("coverage-occluders");
            if let Some(mut pass) = prepass.begin_depth_only(&mut encoder) {
                occluder.draw_depth(&mut pass, &frame.view_projection);
            }
            coverage_pass = coverage_pass.load_depth(self.depth.view().clone());
        } else {
            coverage_pass = coverage_pass.depth(self.depth.view().clone(), DepthBuffer::CLEAR_VALUE);
        }

        {
            let mut pass = coverage_pass.begin(&mut encoder, &self.color_view);
            pass.set_pipeline(&self.pipeline);
            pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
            for (offset, range) in draws {
                if range.is_empty() {
                    continue;
                }
                pass.set_bind_group(0, &self.bind_group, &[offset]);
                pass.draw(0..VERTICES_PER_BOX, range);
            }
        }

        let readback = TextureReadback::new(&self.device, self.width, self.height, 4);
        readback.copy_from(&mut encoder, &self.color);
        self.queue.submit([encoder.finish()]);
        self.pending = Some(readback.map());
        Ok(())
    }

    fn poll(&mut self, wait: bool) -> Option<Result<IdBuffer, GpuReadbackError>> {
        let ticket = self.pending.take()?;
        let bytes = if wait {
            ticket.wait(&self.device)
        } else {
            match ticket.try_take(&self.device) {
                Some(result) => result,
                None => {
                    self.pending = Some(ticket);
                    return None;
                }
            }
        };

        Some(bytes.map_err(GpuReadbackError::from).map(|bytes| IdBuffer {
            width: self.width,
            height: self.height,
            ids: bytes
                .chunks_exact(4)
                .map(|px| decode_rgba([px[0], px[1], px[2], px[3]]))
                .collect(),
        }))
    }

    fn set_occluders(&mut self, occluders: Occluders) -> bool {
        match occluders {
            Occluders::None => self.set_occluder(None),
            Occluders::Pass(pass) => self.set_occluder(Some(pass)),
            Occluders::Boxes(_) => return false,
        }
        true
    }
}

fn create_uniform_buffer(device: &wgpu::Device, stride: u64, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("coverage-model-uniforms"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("coverage-model-bg"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(UNIFORM_SIZE),
            }),
        }],
    })
}

fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("coverage-instances"),
        size: (capacity * std::mem::size_of::<SectorInstance>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_color_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("coverage-ids"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
