//! GPU mirror of the override table.

use crate::TransformOverrideAllocator;

/// RGBA8 texture holding the packed override table, one texel per float.
pub struct OverrideTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    generation: u64,
    width: u32,
    height: u32,
}

impl OverrideTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Create a texture sized for the allocator's current capacity and
    /// upload its contents.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        overrides: &mut TransformOverrideAllocator,
    ) -> Self {
        let (width, height) = overrides.texture_size();
        let (texture, view) = create_texture(device, width, height);
        let mut this = Self {
            texture,
            view,
            generation: overrides.generation(),
            width,
            height,
        };
        this.upload(queue, overrides);
        overrides.take_dirty();
        this
    }

    /// Bring the texture up to date. Recreates it when the table has grown
    /// since the last sync and re-uploads when the table is dirty.
    ///
    /// Returns `true` when the texture was recreated, so bind groups that
    /// reference [`OverrideTexture::view`] must be rebuilt.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        overrides: &mut TransformOverrideAllocator,
    ) -> bool {
        let recreated = overrides.generation() != self.generation;
        if recreated {
            let (width, height) = overrides.texture_size();
            let (texture, view) = create_texture(device, width, height);
            self.texture = texture;
            self.view = view;
            self.width = width;
            self.height = height;
            self.generation = overrides.generation();
            tracing::debug!(width, height, "recreated override texture");
        }
        if overrides.take_dirty() || recreated {
            self.upload(queue, overrides);
        }
        recreated
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn upload(&self, queue: &wgpu::Queue, overrides: &TransformOverrideAllocator) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            overrides.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn create_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("transform-override-texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OverrideTexture::FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
