//! Render pass configuration for offscreen passes.
//!
//! Color always clears to transparent black, which decodes as "no sector".
//! [`RenderPassBuilder`] declares whether depth starts fresh or continues
//! from depth written by an earlier pass in the same frame.

/// Configuration for depth stencil attachment.
#[derive(Debug)]
pub struct DepthAttachmentConfig {
    pub view: wgpu::TextureView,
    /// `None` keeps the existing depth contents.
    pub clear_value: Option<f32>,
}

/// Builder for configuring render pass descriptors with a fluent API.
#[derive(Debug)]
pub struct RenderPassBuilder {
    depth_attachment: Option<DepthAttachmentConfig>,
    label: Option<&'static str>,
}

impl Default for RenderPassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self {
            depth_attachment: None,
            label: None,
        }
    }

    /// Depth attachment cleared to `clear_value` at pass start.
    pub fn depth(mut self, view: wgpu::TextureView, clear_value: f32) -> Self {
        self.depth_attachment = Some(DepthAttachmentConfig {
            view,
            clear_value: Some(clear_value),
        });
        self
    }

    /// Depth attachment that keeps depth written by earlier passes.
    pub fn load_depth(mut self, view: wgpu::TextureView) -> Self {
        self.depth_attachment = Some(DepthAttachmentConfig {
            view,
            clear_value: None,
        });
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Begin a render pass drawing into `color_view`.
    pub fn begin<'encoder>(
        &self,
        encoder: &'encoder mut wgpu::CommandEncoder,
        color_view: &'encoder wgpu::TextureView,
    ) -> wgpu::RenderPass<'encoder> {
        let color_attachment = wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        };

        let depth_stencil_attachment =
            self.depth_attachment
                .as_ref()
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth.clear_value.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &[Some(color_attachment)],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }

    /// Begin a depth-only pass (no color attachment).
    pub fn begin_depth_only<'encoder>(
        &'encoder self,
        encoder: &'encoder mut wgpu::CommandEncoder,
    ) -> Option<wgpu::RenderPass<'encoder>> {
        let depth = self.depth_attachment.as_ref()?;
        Some(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: depth.clear_value.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DepthBuffer;

    fn test_depth_view() -> Option<wgpu::TextureView> {
        let context = crate::init_headless_blocking().ok()?;
        let depth = DepthBuffer::new(&context.device, 4, 4);
        Some(depth.view().clone())
    }

    #[test]
    fn test_load_depth_keeps_contents() {
        let Some(view) = test_depth_view() else {
            return;
        };
        let cleared = RenderPassBuilder::new().depth(view.clone(), 0.0);
        assert_eq!(cleared.depth_attachment.unwrap().clear_value, Some(0.0));
        let loaded = RenderPassBuilder::new().load_depth(view);
        assert_eq!(loaded.depth_attachment.unwrap().clear_value, None);
    }

    #[test]
    fn test_depth_attachment_is_optional() {
        let builder = RenderPassBuilder::new();
        assert!(builder.depth_attachment.is_none());
    }

    #[test]
    fn test_label_is_stored() {
        let builder = RenderPassBuilder::new().label("coverage-pass");
        assert_eq!(builder.label, Some("coverage-pass"));
    }
}
