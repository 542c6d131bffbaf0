//! Headless wgpu plumbing: device setup, reverse-Z camera and depth, pass
//! configuration, and asynchronous texture readback.

pub mod camera;
pub mod depth;
pub mod gpu;
pub mod pass;
pub mod readback;

pub use camera::{Camera, Projection};
pub use depth::DepthBuffer;
pub use gpu::{GpuContext, GpuContextError, init_headless_blocking};
pub use pass::{DepthAttachmentConfig, RenderPassBuilder};
pub use readback::{ReadbackError, ReadbackTicket, TextureReadback};
