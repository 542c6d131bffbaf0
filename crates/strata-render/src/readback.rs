//! Asynchronous texture-to-CPU readback.
//!
//! The copy is recorded into the caller's encoder, the buffer is mapped after
//! submission, and the returned [`ReadbackTicket`] is polled on later ticks
//! so the update loop never blocks on the GPU.

use crossbeam_channel::{Receiver, TryRecvError, bounded};

/// Errors surfaced while reading a texture back to the CPU.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("failed to map readback buffer: {0}")]
    MapFailed(#[from] wgpu::BufferAsyncError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    /// The map callback was dropped without reporting, e.g. device loss.
    #[error("readback callback was dropped before completing")]
    Disconnected,
}

/// Staging buffer sized for one texture copy, with row padding.
pub struct TextureReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    padded_bytes_per_row: u32,
}

impl TextureReadback {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        let unpadded = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture-readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            width,
            height,
            bytes_per_pixel,
            padded_bytes_per_row,
        }
    }

    /// Record a copy of mip 0 of `texture` into the staging buffer.
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Start mapping. Call after the encoder holding the copy was submitted.
    pub fn map(self) -> ReadbackTicket {
        let (tx, rx) = bounded(1);
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        ReadbackTicket {
            readback: self,
            receiver: rx,
        }
    }

    /// Bytes per row after padding to the copy alignment.
    pub fn padded_bytes_per_row(&self) -> u32 {
        self.padded_bytes_per_row
    }
}

/// An in-flight readback.
pub struct ReadbackTicket {
    readback: TextureReadback,
    receiver: Receiver<Result<(), wgpu::BufferAsyncError>>,
}

impl ReadbackTicket {
    /// Non-blocking check. Returns `None` while the GPU is still working,
    /// otherwise the tightly packed texel rows or the failure.
    pub fn try_take(&self, device: &wgpu::Device) -> Option<Result<Vec<u8>, ReadbackError>> {
        if let Err(err) = device.poll(wgpu::PollType::Poll) {
            return Some(Err(err.into()));
        }
        match self.receiver.try_recv() {
            Ok(result) => Some(self.finish(result)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ReadbackError::Disconnected)),
        }
    }

    /// Block until the readback completes.
    pub fn wait(self, device: &wgpu::Device) -> Result<Vec<u8>, ReadbackError> {
        device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        let result = self
            .receiver
            .recv()
            .map_err(|_| ReadbackError::Disconnected)?;
        self.finish(result)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.readback.width, self.readback.height)
    }

    fn finish(&self, result: Result<(), wgpu::BufferAsyncError>) -> Result<Vec<u8>, ReadbackError> {
        result?;
        let readback = &self.readback;
        let row_bytes = (readback.width * readback.bytes_per_pixel) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * readback.height as usize);
        {
            let mapped = readback.buffer.slice(..).get_mapped_range();
            for row in mapped.chunks_exact(readback.padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        readback.buffer.unmap();
        Ok(pixels)
    }
}
