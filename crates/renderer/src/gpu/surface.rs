use std::sync::mpsc::{self, Receiver};

use anyhow::{anyhow, Context, Result};

pub const RENDER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
const BYTES_PER_PIXEL: u32 = 4;

/// Bytes per row of the readback buffer for a surface `width` pixels wide.
pub fn padded_stride(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Off-screen colour target plus a host-readable copy of its pixels.
pub(crate) struct RenderSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    readback: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pending_map: Option<Receiver<std::result::Result<(), wgpu::BufferAsyncError>>>,
    mapped: bool,
}

impl RenderSurface {
    pub(crate) fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: RENDER_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let stride = padded_stride(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("render surface readback"),
            size: u64::from(stride) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback,
            width,
            height,
            stride,
            pending_map: None,
            mapped: false,
        }
    }

    /// Records the texture-to-buffer copy; must precede `request_map` in the
    /// same submission.
    pub(crate) fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.stride),
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

    /// Unmaps the previous frame's view so the next copy can write into the
    /// buffer.
    pub(crate) fn release(&mut self) {
        if self.mapped {
            self.readback.unmap();
            self.mapped = false;
        }
        self.pending_map = None;
    }

    /// Queues the map request right after submission; the callback fires
    /// during the same device poll that waits for the submission.
    pub(crate) fn request_map(&mut self) {
        let (sender, receiver) = mpsc::channel();
        self.readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.pending_map = Some(receiver);
    }

    pub(crate) fn finish_map(&mut self) -> Result<()> {
        let receiver = self
            .pending_map
            .take()
            .ok_or_else(|| anyhow!("render surface readback was not requested"))?;
        receiver
            .try_recv()
            .map_err(|_| anyhow!("render surface readback did not complete"))?
            .context("failed to map render surface readback")?;
        self.mapped = true;
        Ok(())
    }

    pub(crate) fn with_pixels<R>(&self, reader: impl FnOnce(&[u8]) -> R) -> Result<R> {
        if !self.mapped {
            anyhow::bail!("no rendered frame is available");
        }
        let view = self.readback.slice(..).get_mapped_range();
        Ok(reader(&view))
    }
}
