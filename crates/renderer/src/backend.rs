//! Seams between the frame loop and the GPU.
//!
//! [`GpuState`](crate::GpuState) is the only production implementation;
//! the traits exist so the loop and the pipeline state machine can be driven
//! by in-memory backends in tests.
use crate::binaries::ProgramBinaries;
use crate::error::PipelineError;
use crate::gpu::FrameUniforms;

/// Construction parameters shared by every program's pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineShape {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl PipelineShape {
    /// Two triangles covering the whole target, no vertex buffers.
    pub fn fullscreen(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            topology: wgpu::PrimitiveTopology::TriangleList,
            vertex_count: 6,
            instance_count: 1,
        }
    }
}

/// A rendered frame as host-visible bytes. `stride` may exceed
/// `width * 4`.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub bytes: &'a [u8],
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

pub trait PipelineFactory {
    type Pipeline;

    fn build(
        &mut self,
        binaries: &ProgramBinaries,
        shape: &PipelineShape,
    ) -> Result<Self::Pipeline, PipelineError>;

    /// Blocks until the device has retired every submitted command buffer.
    fn wait_idle(&mut self) -> Result<(), PipelineError>;
}

pub trait RenderBackend: PipelineFactory {
    fn pipeline_shape(&self) -> PipelineShape;

    /// Draws one frame and blocks until it has completed and its pixels are
    /// readable.
    fn render(
        &mut self,
        pipeline: &Self::Pipeline,
        uniforms: &FrameUniforms,
    ) -> anyhow::Result<()>;

    /// Lends the last rendered frame to `reader`.
    fn read_frame<R>(&mut self, reader: impl FnOnce(FrameView<'_>) -> R) -> anyhow::Result<R>;
}
