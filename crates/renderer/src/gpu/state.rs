use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::backend::{FrameView, PipelineFactory, PipelineShape, RenderBackend};
use crate::binaries::ProgramBinaries;
use crate::error::PipelineError;

use super::context::{AdapterProfile, GpuContext, GpuPowerPreference};
use super::pipeline::{BindingLayout, ProgramPipeline};
use super::surface::{RenderSurface, RENDER_FORMAT};
use super::texture::{create_static_texture, StaticTexture};
use super::uniforms::FrameUniforms;

#[derive(Clone, Copy, Debug)]
pub struct GpuOptions {
    pub width: u32,
    pub height: u32,
    pub power: GpuPowerPreference,
}

/// Headless renderer: one render surface sized to the display, one uniform
/// buffer, one static texture, and whatever pipeline the caller hands in.
pub struct GpuState {
    context: GpuContext,
    layout: BindingLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    _texture: StaticTexture,
    surface: RenderSurface,
}

impl GpuState {
    pub fn new(options: GpuOptions) -> Result<Self> {
        let width = options.width.max(1);
        let height = options.height.max(1);
        let context = GpuContext::new(width, height, options.power)?;
        let device = &context.device;

        let layout = BindingLayout::new(device);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let texture = create_static_texture(device, &context.queue);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program bind group"),
            layout: &layout.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });
        let surface = RenderSurface::new(device, width, height);
        debug!(
            width,
            height,
            stride = surface.stride,
            format = ?RENDER_FORMAT,
            "created render surface"
        );

        Ok(Self {
            context,
            layout,
            uniform_buffer,
            bind_group,
            _texture: texture,
            surface,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    fn wait_for(&self, poll: wgpu::PollType) -> Result<(), PipelineError> {
        self.context
            .device
            .poll(poll)
            .map(|_| ())
            .map_err(|err| PipelineError::Device(err.to_string()))
    }

    /// Clears the surface to opaque black, runs `pipeline` over it if
    /// given, and leaves the result mapped for [`RenderBackend::read_frame`].
    fn draw(&mut self, pipeline: Option<&ProgramPipeline>, uniforms: &FrameUniforms) -> Result<()> {
        self.surface.release();
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.surface.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(pipeline) = pipeline {
                let width = self.surface.width as f32;
                let height = self.surface.height as f32;
                render_pass.set_viewport(0.0, 0.0, width, height, 0.0, 1.0);
                render_pass.set_scissor_rect(0, 0, self.surface.width, self.surface.height);
                render_pass.set_pipeline(&pipeline.pipeline);
                render_pass.set_bind_group(0, &self.bind_group, &[]);
                let shape = self.pipeline_shape();
                render_pass.draw(0..shape.vertex_count, 0..shape.instance_count);
            }
        }
        self.surface.encode_copy(&mut encoder);

        let submission = self.context.queue.submit(std::iter::once(encoder.finish()));
        self.surface.request_map();
        self.wait_for(wgpu::PollType::WaitForSubmissionIndex(submission))?;
        self.surface.finish_map()?;
        trace!(
            program = pipeline.map(ProgramPipeline::program).unwrap_or("-"),
            "frame complete"
        );
        Ok(())
    }
}

impl PipelineFactory for GpuState {
    type Pipeline = ProgramPipeline;

    fn build(
        &mut self,
        binaries: &ProgramBinaries,
        shape: &PipelineShape,
    ) -> Result<ProgramPipeline, PipelineError> {
        ProgramPipeline::build(&self.context.device, &self.layout, binaries, shape)
    }

    fn wait_idle(&mut self) -> Result<(), PipelineError> {
        self.wait_for(wgpu::PollType::Wait)
    }
}

impl RenderBackend for GpuState {
    fn pipeline_shape(&self) -> PipelineShape {
        PipelineShape::fullscreen(self.surface.width, self.surface.height, RENDER_FORMAT)
    }

    fn render(&mut self, pipeline: &ProgramPipeline, uniforms: &FrameUniforms) -> Result<()> {
        self.draw(Some(pipeline), uniforms)
            .with_context(|| format!("frame for '{}' did not complete", pipeline.program()))
    }

    fn read_frame<R>(&mut self, reader: impl FnOnce(FrameView<'_>) -> R) -> Result<R> {
        let stride = self.surface.stride as usize;
        let (width, height) = (self.surface.width, self.surface.height);
        self.surface.with_pixels(|bytes| {
            reader(FrameView {
                bytes,
                stride,
                width,
                height,
            })
        })
    }
}
