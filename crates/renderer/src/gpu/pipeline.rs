use std::borrow::Cow;

use crate::backend::PipelineShape;
use crate::binaries::ProgramBinaries;
use crate::error::PipelineError;

const ENTRY_POINT: &str = "main";

/// Bind group layout shared by every program:
/// binding 0 uniform block, binding 1 `texture2D`, binding 2 `sampler`.
pub(crate) struct BindingLayout {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl BindingLayout {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program bindings"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
        }
    }
}

/// Stage modules and the pipeline built from them. Dropping it releases all
/// three.
pub struct ProgramPipeline {
    pub(crate) pipeline: wgpu::RenderPipeline,
    _vertex: wgpu::ShaderModule,
    _fragment: wgpu::ShaderModule,
    program: String,
}

impl ProgramPipeline {
    pub(crate) fn build(
        device: &wgpu::Device,
        layout: &BindingLayout,
        binaries: &ProgramBinaries,
        shape: &PipelineShape,
    ) -> Result<Self, PipelineError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} vertex", binaries.name)),
            source: wgpu::ShaderSource::SpirV(Cow::Borrowed(&binaries.vertex)),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} fragment", binaries.name)),
            source: wgpu::ShaderSource::SpirV(Cow::Borrowed(&binaries.fragment)),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&binaries.name),
            layout: Some(&layout.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some(ENTRY_POINT),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: shape.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some(ENTRY_POINT),
                targets: &[Some(wgpu::ColorTargetState {
                    format: shape.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::Rejected {
                program: binaries.name.clone(),
                message: error.to_string(),
            });
        }

        Ok(Self {
            pipeline,
            _vertex: vertex,
            _fragment: fragment,
            program: binaries.name.clone(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}
