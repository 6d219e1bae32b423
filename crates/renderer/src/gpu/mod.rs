//! Headless wgpu renderer.
//!
//! - `context` picks an adapter and opens the device; there is no window or
//!   swapchain.
//! - `surface` owns the colour target and its readback buffer.
//! - `texture` uploads the procedural checkerboard once.
//! - `pipeline` turns SPIR-V stages into render pipelines against one shared
//!   bind group layout.
//! - `state` glues the above into [`GpuState`], the production
//!   [`RenderBackend`](crate::RenderBackend).

mod context;
mod pipeline;
mod state;
mod surface;
mod texture;
mod uniforms;

pub use context::{AdapterProfile, GpuPowerPreference};
pub use pipeline::ProgramPipeline;
pub use state::{GpuOptions, GpuState};
pub use surface::{padded_stride, RENDER_FORMAT};
pub use texture::{checkerboard, TEXTURE_SIZE};
pub use uniforms::FrameUniforms;
