//! Renderer crate for scanshade.
//!
//! Draws one full-screen effect program per frame into an off-screen surface
//! and hands the finished pixels back to the host. The overall flow is:
//!
//! ```text
//!   ProgramDescriptor ──▶ PipelineManager::rebuild ──▶ ProgramPipeline
//!                                                          │
//!   FrameUniforms ──▶ GpuState::render ──▶ submit + wait ──┘
//!                            │
//!                            └─▶ read_frame(FrameView) ──▶ scanout
//! ```
//!
//! `GpuState` owns every GPU resource except the pipeline, which lives in the
//! `PipelineManager` so it can be swapped without touching the rest.

mod backend;
mod binaries;
mod error;
mod gpu;
mod manager;

pub use backend::{FrameView, PipelineFactory, PipelineShape, RenderBackend};
pub use binaries::{decode_words, ProgramBinaries, SPIRV_MAGIC};
pub use error::PipelineError;
pub use gpu::{
    checkerboard, padded_stride, AdapterProfile, FrameUniforms, GpuOptions, GpuPowerPreference,
    GpuState, ProgramPipeline, RENDER_FORMAT, TEXTURE_SIZE,
};
pub use manager::{PipelineManager, PipelineStatus, ReloadOutcome};
