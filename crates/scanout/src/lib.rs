//! Scanout side of the frame handoff: a KMS dumb buffer on the display and
//! the per-frame copy from the renderer's host-visible pixels into it.

mod bridge;
mod copy;
mod kms;

pub use bridge::{PresentOutcome, Presenter, ScanoutTarget, SurfaceBridge};
pub use copy::copy_rows;
pub use kms::{select_mode, DisplayError, KmsDisplay, KmsOptions, BYTES_PER_PIXEL};
