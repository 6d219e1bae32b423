use std::io;

use tracing::{debug, warn};

use crate::copy::copy_rows;
use crate::kms::BYTES_PER_PIXEL;

/// A host-mappable buffer the display scans out from.
pub trait ScanoutTarget {
    fn size(&self) -> (u32, u32);

    /// Maps the buffer for writing and passes it to `write` together with
    /// its pitch. The mapping ends when this returns.
    fn with_mapped(&mut self, write: &mut dyn FnMut(&mut [u8], usize)) -> io::Result<()>;

    /// Tells the display the whole buffer changed.
    fn mark_dirty(&mut self) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The scanout buffer could not be mapped; the display keeps the
    /// previous frame.
    Dropped,
}

pub trait Presenter {
    fn present(&mut self, pixels: &[u8], stride: usize) -> PresentOutcome;
}

/// Copies rendered frames into a [`ScanoutTarget`].
pub struct SurfaceBridge<T> {
    target: T,
    dirty_unsupported: bool,
    dropped_frames: u64,
}

impl<T: ScanoutTarget> SurfaceBridge<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            dirty_unsupported: false,
            dropped_frames: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.target.size()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    fn flush(&mut self) {
        if self.dirty_unsupported {
            return;
        }
        match self.target.mark_dirty() {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Unsupported => {
                debug!(error = %err, "display does not take dirty hints; skipping from now on");
                self.dirty_unsupported = true;
            }
            Err(err) => warn!(error = %err, "failed to flush scanout buffer"),
        }
    }
}

impl<T: ScanoutTarget> Presenter for SurfaceBridge<T> {
    fn present(&mut self, pixels: &[u8], stride: usize) -> PresentOutcome {
        let (width, height) = self.target.size();
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let rows = height as usize;

        let mut copied = 0;
        let mapped = self.target.with_mapped(&mut |dst, pitch| {
            copied = copy_rows(pixels, stride, dst, pitch, row_bytes, rows);
        });
        if let Err(err) = mapped {
            self.dropped_frames += 1;
            warn!(
                error = %err,
                dropped = self.dropped_frames,
                "failed to map scanout buffer; dropping frame"
            );
            return PresentOutcome::Dropped;
        }
        if copied < rows {
            debug!(copied, rows, "frame shorter than the scanout buffer");
        }

        self.flush();
        PresentOutcome::Presented
    }
}
