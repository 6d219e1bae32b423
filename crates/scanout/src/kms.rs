use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use drm::buffer::{Buffer, DrmFourcc};
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::{connector, crtc, framebuffer, ClipRect, Device as ControlDevice, Mode};
use tracing::{debug, info, warn};

use crate::bridge::ScanoutTarget;

pub const BYTES_PER_PIXEL: usize = 4;
const DEPTH: u32 = 24;
const BITS_PER_PIXEL: u32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to open display card {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to query {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no connected display on {0}")]
    NoConnector(PathBuf),
    #[error("connected display reports no modes")]
    NoModes,
    #[error("no CRTC can drive the connected display")]
    NoCrtc,
    #[error("failed to {action}: {source}")]
    Setup {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct KmsOptions {
    pub card: PathBuf,
    pub preferred_mode: Option<(u32, u32)>,
}

impl Default for KmsOptions {
    fn default() -> Self {
        Self {
            card: PathBuf::from("/dev/dri/card0"),
            preferred_mode: None,
        }
    }
}

struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

impl Card {
    fn open(path: &Path) -> Result<Self, DisplayError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(Card)
            .map_err(|source| DisplayError::Open {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Picks the mode matching `preferred` when listed, otherwise the first one.
pub fn select_mode(sizes: &[(u32, u32)], preferred: Option<(u32, u32)>) -> Option<usize> {
    if sizes.is_empty() {
        return None;
    }
    preferred
        .and_then(|wanted| sizes.iter().position(|size| *size == wanted))
        .or(Some(0))
}

/// A mode-set display scanning out of one XRGB8888 dumb buffer. The CRTC
/// configuration found at startup is put back on drop.
pub struct KmsDisplay {
    card: Card,
    buffer: Option<DumbBuffer>,
    framebuffer: framebuffer::Handle,
    crtc: crtc::Handle,
    connector: connector::Handle,
    saved_crtc: Option<crtc::Info>,
    width: u32,
    height: u32,
}

impl KmsDisplay {
    pub fn open(options: &KmsOptions) -> Result<Self, DisplayError> {
        let card = Card::open(&options.card)?;
        let resources = card
            .resource_handles()
            .map_err(|source| DisplayError::Query {
                what: "display resources",
                source,
            })?;

        let connector = resources
            .connectors()
            .iter()
            .filter_map(|handle| card.get_connector(*handle, true).ok())
            .find(|info| info.state() == connector::State::Connected)
            .ok_or_else(|| DisplayError::NoConnector(options.card.clone()))?;

        let modes = connector.modes();
        let sizes: Vec<(u32, u32)> = modes
            .iter()
            .map(|mode| {
                let (width, height) = mode.size();
                (u32::from(width), u32::from(height))
            })
            .collect();
        for (index, mode) in modes.iter().enumerate() {
            debug!(
                index,
                width = sizes[index].0,
                height = sizes[index].1,
                refresh = mode.vrefresh(),
                "available display mode"
            );
        }

        let index = select_mode(&sizes, options.preferred_mode).ok_or(DisplayError::NoModes)?;
        if let Some((width, height)) = options.preferred_mode {
            if sizes[index] != (width, height) {
                warn!(
                    requested = %format!("{width}x{height}"),
                    "display mode not offered by the connector; using its first mode"
                );
            }
        }
        let mode: Mode = modes[index];
        let (width, height) = sizes[index];

        let crtc = connector
            .current_encoder()
            .and_then(|handle| card.get_encoder(handle).ok())
            .and_then(|encoder| encoder.crtc())
            .or_else(|| resources.crtcs().first().copied())
            .ok_or(DisplayError::NoCrtc)?;
        let saved_crtc = card.get_crtc(crtc).ok();

        let mut buffer = card
            .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, BITS_PER_PIXEL)
            .map_err(|source| DisplayError::Setup {
                action: "allocate scanout buffer",
                source,
            })?;
        let framebuffer = match card.add_framebuffer(&buffer, DEPTH, BITS_PER_PIXEL) {
            Ok(handle) => handle,
            Err(source) => {
                let _ = card.destroy_dumb_buffer(buffer);
                return Err(DisplayError::Setup {
                    action: "register framebuffer",
                    source,
                });
            }
        };

        // Start from black rather than whatever the allocation held.
        if let Ok(mut mapping) = card.map_dumb_buffer(&mut buffer) {
            mapping.as_mut().fill(0);
        }

        if let Err(source) = card.set_crtc(
            crtc,
            Some(framebuffer),
            (0, 0),
            &[connector.handle()],
            Some(mode),
        ) {
            let _ = card.destroy_framebuffer(framebuffer);
            let _ = card.destroy_dumb_buffer(buffer);
            return Err(DisplayError::Setup {
                action: "set display mode",
                source,
            });
        }

        info!(
            card = %options.card.display(),
            connector = ?connector.interface(),
            width,
            height,
            refresh = mode.vrefresh(),
            pitch = buffer.pitch(),
            "display configured"
        );

        Ok(Self {
            card,
            buffer: Some(buffer),
            framebuffer,
            crtc,
            connector: connector.handle(),
            saved_crtc,
            width,
            height,
        })
    }
}

impl ScanoutTarget for KmsDisplay {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn with_mapped(&mut self, write: &mut dyn FnMut(&mut [u8], usize)) -> io::Result<()> {
        let buffer = self
            .buffer
            .as_mut()
            .ok_or_else(|| io::Error::other("scanout buffer already released"))?;
        let pitch = buffer.pitch() as usize;
        let mut mapping = self.card.map_dumb_buffer(buffer)?;
        write(mapping.as_mut(), pitch);
        Ok(())
    }

    fn mark_dirty(&mut self) -> io::Result<()> {
        let clip = ClipRect::new(0, 0, clamp_u16(self.width), clamp_u16(self.height));
        self.card.dirty_framebuffer(self.framebuffer, &[clip])
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

impl Drop for KmsDisplay {
    fn drop(&mut self) {
        if let Some(saved) = self.saved_crtc.take() {
            let connectors: &[connector::Handle] = if saved.mode().is_some() {
                std::slice::from_ref(&self.connector)
            } else {
                &[]
            };
            if let Err(err) = self.card.set_crtc(
                self.crtc,
                saved.framebuffer(),
                saved.position(),
                connectors,
                saved.mode(),
            ) {
                warn!(error = %err, "failed to restore previous display configuration");
            }
        }
        if let Err(err) = self.card.destroy_framebuffer(self.framebuffer) {
            debug!(error = %err, "failed to release framebuffer");
        }
        if let Some(buffer) = self.buffer.take() {
            if let Err(err) = self.card.destroy_dumb_buffer(buffer) {
                debug!(error = %err, "failed to release scanout buffer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [(u32, u32); 3] = [(1920, 1080), (1280, 720), (800, 600)];

    #[test]
    fn defaults_to_the_first_mode() {
        assert_eq!(select_mode(&SIZES, None), Some(0));
    }

    #[test]
    fn honours_a_listed_preference() {
        assert_eq!(select_mode(&SIZES, Some((1280, 720))), Some(1));
    }

    #[test]
    fn ignores_an_unlisted_preference() {
        assert_eq!(select_mode(&SIZES, Some((640, 480))), Some(0));
    }

    #[test]
    fn no_modes_means_no_selection() {
        assert_eq!(select_mode(&[], Some((640, 480))), None);
    }

    #[test]
    fn missing_card_reports_its_path() {
        let options = KmsOptions {
            card: PathBuf::from("/nonexistent/dri/card9"),
            preferred_mode: None,
        };
        let err = KmsDisplay::open(&options).err().map(|err| err.to_string());
        assert!(err.is_some_and(|message| message.contains("/nonexistent/dri/card9")));
    }
}
