//! Keyboard handling over a raw evdev character device.
//!
//! The device is opened non-blocking and drained once per frame. Reads may
//! split a record, so bytes are buffered until whole `input_event`s are
//! available and only then handed to `input_linux` for decoding.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::mem::size_of;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use input_linux::{sys, EventKind, GenericEvent, InputEvent, Key};
use programs::ProgramRegistry;
use settings::InputSettings;
use tracing::{debug, info, warn};

use crate::signal::HostChannel;
use crate::state::RuntimeState;

pub const EVENT_SIZE: usize = size_of::<sys::input_event>();

const KEY_PRESSED: i32 = 1;

const SYS_INPUT_CLASS: &str = "/sys/class/input";
const DEV_INPUT: &str = "/dev/input";

/// Reinterprets one record of exactly [`EVENT_SIZE`] bytes.
pub fn decode_event(record: &[u8]) -> Option<sys::input_event> {
    if record.len() != EVENT_SIZE {
        return None;
    }
    // SAFETY: `input_event` is a plain C struct of integers, so any byte
    // pattern is a valid value, and `read_unaligned` has no alignment needs.
    Some(unsafe { std::ptr::read_unaligned(record.as_ptr().cast::<sys::input_event>()) })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Previous,
    Next,
    ToggleHostDisplay,
    Exit,
}

/// Maps key presses to actions. Releases, auto-repeats, non-key events and
/// event types the kernel headers do not know map to nothing.
pub fn action_for(raw: &sys::input_event) -> Option<Action> {
    let event = InputEvent::from_raw(raw).ok()?;
    if event.kind != EventKind::Key || event.value() != KEY_PRESSED {
        return None;
    }
    match Key::from_code(event.code).ok()? {
        Key::Left => Some(Action::Previous),
        Key::Right => Some(Action::Next),
        Key::F => Some(Action::ToggleHostDisplay),
        Key::Esc | Key::Q => Some(Action::Exit),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

pub trait InputSource {
    /// Applies every queued input transition to `state` without blocking.
    fn poll(&mut self, state: &mut RuntimeState, registry: &ProgramRegistry) -> Control;
}

pub struct InputRouter<R = File> {
    stream: Option<R>,
    pending: Vec<u8>,
    host: HostChannel,
}

impl InputRouter<File> {
    /// Opens `explicit` if given, otherwise the first device whose name
    /// matches one of the configured hints. Without a device the router
    /// never reports any transitions.
    pub fn open(settings: &InputSettings, explicit: Option<PathBuf>, host: HostChannel) -> Self {
        let path = explicit.or_else(|| settings.device.clone()).or_else(|| {
            find_input_device(
                Path::new(SYS_INPUT_CLASS),
                Path::new(DEV_INPUT),
                &settings.name_hints,
            )
            .map(|(path, name)| {
                info!(device = %path.display(), name = %name, "found keyboard input");
                path
            })
        });

        let stream = match path {
            Some(path) => match open_input_device(&path) {
                Ok(file) => {
                    info!(device = %path.display(), "reading keyboard input");
                    Some(file)
                }
                Err(err) => {
                    warn!(device = %path.display(), error = %err, "failed to open input device; keyboard control disabled");
                    None
                }
            },
            None => {
                warn!("no keyboard input device found; keyboard control disabled");
                None
            }
        };

        Self::new(stream, host)
    }
}

impl<R: Read> InputRouter<R> {
    pub fn new(stream: Option<R>, host: HostChannel) -> Self {
        Self {
            stream,
            pending: Vec::with_capacity(EVENT_SIZE * 8),
            host,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Reads until the device has nothing more to give and returns the
    /// actions decoded from complete records. A trailing partial record is
    /// kept for the next drain.
    fn drain(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let Some(stream) = self.stream.as_mut() else {
            return actions;
        };

        let mut chunk = [0u8; EVENT_SIZE * 16];
        let mut disconnect = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => self.pending.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, "input device failed; keyboard control disabled");
                    disconnect = true;
                    break;
                }
            }
        }
        if disconnect {
            self.stream = None;
        }

        let complete = self.pending.len() - self.pending.len() % EVENT_SIZE;
        for record in self.pending[..complete].chunks_exact(EVENT_SIZE) {
            if let Some(action) = decode_event(record).as_ref().and_then(action_for) {
                actions.push(action);
            }
        }
        self.pending.drain(..complete);
        actions
    }
}

impl<R: Read> InputSource for InputRouter<R> {
    fn poll(&mut self, state: &mut RuntimeState, registry: &ProgramRegistry) -> Control {
        let mut control = Control::Continue;
        for action in self.drain() {
            if control == Control::Exit {
                break;
            }
            debug!(?action, "input action");
            match action {
                Action::Previous => state.select_previous(registry),
                Action::Next => state.select_next(registry),
                Action::ToggleHostDisplay => {
                    self.host.request_toggle();
                }
                Action::Exit => control = Control::Exit,
            }
        }
        control
    }
}

pub fn open_input_device(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// Scans `class_dir` (normally `/sys/class/input`) for `eventN` entries in
/// numeric order and returns the device node and name of the first whose
/// name contains any hint, ignoring case.
pub fn find_input_device(
    class_dir: &Path,
    dev_dir: &Path,
    hints: &[String],
) -> Option<(PathBuf, String)> {
    let entries = fs::read_dir(class_dir).ok()?;
    let mut events: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let number = name.strip_prefix("event")?.parse().ok()?;
            Some((number, name))
        })
        .collect();
    events.sort();

    let hints: Vec<String> = hints.iter().map(|hint| hint.to_lowercase()).collect();
    events.into_iter().find_map(|(_, event)| {
        let name = fs::read_to_string(class_dir.join(&event).join("device/name")).ok()?;
        let name = name.trim().to_string();
        debug!(device = %event, name = %name, "probed input device");
        let lowered = name.to_lowercase();
        hints
            .iter()
            .any(|hint| lowered.contains(hint.as_str()))
            .then(|| (dev_dir.join(&event), name))
    })
}
