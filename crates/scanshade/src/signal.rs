//! Best-effort display-mode requests to the host over a virtio serial port.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use settings::HostSignalSettings;
use tracing::{debug, info, warn};

/// Sends a one-line command to the port whose name contains `marker`. The
/// port is looked up on every call until one write succeeds; after that the
/// path is reused.
#[derive(Debug, Clone)]
pub struct HostChannel {
    ports_dir: PathBuf,
    device_dir: PathBuf,
    marker: String,
    command: String,
    cached: Option<PathBuf>,
}

impl HostChannel {
    pub fn new(settings: &HostSignalSettings) -> Self {
        Self {
            ports_dir: settings.ports_dir.clone(),
            device_dir: settings.device_dir.clone(),
            marker: settings.port_name.clone(),
            command: settings.command.clone(),
            cached: None,
        }
    }

    pub fn cached_port(&self) -> Option<&Path> {
        self.cached.as_deref()
    }

    /// Returns whether the command was written. Failures are logged and
    /// otherwise ignored; the host never acknowledges.
    pub fn request_toggle(&mut self) -> bool {
        let port = match self.cached.clone().or_else(|| self.discover()) {
            Some(port) => port,
            None => {
                warn!(
                    ports = %self.ports_dir.display(),
                    marker = %self.marker,
                    "host display channel not found"
                );
                return false;
            }
        };

        match self.write_command(&port) {
            Ok(()) => {
                if self.cached.is_none() {
                    info!(port = %port.display(), "host display channel ready");
                }
                debug!(port = %port.display(), command = %self.command, "sent host display request");
                self.cached = Some(port);
                true
            }
            Err(err) => {
                warn!(port = %port.display(), error = %err, "failed to signal host display");
                self.cached = None;
                false
            }
        }
    }

    fn write_command(&self, port: &Path) -> io::Result<()> {
        let mut device = OpenOptions::new().write(true).open(port)?;
        device.write_all(format!("{}\n", self.command).as_bytes())?;
        device.flush()
    }

    fn discover(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.ports_dir).ok()?;
        let mut ports: Vec<_> = entries
            .flatten()
            .map(|entry| entry.file_name())
            .collect();
        ports.sort();

        ports.into_iter().find_map(|port| {
            let name = fs::read_to_string(self.ports_dir.join(&port).join("name")).ok()?;
            name.contains(&self.marker)
                .then(|| self.device_dir.join(&port))
        })
    }
}
