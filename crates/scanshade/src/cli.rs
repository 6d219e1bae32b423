use std::path::PathBuf;

use clap::Parser;
use programs::program_name_from_input;
use settings::DisplayMode;

#[derive(Parser, Debug)]
#[command(
    name = "scanshade",
    author,
    version,
    about = "Full-screen shader effects scanned out directly to a DRM display"
)]
pub struct Cli {
    /// Program to start with: a base name such as `plasma`, or a path to one
    /// of its binaries (`shaders/plasma.frag.spv`).
    #[arg(value_name = "PROGRAM")]
    pub program: Option<String>,

    /// Configuration file to load instead of the per-user one.
    #[arg(long, value_name = "FILE", env = "SCANSHADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// DRM card to drive (defaults to `/dev/dri/card0`).
    #[arg(long, value_name = "PATH")]
    pub card: Option<PathBuf>,

    /// Preferred display mode, used when the connector offers it.
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub mode: Option<DisplayMode>,

    /// Keyboard event device; skips probing `/sys/class/input`.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Print the discovered programs and exit.
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    /// The program to start with, reduced to its base name.
    pub fn program_name(&self, fallback: &str) -> String {
        program_name_from_input(self.program.as_deref().unwrap_or(fallback))
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
