use std::time::Instant;

use anyhow::{bail, Context, Result};
use programs::ProgramRegistry;
use renderer::{GpuOptions, GpuPowerPreference, GpuState};
use scanout::{KmsDisplay, KmsOptions, SurfaceBridge};
use settings::{PowerPreference, Settings};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::driver::{DriverOptions, FrameDriver};
use crate::input::InputRouter;
use crate::signal::HostChannel;
use crate::state::RuntimeState;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let (settings, config_path) =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    match &config_path {
        Some(path) => tracing::debug!(config = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file; using defaults"),
    }

    let roots = &settings.programs.search_roots;
    let registry = ProgramRegistry::discover(roots.as_slice());

    if cli.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    if registry.is_empty() {
        let searched: Vec<String> = roots.iter().map(|root| root.display().to_string()).collect();
        bail!(
            "no shader programs found (searched: {})",
            searched.join(", ")
        );
    }

    let requested = cli.program_name(&settings.programs.default);
    let Some(index) = registry.find_by_name(&requested) else {
        eprintln!("Available programs:");
        for name in registry.names() {
            eprintln!("  {name}");
        }
        bail!("unknown shader program '{requested}'");
    };
    tracing::info!(
        program = %requested,
        index,
        count = registry.len(),
        "bootstrapping scanshade"
    );

    let display = KmsDisplay::open(&kms_options(&cli, &settings))
        .context("failed to initialise the display")?;
    let bridge = SurfaceBridge::new(display);
    let (width, height) = bridge.size();

    let backend = GpuState::new(GpuOptions {
        width,
        height,
        power: map_power(settings.gpu.power),
    })
    .context("failed to initialise the GPU")?;
    tracing::info!(
        adapter = %backend.adapter_profile().name,
        width,
        height,
        "renderer ready"
    );

    let host = HostChannel::new(&settings.host_signal);
    let input = InputRouter::open(&settings.input, cli.input.clone(), host);

    let options = DriverOptions {
        retry_backoff: settings.runtime.retry_backoff,
        stats_interval: settings.runtime.stats_interval,
    };
    let state = RuntimeState::new(index, Instant::now());
    let mut driver = FrameDriver::new(&registry, backend, bridge, input, state, options);
    let result = driver.run();

    let dropped = driver.presenter().dropped_frames();
    if dropped > 0 {
        tracing::warn!(dropped, "frames could not be presented");
    }
    result
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn kms_options(cli: &Cli, settings: &Settings) -> KmsOptions {
    let mode = cli.mode.or(settings.display.mode);
    KmsOptions {
        card: cli
            .card
            .clone()
            .unwrap_or_else(|| settings.display.card.clone()),
        preferred_mode: mode.map(|mode| (mode.width, mode.height)),
    }
}

fn map_power(power: PowerPreference) -> GpuPowerPreference {
    match power {
        PowerPreference::High => GpuPowerPreference::High,
        PowerPreference::Low => GpuPowerPreference::Low,
    }
}
