use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use programs::ProgramRegistry;
use renderer::{FrameUniforms, PipelineManager, ReloadOutcome, RenderBackend};
use scanout::Presenter;
use tracing::{info, warn};

use crate::input::{Control, InputSource};
use crate::state::RuntimeState;

#[derive(Clone, Copy, Debug)]
pub struct DriverOptions {
    /// Pause after a program's binaries could not be read.
    pub retry_backoff: Duration,
    /// Frames between throughput reports.
    pub stats_interval: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(1),
            stats_interval: 60,
        }
    }
}

/// Single-threaded render loop: reload, poll input, draw, wait, present.
pub struct FrameDriver<'r, B: RenderBackend, P, I> {
    registry: &'r ProgramRegistry,
    backend: B,
    presenter: P,
    input: I,
    pipelines: PipelineManager<B::Pipeline>,
    state: RuntimeState,
    options: DriverOptions,
    window_start: Instant,
}

impl<'r, B, P, I> FrameDriver<'r, B, P, I>
where
    B: RenderBackend,
    P: Presenter,
    I: InputSource,
{
    pub fn new(
        registry: &'r ProgramRegistry,
        backend: B,
        presenter: P,
        input: I,
        state: RuntimeState,
        options: DriverOptions,
    ) -> Self {
        let pipelines = PipelineManager::new(backend.pipeline_shape());
        Self {
            registry,
            backend,
            presenter,
            input,
            pipelines,
            state,
            options,
            window_start: Instant::now(),
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn pipelines(&self) -> &PipelineManager<B::Pipeline> {
        &self.pipelines
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Runs until an exit key is pressed or a fatal error occurs.
    pub fn run(&mut self) -> Result<()> {
        while self.step()? == Control::Continue {}
        info!(frames = self.state.frame_count(), "exiting");
        Ok(())
    }

    /// One loop iteration.
    pub fn step(&mut self) -> Result<Control> {
        if self.state.reload_requested() || self.pipelines.active().is_none() {
            self.reload()?;
        }

        let elapsed = self.state.elapsed(Instant::now());

        if self.input.poll(&mut self.state, self.registry) == Control::Exit {
            info!("exit requested");
            return Ok(Control::Exit);
        }

        let Some(pipeline) = self.pipelines.active() else {
            return Ok(Control::Continue);
        };

        let shape = self.pipelines.shape();
        let uniforms = FrameUniforms::new(shape.width, shape.height, elapsed);
        self.backend.render(pipeline, &uniforms)?;

        let presenter = &mut self.presenter;
        self.backend
            .read_frame(|frame| presenter.present(frame.bytes, frame.stride))?;

        self.record_frame(Instant::now());
        Ok(Control::Continue)
    }

    fn reload(&mut self) -> Result<()> {
        let registry = self.registry;
        let index = self.state.active_index();
        let program = registry
            .get(index)
            .with_context(|| format!("no program registered at index {index}"))?;

        let outcome = self
            .pipelines
            .rebuild(&mut self.backend, program)
            .with_context(|| format!("failed to build program '{}'", program.name))?;

        match outcome {
            ReloadOutcome::Activated => {
                let now = Instant::now();
                self.state.complete_reload(now);
                self.window_start = now;
                info!(
                    program = %program.name,
                    index,
                    count = registry.len(),
                    "program active"
                );
            }
            ReloadOutcome::Deferred(err) => {
                warn!(
                    program = %program.name,
                    still_showing = self.pipelines.active_program().unwrap_or("nothing"),
                    error = %err,
                    "program unavailable; retrying"
                );
                if !self.options.retry_backoff.is_zero() {
                    thread::sleep(self.options.retry_backoff);
                }
            }
        }
        Ok(())
    }

    fn record_frame(&mut self, now: Instant) {
        let frames = self.state.advance_frame();
        let interval = self.options.stats_interval.max(1);
        if frames % interval != 0 {
            return;
        }

        let window = now.saturating_duration_since(self.window_start);
        let fps = if window.is_zero() {
            0.0
        } else {
            interval as f64 / window.as_secs_f64()
        };
        self.window_start = now;
        info!(
            elapsed = format!("{:.1}s", self.state.elapsed(now).as_secs_f64()),
            frames,
            fps = format!("{fps:.1}"),
            program = self.pipelines.active_program().unwrap_or("-"),
            "render stats"
        );
    }
}
