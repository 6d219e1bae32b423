use programs::ProgramDescriptor;
use tracing::debug;

use crate::backend::{PipelineFactory, PipelineShape};
use crate::binaries::ProgramBinaries;
use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Empty,
    Loading,
    Active,
}

/// Result of a rebuild that did not hit a fatal error.
#[derive(Debug)]
pub enum ReloadOutcome {
    Activated,
    /// The binaries could not be read. Whatever was active before still is.
    Deferred(PipelineError),
}

struct ActivePipeline<P> {
    program: String,
    pipeline: P,
}

/// Owns the single live pipeline and swaps it atomically.
pub struct PipelineManager<P> {
    shape: PipelineShape,
    status: PipelineStatus,
    active: Option<ActivePipeline<P>>,
    failed_program: Option<String>,
}

impl<P> PipelineManager<P> {
    pub fn new(shape: PipelineShape) -> Self {
        Self {
            shape,
            status: PipelineStatus::Empty,
            active: None,
            failed_program: None,
        }
    }

    pub fn shape(&self) -> &PipelineShape {
        &self.shape
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn active(&self) -> Option<&P> {
        self.active.as_ref().map(|active| &active.pipeline)
    }

    pub fn active_program(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.program.as_str())
    }

    /// The program whose last rebuild was deferred, if it has not since
    /// loaded.
    pub fn failed_program(&self) -> Option<&str> {
        self.failed_program.as_deref()
    }

    /// Builds `program` and makes it active. The previous pipeline is dropped
    /// only once it is replaced and the device has gone idle; on any failure
    /// it stays in place.
    pub fn rebuild<F>(
        &mut self,
        factory: &mut F,
        program: &ProgramDescriptor,
    ) -> Result<ReloadOutcome, PipelineError>
    where
        F: PipelineFactory<Pipeline = P>,
    {
        self.status = PipelineStatus::Loading;

        let binaries = match ProgramBinaries::load(program) {
            Ok(binaries) => binaries,
            Err(err) => {
                self.settle_after_failure(program);
                return if err.is_recoverable() {
                    Ok(ReloadOutcome::Deferred(err))
                } else {
                    Err(err)
                };
            }
        };

        let pipeline = match factory.build(&binaries, &self.shape) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.settle_after_failure(program);
                return Err(err);
            }
        };

        let previous = self.active.replace(ActivePipeline {
            program: program.name.clone(),
            pipeline,
        });
        self.status = PipelineStatus::Active;
        self.failed_program = None;

        if let Some(previous) = previous {
            if let Err(err) = factory.wait_idle() {
                // In-flight work may still reference it; leak rather than free.
                std::mem::forget(previous);
                return Err(err);
            }
            debug!(program = %previous.program, "released previous pipeline");
            drop(previous);
        }

        Ok(ReloadOutcome::Activated)
    }

    fn settle_after_failure(&mut self, program: &ProgramDescriptor) {
        self.failed_program = Some(program.name.clone());
        self.status = if self.active.is_some() {
            PipelineStatus::Active
        } else {
            PipelineStatus::Empty
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binaries::SPIRV_MAGIC;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every build, idle wait and drop so ordering can be asserted.
    struct FakePipeline {
        program: String,
        log: Log,
    }

    impl Drop for FakePipeline {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.program));
        }
    }

    struct FakeFactory {
        log: Log,
        shapes: Vec<PipelineShape>,
        reject: Option<String>,
        lose_device: bool,
    }

    impl FakeFactory {
        fn new() -> Self {
            Self {
                log: Rc::new(RefCell::new(Vec::new())),
                shapes: Vec::new(),
                reject: None,
                lose_device: false,
            }
        }

        fn events(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl PipelineFactory for FakeFactory {
        type Pipeline = FakePipeline;

        fn build(
            &mut self,
            binaries: &ProgramBinaries,
            shape: &PipelineShape,
        ) -> Result<FakePipeline, PipelineError> {
            self.shapes.push(*shape);
            if self.reject.as_deref() == Some(binaries.name.as_str()) {
                return Err(PipelineError::Rejected {
                    program: binaries.name.clone(),
                    message: "entry point not found".into(),
                });
            }
            self.log.borrow_mut().push(format!("build {}", binaries.name));
            Ok(FakePipeline {
                program: binaries.name.clone(),
                log: Rc::clone(&self.log),
            })
        }

        fn wait_idle(&mut self) -> Result<(), PipelineError> {
            self.log.borrow_mut().push("idle".into());
            if self.lose_device {
                return Err(PipelineError::Device("device lost".into()));
            }
            Ok(())
        }
    }

    fn shape() -> PipelineShape {
        PipelineShape::fullscreen(640, 480, wgpu::TextureFormat::Bgra8Unorm)
    }

    fn write_program(root: &Path, name: &str) -> ProgramDescriptor {
        let module: Vec<u8> = SPIRV_MAGIC.to_le_bytes().to_vec();
        fs::write(root.join(format!("{name}.vert.spv")), &module).unwrap();
        fs::write(root.join(format!("{name}.frag.spv")), &module).unwrap();
        ProgramDescriptor::new(name, root)
    }

    #[test]
    fn first_build_activates_without_waiting() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());
        assert_eq!(manager.status(), PipelineStatus::Empty);

        let outcome = manager.rebuild(&mut factory, &plasma).unwrap();

        assert!(matches!(outcome, ReloadOutcome::Activated));
        assert_eq!(manager.status(), PipelineStatus::Active);
        assert_eq!(manager.active_program(), Some("plasma"));
        assert_eq!(factory.events(), vec!["build plasma"]);
    }

    #[test]
    fn previous_pipeline_is_released_after_idle() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let tunnel = write_program(root.path(), "tunnel");
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());

        manager.rebuild(&mut factory, &plasma).unwrap();
        manager.rebuild(&mut factory, &tunnel).unwrap();

        assert_eq!(manager.active_program(), Some("tunnel"));
        assert_eq!(
            factory.events(),
            vec!["build plasma", "build tunnel", "idle", "drop plasma"]
        );
    }

    #[test]
    fn failed_idle_wait_never_frees_the_previous_pipeline() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let tunnel = write_program(root.path(), "tunnel");
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());
        manager.rebuild(&mut factory, &plasma).unwrap();

        factory.lose_device = true;
        let err = manager.rebuild(&mut factory, &tunnel).unwrap_err();

        assert!(matches!(err, PipelineError::Device(_)));
        assert_eq!(
            factory.events(),
            vec!["build plasma", "build tunnel", "idle"]
        );
    }

    #[test]
    fn missing_binaries_keep_the_previous_pipeline() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let tunnel = write_program(root.path(), "tunnel");
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());
        manager.rebuild(&mut factory, &plasma).unwrap();

        fs::remove_file(&tunnel.vertex_path).unwrap();
        fs::remove_file(&tunnel.fragment_path).unwrap();
        let outcome = manager.rebuild(&mut factory, &tunnel).unwrap();

        assert!(matches!(outcome, ReloadOutcome::Deferred(ref err) if err.is_recoverable()));
        assert_eq!(manager.status(), PipelineStatus::Active);
        assert_eq!(manager.active_program(), Some("plasma"));
        assert_eq!(manager.failed_program(), Some("tunnel"));
        assert!(manager.active().is_some());
        assert_eq!(factory.events(), vec!["build plasma"]);
    }

    #[test]
    fn missing_binaries_with_nothing_active_stay_empty() {
        let root = TempDir::new().unwrap();
        let ghost = ProgramDescriptor::new("ghost", root.path());
        let mut factory = FakeFactory::new();
        let mut manager: PipelineManager<FakePipeline> = PipelineManager::new(shape());

        let outcome = manager.rebuild(&mut factory, &ghost).unwrap();

        assert!(matches!(outcome, ReloadOutcome::Deferred(_)));
        assert_eq!(manager.status(), PipelineStatus::Empty);
        assert!(manager.active().is_none());
    }

    #[test]
    fn malformed_binaries_are_fatal_and_leave_state_untouched() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let broken = write_program(root.path(), "broken");
        fs::write(&broken.fragment_path, b"abc").unwrap();
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());
        manager.rebuild(&mut factory, &plasma).unwrap();

        let err = manager.rebuild(&mut factory, &broken).unwrap_err();

        assert!(matches!(err, PipelineError::Malformed { .. }));
        assert_eq!(manager.active_program(), Some("plasma"));
        assert_eq!(manager.status(), PipelineStatus::Active);
    }

    #[test]
    fn device_rejection_is_fatal() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let mut factory = FakeFactory::new();
        factory.reject = Some("plasma".into());
        let mut manager = PipelineManager::new(shape());

        let err = manager.rebuild(&mut factory, &plasma).unwrap_err();

        assert!(matches!(err, PipelineError::Rejected { .. }));
        assert_eq!(manager.status(), PipelineStatus::Empty);
    }

    #[test]
    fn every_build_uses_the_same_shape() {
        let root = TempDir::new().unwrap();
        let plasma = write_program(root.path(), "plasma");
        let tunnel = write_program(root.path(), "tunnel");
        let mut factory = FakeFactory::new();
        let mut manager = PipelineManager::new(shape());

        manager.rebuild(&mut factory, &plasma).unwrap();
        manager.rebuild(&mut factory, &tunnel).unwrap();
        manager.rebuild(&mut factory, &plasma).unwrap();

        assert_eq!(factory.shapes.len(), 3);
        assert!(factory.shapes.iter().all(|built| *built == shape()));
        assert_eq!(shape().vertex_count, 6);
        assert_eq!(shape().instance_count, 1);
        assert_eq!(shape().topology, wgpu::PrimitiveTopology::TriangleList);
    }
}
