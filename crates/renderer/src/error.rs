use std::io;
use std::path::PathBuf;

/// Failures raised while turning a program's binaries into a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("program binary {path} could not be read: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("program binary {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("device rejected program '{program}': {message}")]
    Rejected { program: String, message: String },
    #[error("GPU device failure: {0}")]
    Device(String),
}

impl PipelineError {
    /// Only unreadable binaries are retried; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::Missing { .. })
    }
}
