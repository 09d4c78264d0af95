//! # Errors
//!
//! Error types shared across the pipeline.
//!
//! Queue closure is deliberately *not* part of this taxonomy: it is the
//! designed termination signal and lives in [`crate::queue`] as
//! [`Closed`](crate::queue::Closed) and [`PushError`](crate::queue::PushError).

use thiserror::Error;
use crate::worker::WorkerId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boxed error produced by a backend library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejected configuration, detected before any worker thread starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of workers must be greater than zero")]
    ZeroWorkers,

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("per-sample {which} size must be greater than zero")]
    ZeroSampleSize {
        /// `"input"` or `"output"`
        which: &'static str,
    },

    #[error("{which} queue capacity must be greater than zero when bounded")]
    ZeroQueueCapacity {
        /// `"request"` or `"response"`
        which: &'static str,
    },

    #[error("number of benchmark batches must be greater than zero")]
    ZeroBatches,

    #[error("work item of {batch_size} x {sample_size} elements does not fit in memory")]
    ShapeOverflow {
        batch_size: usize,
        sample_size: usize,
    },
}

/// Fault raised by an inference engine.
///
/// Any of these is fatal to the worker that observed it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Device or context level failure
    #[error("device error: {0}")]
    Device(String),

    /// Backend produced an output that does not fit the work item
    #[error("output shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        expected: usize,
        actual: usize,
    },

    /// Error bubbled up from the tensor library
    #[error("backend error: {source}")]
    Backend {
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    /// Wraps any backend error, preserving it as the source.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend { source: err.into() }
    }
}

/// Errors surfaced by the worker pool.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker {worker}: failed to spawn thread: {source}")]
    Spawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {worker}: {source}")]
    Engine {
        worker: WorkerId,
        #[source]
        source: EngineError,
    },

    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked {
        worker: WorkerId,
        message: String,
    },

    #[error("worker {worker} has already been started")]
    AlreadyStarted {
        worker: WorkerId,
    },

    /// The pipeline was closed before the operation could complete
    #[error("pipeline closed")]
    Closed,
}

impl PipelineError {
    /// Identity of the worker the error belongs to, if any.
    pub fn worker(&self) -> Option<WorkerId> {
        match self {
            PipelineError::Spawn { worker, .. }
            | PipelineError::Engine { worker, .. }
            | PipelineError::WorkerPanicked { worker, .. }
            | PipelineError::AlreadyStarted { worker } => Some(*worker),
            PipelineError::Config(_) | PipelineError::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::ZeroSampleSize { which: "input" }.to_string(),
            "per-sample input size must be greater than zero"
        );
        assert_eq!(
            ConfigError::ZeroWorkers.to_string(),
            "number of workers must be greater than zero"
        );
    }

    #[test]
    fn test_engine_error_keeps_source() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "bus fault");
        let err = EngineError::backend(io);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "backend error: bus fault");
    }

    #[test]
    fn test_pipeline_error_worker_identity() {
        let worker = WorkerId::new(1, 4);
        let err = PipelineError::Engine {
            worker,
            source: EngineError::Device("lost context".into()),
        };
        assert_eq!(err.worker(), Some(worker));
        assert_eq!(err.to_string(), "worker 01/04: device error: lost context");

        let err: PipelineError = ConfigError::ZeroWorkers.into();
        assert_eq!(err.worker(), None);
    }
}
