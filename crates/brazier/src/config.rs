//! Pipeline configuration.

use std::fmt;
use crate::error::ConfigError;
use crate::item::ItemShape;

/// What the supervisor does once a worker hits a fatal engine fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Close the request queue so every other worker drains and stops
    #[default]
    ClosePipeline,
    /// Let the failed worker die alone; the others keep draining
    IsolateWorker,
}

impl FaultPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultPolicy::ClosePipeline => "close-pipeline",
            FaultPolicy::IsolateWorker => "isolate-worker",
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only inputs to pool construction and to the benchmark driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of engine workers (one OS thread each)
    pub num_workers: usize,
    pub batch_size: usize,
    /// Elements per input sample
    pub input_size: usize,
    /// Elements per output sample
    pub output_size: usize,
    /// Batches run before measurement starts
    pub num_warmup_batches: usize,
    /// Batches measured by the benchmark driver
    pub num_batches: usize,
    /// Skip real computation, see [`crate::backend::FakeEngine`]
    pub fake_inference: bool,
    /// `None` for an unbounded request queue
    pub request_capacity: Option<usize>,
    /// `None` for an unbounded response queue
    pub response_capacity: Option<usize>,
    pub fault_policy: FaultPolicy,
    /// Close the response queue once every worker has been joined
    pub close_response_on_shutdown: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            batch_size: 1,
            input_size: 1,
            output_size: 1,
            num_warmup_batches: 0,
            num_batches: 1,
            fake_inference: false,
            request_capacity: None,
            response_capacity: None,
            fault_policy: FaultPolicy::default(),
            close_response_on_shutdown: true,
        }
    }
}

impl PipelineConfig {
    pub fn new(num_workers: usize, batch_size: usize, input_size: usize, output_size: usize) -> Self {
        Self {
            num_workers,
            batch_size,
            input_size,
            output_size,
            ..Self::default()
        }
    }

    pub fn with_warmup_batches(mut self, num_warmup_batches: usize) -> Self {
        self.num_warmup_batches = num_warmup_batches;
        self
    }

    pub fn with_batches(mut self, num_batches: usize) -> Self {
        self.num_batches = num_batches;
        self
    }

    pub fn with_fake_inference(mut self, fake_inference: bool) -> Self {
        self.fake_inference = fake_inference;
        self
    }

    pub fn with_request_capacity(mut self, capacity: Option<usize>) -> Self {
        self.request_capacity = capacity;
        self
    }

    pub fn with_response_capacity(mut self, capacity: Option<usize>) -> Self {
        self.response_capacity = capacity;
        self
    }

    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    pub fn with_close_response_on_shutdown(mut self, close: bool) -> Self {
        self.close_response_on_shutdown = close;
        self
    }

    /// Shape of the work items this configuration describes.
    pub fn item_shape(&self) -> ItemShape {
        ItemShape::new(self.batch_size, self.input_size, self.output_size)
    }

    /// Checks everything a worker pool needs.
    ///
    /// Batch counts are only checked by the benchmark driver, see
    /// [`validate_benchmark`](Self::validate_benchmark).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.input_size == 0 {
            return Err(ConfigError::ZeroSampleSize { which: "input" });
        }
        if self.output_size == 0 {
            return Err(ConfigError::ZeroSampleSize { which: "output" });
        }
        let shape = self.item_shape();
        if shape.checked_len().is_none() {
            return Err(ConfigError::ShapeOverflow {
                batch_size: self.batch_size,
                sample_size: self.input_size.max(self.output_size),
            });
        }
        if self.request_capacity == Some(0) {
            return Err(ConfigError::ZeroQueueCapacity { which: "request" });
        }
        if self.response_capacity == Some(0) {
            return Err(ConfigError::ZeroQueueCapacity { which: "response" });
        }
        Ok(())
    }

    pub fn validate_benchmark(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.num_batches == 0 {
            return Err(ConfigError::ZeroBatches);
        }
        Ok(())
    }
}

fn fmt_capacity(capacity: Option<usize>) -> String {
    capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string())
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[pipeline_config]: num_workers={}, batch_size={}, input_size={}, output_size={}, \
             num_warmup_batches={}, num_batches={}, fake_inference={}, request_capacity={}, \
             response_capacity={}, fault_policy={}",
            self.num_workers,
            self.batch_size,
            self.input_size,
            self.output_size,
            self.num_warmup_batches,
            self.num_batches,
            self.fake_inference,
            fmt_capacity(self.request_capacity),
            fmt_capacity(self.response_capacity),
            self.fault_policy,
        )
    }
}
