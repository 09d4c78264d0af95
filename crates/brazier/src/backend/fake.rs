use std::thread;
use std::time::Duration;
use super::InferEngine;
use crate::error::EngineError;
use crate::item::WorkItem;

/// Engine that performs no computation.
///
/// Used to measure the overhead of the pipeline itself: queues, thread
/// hand-offs and bookkeeping. The output buffer is left untouched. An
/// optional fixed latency stands in for the cost of a real call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeEngine {
    latency: Option<Duration>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` on every call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
        }
    }
}

impl InferEngine for FakeEngine {
    fn infer(&mut self, _item: &mut WorkItem) -> Result<(), EngineError> {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        Ok(())
    }
}
