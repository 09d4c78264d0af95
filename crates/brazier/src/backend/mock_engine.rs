use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use super::InferEngine;
use crate::error::EngineError;
use crate::item::WorkItem;

/// Writes `input * factor` into the output. Requires `input_size == output_size`.
#[derive(Debug, Clone)]
pub struct ScaleEngine {
    pub(crate) factor: f32,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl ScaleEngine {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InferEngine for ScaleEngine {
    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        let factor = self.factor;
        let (input, output) = item.buffers_mut();
        output
            .iter_mut()
            .zip(input)
            .for_each(|(out, value)| *out = value * factor);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Succeeds `healthy_calls` times, then reports a device fault.
#[derive(Debug, Clone)]
pub struct FaultyEngine {
    pub(crate) healthy_calls: usize,
}

impl InferEngine for FaultyEngine {
    fn infer(&mut self, _item: &mut WorkItem) -> Result<(), EngineError> {
        if self.healthy_calls == 0 {
            return Err(EngineError::Device("simulated device fault".into()));
        }
        self.healthy_calls -= 1;
        Ok(())
    }
}

/// Fails device initialisation.
#[derive(Debug, Clone, Default)]
pub struct NoDeviceEngine;

impl InferEngine for NoDeviceEngine {
    fn init_device(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Device("no device available".into()))
    }

    fn infer(&mut self, _item: &mut WorkItem) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Panics on the first call.
#[derive(Debug, Clone, Default)]
pub struct PanickingEngine;

impl InferEngine for PanickingEngine {
    fn infer(&mut self, _item: &mut WorkItem) -> Result<(), EngineError> {
        panic!("kernel launch failed");
    }
}
