use candle_core::{DType, Device, Tensor};
use super::{write_output, InferEngine};
use crate::error::EngineError;
use crate::item::WorkItem;

/// Engine running a candle model on one device.
///
/// The input buffer is viewed as a `(batch_size, input_size)` f32 tensor. The
/// model output is flattened and must hold exactly `batch_size * output_size`
/// elements.
pub struct CandleEngine<M> {
    device: Device,
    model: M,
}

impl<M> CandleEngine<M>
where
    M: FnMut(&Tensor) -> candle_core::Result<Tensor>,
{
    pub fn new(device: Device, model: M) -> Self {
        Self { device, model }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl<M> InferEngine for CandleEngine<M>
where
    M: FnMut(&Tensor) -> candle_core::Result<Tensor>,
{
    fn init_device(&mut self) -> Result<(), EngineError> {
        // forces lazy device contexts to come up on this thread
        Tensor::zeros(1, DType::F32, &self.device).map_err(EngineError::backend)?;
        Ok(())
    }

    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        let shape = item.shape();
        let input = Tensor::from_slice(
            item.input(),
            (shape.batch_size, shape.input_size),
            &self.device,
        )
        .map_err(EngineError::backend)?;

        let output = (self.model)(&input)
            .and_then(|tensor| tensor.flatten_all())
            .and_then(|tensor| tensor.to_dtype(DType::F32))
            .and_then(|tensor| tensor.to_vec1::<f32>())
            .map_err(EngineError::backend)?;

        write_output(item, &output)
    }
}
