//! The burn implementation of the infer capability.
//! Burn tensors carry their rank as a const generic, so the model is fixed to
//! rank 2 in and out: `(batch_size, features)`.
use burn::prelude::{Backend as BurnBackend, Tensor};
use burn::tensor::TensorData;
use super::{write_output, InferEngine};
use crate::error::EngineError;
use crate::item::WorkItem;

/// Engine running a burn model on one device.
pub struct BurnEngine<B: BurnBackend, M> {
    device: B::Device,
    model: M,
}

impl<B, M> BurnEngine<B, M>
where
    B: BurnBackend,
    M: FnMut(Tensor<B, 2>) -> Tensor<B, 2>,
{
    pub fn new(device: B::Device, model: M) -> Self {
        Self { device, model }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B, M> InferEngine for BurnEngine<B, M>
where
    B: BurnBackend,
    M: FnMut(Tensor<B, 2>) -> Tensor<B, 2>,
{
    fn init_device(&mut self) -> Result<(), EngineError> {
        let _probe = Tensor::<B, 1>::zeros([1], &self.device);
        Ok(())
    }

    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        let shape = item.shape();
        let data = TensorData::new(item.input().to_vec(), [shape.batch_size, shape.input_size]);
        let input = Tensor::<B, 2>::from_data(data, &self.device);

        let output = (self.model)(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| EngineError::Device(format!("{:?}", err)))?;

        write_output(item, &output)
    }
}
