use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use brazier::{EngineError, InferEngine, WorkItem};

/// Single dense layer with a ReLU, computed on the CPU.
///
/// Weights are random but seeded, so every worker holds the same model.
pub struct Dense {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (input_size as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range(-scale..scale))
            .collect();
        let bias = (0..output_size).map(|_| rng.gen_range(-scale..scale)).collect();
        Self {
            input_size,
            output_size,
            weights,
            bias,
        }
    }
}

impl InferEngine for Dense {
    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        let shape = item.shape();
        if shape.input_size != self.input_size || shape.output_size != self.output_size {
            return Err(EngineError::Device(format!(
                "dense layer is {}x{}, work item samples are {}x{}",
                self.input_size, self.output_size, shape.input_size, shape.output_size
            )));
        }

        let (input, output) = item.buffers_mut();
        for (row, out) in input
            .chunks_exact(self.input_size)
            .zip(output.chunks_exact_mut(self.output_size))
        {
            for (o, value) in out.iter_mut().enumerate() {
                let weights = &self.weights[o * self.input_size..(o + 1) * self.input_size];
                let dot: f32 = row.iter().zip(weights).map(|(x, w)| x * w).sum();
                *value = (dot + self.bias[o]).max(0.0);
            }
        }
        Ok(())
    }
}
