//! # Work Items
//!
//! A [`WorkItem`] carries one batch through the pipeline: a fixed-size input
//! buffer filled by the producer and a fixed-size output buffer written by
//! the engine. Buffers are boxed slices, so their length is fixed at
//! construction. Items are moved between stages, never shared.

use std::fmt;
use rand::Rng;
use uuid::Uuid;

/// Shape of the work items a pipeline moves around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemShape {
    /// Samples per batch
    pub batch_size: usize,
    /// Elements per input sample
    pub input_size: usize,
    /// Elements per output sample
    pub output_size: usize,
}

impl ItemShape {
    pub fn new(batch_size: usize, input_size: usize, output_size: usize) -> Self {
        Self {
            batch_size,
            input_size,
            output_size,
        }
    }

    /// Total number of input elements in one batch.
    pub fn input_len(&self) -> usize {
        self.batch_size * self.input_size
    }

    /// Total number of output elements in one batch.
    pub fn output_len(&self) -> usize {
        self.batch_size * self.output_size
    }

    /// Largest buffer length of the shape, `None` if it overflows `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        let input = self.batch_size.checked_mul(self.input_size)?;
        let output = self.batch_size.checked_mul(self.output_size)?;
        Some(input.max(output))
    }
}

/// One batch worth of input and output buffers.
pub struct WorkItem {
    id: Uuid,
    shape: ItemShape,
    input: Box<[f32]>,
    output: Box<[f32]>,
}

impl WorkItem {
    /// Allocates zeroed buffers for `shape`.
    pub fn new(shape: ItemShape) -> Self {
        Self {
            id: Uuid::new_v4(),
            shape,
            input: vec![0.0; shape.input_len()].into_boxed_slice(),
            output: vec![0.0; shape.output_len()].into_boxed_slice(),
        }
    }

    /// Unique identity, stable for the lifetime of the item (including recycling).
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn shape(&self) -> ItemShape {
        self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.shape.batch_size
    }

    pub fn input(&self) -> &[f32] {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut [f32] {
        &mut self.input
    }

    pub fn output(&self) -> &[f32] {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut [f32] {
        &mut self.output
    }

    /// Borrows the input buffer and the output buffer at the same time.
    ///
    /// Engines usually need both: read from one while writing the other.
    pub fn buffers_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.input, &mut self.output)
    }

    /// Input elements of sample `index` within the batch.
    ///
    /// # Panics
    ///
    /// Panics if `index >= batch_size`.
    pub fn sample_input(&self, index: usize) -> &[f32] {
        let size = self.shape.input_size;
        &self.input[index * size..(index + 1) * size]
    }

    /// Output elements of sample `index` within the batch.
    ///
    /// # Panics
    ///
    /// Panics if `index >= batch_size`.
    pub fn sample_output(&self, index: usize) -> &[f32] {
        let size = self.shape.output_size;
        &self.output[index * size..(index + 1) * size]
    }

    /// Fills the input buffer with uniform values in `[0.0, 1.0)`.
    pub fn fill_random<R: Rng>(&mut self, rng: &mut R) {
        self.input
            .iter_mut()
            .for_each(|value| *value = rng.gen_range(0.0f32..1.0f32));
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("batch_size", &self.shape.batch_size)
            .field("input_len", &self.input.len())
            .field("output_len", &self.output.len())
            .finish()
    }
}

/// Produces work items of one fixed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItemFactory {
    shape: ItemShape,
}

impl WorkItemFactory {
    pub fn new(shape: ItemShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> ItemShape {
        self.shape
    }

    /// Builds a new item, optionally filled with synthetic input.
    pub fn create(&self, random_input: bool) -> WorkItem {
        if random_input {
            self.create_with_rng(&mut rand::thread_rng())
        } else {
            WorkItem::new(self.shape)
        }
    }

    /// Builds a new item with synthetic input drawn from `rng`.
    pub fn create_with_rng<R: Rng>(&self, rng: &mut R) -> WorkItem {
        let mut item = WorkItem::new(self.shape);
        item.fill_random(rng);
        item
    }
}
