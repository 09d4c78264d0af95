//! # Inference Backends
//!
//! This module defines the boundary between the pipeline and whatever does the
//! actual numeric work. The pipeline only ever sees the [`InferEngine`] trait;
//! engines are built per worker by an [`EngineFactory`].
//!
//! ## Feature Flags
//!
//! - `candle`: Enables [`candle::CandleEngine`], running a candle model
//! - `burn`: Enables [`burn::BurnEngine`], running a burn model
//!
//! [`FakeEngine`] is always available and performs no computation.

mod core_trait;
mod fake;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle engine implementation.
///
/// This module is only available when the `candle` feature flag is enabled.
pub mod candle;

#[cfg_attr(docsrs, doc(cfg(feature = "burn")))]
#[cfg(feature = "burn")]
/// Burn engine implementation.
///
/// This module is only available when the `burn` feature flag is enabled.
/// Burn tensors are rank-typed, so the engine is fixed to rank 2 models.
pub mod burn;

pub use core_trait::*;
pub use fake::FakeEngine;

#[cfg(test)]
/// Mock engines.
///
/// Small deterministic engines for exercising workers and pools
pub(crate) mod mock_engine;

use crate::error::EngineError;
use crate::item::WorkItem;

/// Copies flattened model output into the item's output buffer.
#[cfg(any(test, feature = "candle", feature = "burn"))]
pub(crate) fn write_output(item: &mut WorkItem, values: &[f32]) -> Result<(), EngineError> {
    let output = item.output_mut();
    if output.len() != values.len() {
        return Err(EngineError::ShapeMismatch {
            expected: output.len(),
            actual: values.len(),
        });
    }
    output.copy_from_slice(values);
    Ok(())
}
