//! Model execution seams.
//!
//! The pipeline engine drives detection and classification through these
//! traits rather than the concrete ONNX sessions, so cycle behavior can be
//! exercised with stub models.

use ndarray::ArrayView4;
use thiserror::Error;

use crate::types::RawDetections;

#[derive(Error, Debug)]
pub enum InferError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detection over one `[1, H, W, 3]` RGB u8 batch.
pub trait DetectModel {
    fn detect(&mut self, input: ArrayView4<'_, u8>) -> Result<RawDetections, InferError>;
}

/// Mask classification over an `[N, 224, 224, 3]` RGB f32 crop batch.
/// Returns one score per batch row; the whole batch completes in one call.
pub trait ClassifyModel {
    fn classify(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferError>;
}
