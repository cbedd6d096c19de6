//! Binary mask classifier via ONNX Runtime.
//!
//! Consumes 224×224 RGB crops in one batch and returns one raw logit per
//! crop. The sign convention (positive = "no mask") is interpreted by
//! [`MaskLabel::from_score`](crate::types::MaskLabel::from_score), never
//! re-mapped here.

use ndarray::ArrayView4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use crate::loader::{self, ModelLoadError};
use crate::model::{ClassifyModel, InferError};

/// Mask/no-mask classifier over face crops.
pub struct MaskClassifier {
    session: Session,
}

impl MaskClassifier {
    /// Load the classification model, reporting fractional read progress.
    pub fn load(
        model_path: &Path,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Self, ModelLoadError> {
        let bytes = loader::read_model_with_progress(model_path, on_progress)?;
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_memory(&bytes)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded mask classification model"
        );

        Ok(Self { session })
    }
}

impl ClassifyModel for MaskClassifier {
    /// Classify an `[N, 224, 224, 3]` f32 crop batch in a single call.
    ///
    /// The model head emits `[N, K]`; the score is the first column of
    /// each row.
    fn classify(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferError> {
        let rows = batch.shape()[0];
        if rows == 0 {
            return Ok(Vec::new());
        }

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(batch)?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferError::InferenceFailed(format!("classification scores: {e}")))?;

        if data.is_empty() || data.len() % rows != 0 {
            return Err(InferError::InferenceFailed(format!(
                "classifier returned {} values for a batch of {rows}",
                data.len()
            )));
        }

        let cols = data.len() / rows;
        Ok((0..rows).map(|r| data[r * cols]).collect())
    }
}
