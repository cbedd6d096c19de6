//! SSD face detector via ONNX Runtime.
//!
//! The exported graph carries the full SSD post-processing head, so the
//! session already returns decoded normalized boxes and descending-sorted
//! scores; this adapter only selects the right output tensors.

use ndarray::ArrayView4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use crate::loader::{self, ModelLoadError};
use crate::model::{DetectModel, InferError};
use crate::types::RawDetections;

const BOXES_OUTPUT_NAME: &str = "detection_boxes";
const SCORES_OUTPUT_NAME: &str = "detection_scores";
// The 8-output SSD export orders tensors [num_detections, raw_boxes,
// anchor_indices, raw_scores, detection_boxes, detection_classes,
// detection_scores, multiclass_scores].
const BOXES_FALLBACK_INDEX: usize = 4;
const SCORES_FALLBACK_INDEX: usize = 6;

/// SSD-based face detector.
pub struct FaceDetector {
    session: Session,
    boxes_output: usize,
    scores_output: usize,
}

impl FaceDetector {
    /// Load the detection model, reporting fractional read progress.
    pub fn load(
        model_path: &Path,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Self, ModelLoadError> {
        let bytes = loader::read_model_with_progress(model_path, on_progress)?;
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_memory(&bytes)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        let (boxes_output, scores_output) = discover_outputs(&output_names)?;
        tracing::debug!(boxes_output, scores_output, "detector output tensor mapping");

        Ok(Self {
            session,
            boxes_output,
            scores_output,
        })
    }
}

impl DetectModel for FaceDetector {
    /// Run detection over a `[1, H, W, 3]` RGB u8 batch.
    ///
    /// The tensor keeps the frame's native HWC/RGB layout; no axis or
    /// channel permutation happens on the way in.
    fn detect(&mut self, input: ArrayView4<'_, u8>) -> Result<RawDetections, InferError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input)?])?;

        let (_, box_data) = outputs[self.boxes_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferError::InferenceFailed(format!("detection boxes: {e}")))?;
        let (_, score_data) = outputs[self.scores_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferError::InferenceFailed(format!("detection scores: {e}")))?;

        if box_data.len() % 4 != 0 {
            return Err(InferError::InferenceFailed(format!(
                "detection boxes tensor has {} elements, expected a multiple of 4",
                box_data.len()
            )));
        }

        let boxes: Vec<[f32; 4]> = box_data
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();

        Ok(RawDetections {
            boxes,
            scores: score_data.to_vec(),
        })
    }
}

/// Discover the box/score output indices by name, falling back to the
/// standard positional layout of the 8-output SSD export when the names
/// are not recognized.
fn discover_outputs(names: &[String]) -> Result<(usize, usize), ModelLoadError> {
    let boxes = names.iter().position(|n| n == BOXES_OUTPUT_NAME);
    let scores = names.iter().position(|n| n == SCORES_OUTPUT_NAME);

    if let (Some(b), Some(s)) = (boxes, scores) {
        tracing::info!("detector: using name-based output tensor mapping");
        return Ok((b, s));
    }

    if names.len() > SCORES_FALLBACK_INDEX {
        tracing::info!(
            ?names,
            "detector: output names not recognized, using positional mapping [4]=boxes, [6]=scores"
        );
        return Ok((BOXES_FALLBACK_INDEX, SCORES_FALLBACK_INDEX));
    }

    Err(ModelLoadError::UnexpectedSignature(format!(
        "detection model exposes {} outputs and names {names:?}; need '{BOXES_OUTPUT_NAME}' and \
         '{SCORES_OUTPUT_NAME}' or the 8-output SSD layout",
        names.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_outputs_named() {
        let n = names(&["detection_scores", "other", "detection_boxes"]);
        assert_eq!(discover_outputs(&n).unwrap(), (2, 0));
    }

    #[test]
    fn test_discover_outputs_positional_fallback() {
        let n: Vec<String> = (0..8).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_outputs(&n).unwrap(), (4, 6));
    }

    #[test]
    fn test_discover_outputs_too_few_unnamed() {
        let n = names(&["a", "b"]);
        assert!(matches!(
            discover_outputs(&n),
            Err(ModelLoadError::UnexpectedSignature(_))
        ));
    }

    #[test]
    fn test_discover_outputs_partial_names_fall_back() {
        // Only one of the two names present: positional layout wins.
        let mut n: Vec<String> = (0..8).map(|i: usize| i.to_string()).collect();
        n[0] = "detection_boxes".to_string();
        assert_eq!(discover_outputs(&n).unwrap(), (4, 6));
    }
}
