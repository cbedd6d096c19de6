//! Detection decoder — turns raw per-anchor scores and normalized boxes
//! into structured [`Detection`]s with pixel-space geometry.

use crate::types::{CaptureSize, Detection, DrawSize};

/// Decode raw detector output against a confidence threshold.
///
/// Scans `scores` in order and stops at the first score below `threshold`.
/// This relies on the detection model emitting scores sorted descending
/// (the SSD export guarantees it); the decoder does not sort, it only
/// early-stops. Empty input or an all-below-threshold head yields an empty
/// vec, not an error.
///
/// For each retained index the normalized `[y_min, x_min, y_max, x_max]`
/// box produces:
/// - a draw-space `[x, y, w, h]` bbox scaled to `draw`,
/// - a capture-space integer `[y, x, h, w]` slide box, floor-truncated,
///   with inclusive pixel counts (`floor(max) - floor(min) + 1`),
/// - the raw normalized box passed through for crop-and-resize,
/// - the scan index correlating it with its batched crop row.
pub fn decode(
    scores: &[f32],
    threshold: f32,
    boxes: &[[f32; 4]],
    draw: DrawSize,
    capture: CaptureSize,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for (i, &score) in scores.iter().enumerate() {
        if score < threshold {
            break;
        }
        let Some(&[y_min, x_min, y_max, x_max]) = boxes.get(i) else {
            break;
        };

        let bbox = [
            x_min * draw.width,
            y_min * draw.height,
            (x_max - x_min) * draw.width,
            (y_max - y_min) * draw.height,
        ];

        let cap_y0 = (y_min * capture.height as f32).floor() as i32;
        let cap_x0 = (x_min * capture.width as f32).floor() as i32;
        let cap_y1 = (y_max * capture.height as f32).floor() as i32;
        let cap_x1 = (x_max * capture.width as f32).floor() as i32;
        let slide_box = [cap_y0, cap_x0, cap_y1 - cap_y0 + 1, cap_x1 - cap_x0 + 1];

        detections.push(Detection {
            label: "face".to_string(),
            score,
            bbox,
            slide_box,
            crop_box: [y_min, x_min, y_max, x_max],
            box_index: i,
        });
    }

    detections
}
