//! Frame-tensor assembly and batched crop-and-resize.
//!
//! The crop follows the TensorFlow `crop_and_resize` convention so that
//! crops fed to the classifier match what the model was trained against:
//! normalized `[y0, x0, y1, x1]` boxes address the `[0, dim-1]` pixel grid,
//! samples are bilinear, and out-of-range samples extrapolate to 0.

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis, ShapeError};

/// Wrap a packed RGB24 pixel buffer as an `[H, W, 3]` tensor.
///
/// Channel order is taken as-is; nothing in the pipeline permutes axes or
/// channels between capture and model input.
pub fn frame_tensor(data: &[u8], width: u32, height: u32) -> Result<Array3<u8>, ShapeError> {
    Array3::from_shape_vec((height as usize, width as usize, 3), data.to_vec())
}

/// Crop and resize a batch of images in one call.
///
/// Output row `b` samples input batch row `box_indices[b]` inside the
/// normalized box `boxes[b] = [y0, x0, y1, x1]`, bilinearly resampled to
/// `target = (height, width)`. Rows whose `box_indices` entry is out of
/// range stay zero. One batched call per cycle amortizes dispatch overhead
/// over all detections; callers tile a single frame into the batch with a
/// broadcast view, which adds no pixel copies.
pub fn crop_and_resize(
    batch: ArrayView4<'_, u8>,
    boxes: &[[f32; 4]],
    box_indices: &[usize],
    target: (usize, usize),
) -> Array4<f32> {
    let batch_len = batch.shape()[0];
    let height = batch.shape()[1];
    let width = batch.shape()[2];
    let channels = batch.shape()[3];
    let (target_h, target_w) = target;

    let rows = boxes.len().min(box_indices.len());
    let mut out = Array4::<f32>::zeros((rows, target_h, target_w, channels));
    if height == 0 || width == 0 || target_h == 0 || target_w == 0 {
        return out;
    }

    for (row, (&[y0, x0, y1, x1], &src)) in boxes.iter().zip(box_indices).take(rows).enumerate() {
        if src >= batch_len {
            continue;
        }
        let image = batch.index_axis(Axis(0), src);

        for oy in 0..target_h {
            let in_y = sample_coord(y0, y1, oy, target_h, height);
            if !(0.0..=(height - 1) as f32).contains(&in_y) {
                continue;
            }
            let y_lo = in_y.floor() as usize;
            let y_hi = (y_lo + 1).min(height - 1);
            let fy = in_y - y_lo as f32;

            for ox in 0..target_w {
                let in_x = sample_coord(x0, x1, ox, target_w, width);
                if !(0.0..=(width - 1) as f32).contains(&in_x) {
                    continue;
                }
                let x_lo = in_x.floor() as usize;
                let x_hi = (x_lo + 1).min(width - 1);
                let fx = in_x - x_lo as f32;

                for ch in 0..channels {
                    let tl = image[[y_lo, x_lo, ch]] as f32;
                    let tr = image[[y_lo, x_hi, ch]] as f32;
                    let bl = image[[y_hi, x_lo, ch]] as f32;
                    let br = image[[y_hi, x_hi, ch]] as f32;

                    let top = tl * (1.0 - fx) + tr * fx;
                    let bot = bl * (1.0 - fx) + br * fx;
                    out[[row, oy, ox, ch]] = top * (1.0 - fy) + bot * fy;
                }
            }
        }
    }

    out
}

/// Map an output coordinate into the source pixel grid for one axis.
fn sample_coord(lo: f32, hi: f32, out_idx: usize, out_len: usize, in_len: usize) -> f32 {
    let extent = (in_len - 1) as f32;
    if out_len > 1 {
        lo * extent + out_idx as f32 * (hi - lo) * extent / (out_len - 1) as f32
    } else {
        0.5 * (lo + hi) * extent
    }
}

/// Convert one crop row (`[H, W, 3]` f32, 0–255 range) back to packed RGB24
/// bytes for rendering.
pub fn crop_to_rgb_bytes(crop: ArrayView3<'_, f32>) -> Vec<u8> {
    crop.iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn uniform_batch(n: usize, h: usize, w: usize, value: u8) -> Array4<u8> {
        Array4::from_elem((n, h, w, 3), value)
    }

    #[test]
    fn test_frame_tensor_shape() {
        let data = vec![7u8; 4 * 2 * 3];
        let t = frame_tensor(&data, 4, 2).unwrap();
        assert_eq!(t.shape(), &[2, 4, 3]);
        assert_eq!(t[[1, 3, 2]], 7);
    }

    #[test]
    fn test_frame_tensor_length_mismatch() {
        let data = vec![0u8; 10];
        assert!(frame_tensor(&data, 4, 2).is_err());
    }

    #[test]
    fn test_crop_output_shape() {
        let batch = uniform_batch(2, 16, 16, 100);
        let out = crop_and_resize(
            batch.view(),
            &[[0.0, 0.0, 1.0, 1.0], [0.2, 0.2, 0.8, 0.8]],
            &[0, 1],
            (224, 224),
        );
        assert_eq!(out.shape(), &[2, 224, 224, 3]);
    }

    #[test]
    fn test_crop_uniform_stays_uniform() {
        let batch = uniform_batch(1, 32, 32, 128);
        let out = crop_and_resize(batch.view(), &[[0.1, 0.1, 0.9, 0.9]], &[0], (8, 8));
        assert!(out.iter().all(|&v| (v - 128.0).abs() < 1e-4));
    }

    #[test]
    fn test_crop_full_box_identity_corners() {
        // A full-image box at the native size reproduces corner pixels.
        let mut batch = uniform_batch(1, 4, 4, 0);
        batch[[0, 0, 0, 0]] = 10;
        batch[[0, 0, 3, 0]] = 20;
        batch[[0, 3, 0, 0]] = 30;
        batch[[0, 3, 3, 0]] = 40;

        let out = crop_and_resize(batch.view(), &[[0.0, 0.0, 1.0, 1.0]], &[0], (4, 4));
        assert!((out[[0, 0, 0, 0]] - 10.0).abs() < 1e-4);
        assert!((out[[0, 0, 3, 0]] - 20.0).abs() < 1e-4);
        assert!((out[[0, 3, 0, 0]] - 30.0).abs() < 1e-4);
        assert!((out[[0, 3, 3, 0]] - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_crop_bilinear_midpoint() {
        // 2x1 gradient: midpoint of a 1-wide crop is the average.
        let mut batch = uniform_batch(1, 1, 2, 0);
        batch[[0, 0, 0, 0]] = 0;
        batch[[0, 0, 1, 0]] = 200;

        let out = crop_and_resize(batch.view(), &[[0.0, 0.0, 1.0, 1.0]], &[0], (1, 3));
        assert!((out[[0, 0, 0, 0]] - 0.0).abs() < 1e-4);
        assert!((out[[0, 0, 1, 0]] - 100.0).abs() < 1e-4);
        assert!((out[[0, 0, 2, 0]] - 200.0).abs() < 1e-4);
    }

    #[test]
    fn test_crop_box_indices_select_batch_row() {
        let mut batch = uniform_batch(2, 4, 4, 0);
        batch.index_axis_mut(Axis(0), 1).fill(50);

        let out = crop_and_resize(
            batch.view(),
            &[[0.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 1.0]],
            &[1, 0],
            (2, 2),
        );
        assert!(out.index_axis(Axis(0), 0).iter().all(|&v| (v - 50.0).abs() < 1e-4));
        assert!(out.index_axis(Axis(0), 1).iter().all(|&v| v.abs() < 1e-4));
    }

    #[test]
    fn test_crop_out_of_range_box_extrapolates_to_zero() {
        let batch = uniform_batch(1, 8, 8, 255);
        // Box reaching past the bottom-right corner: outside samples are 0.
        let out = crop_and_resize(batch.view(), &[[0.5, 0.5, 1.5, 1.5]], &[0], (4, 4));
        assert!(out[[0, 0, 0, 0]] > 0.0);
        assert_eq!(out[[0, 3, 3, 0]], 0.0);
    }

    #[test]
    fn test_crop_invalid_index_leaves_row_zero() {
        let batch = uniform_batch(1, 8, 8, 255);
        let out = crop_and_resize(batch.view(), &[[0.0, 0.0, 1.0, 1.0]], &[5], (4, 4));
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_crop_empty_boxes() {
        let batch = uniform_batch(1, 8, 8, 255);
        let out = crop_and_resize(batch.view(), &[], &[], (4, 4));
        assert_eq!(out.shape(), &[0, 4, 4, 3]);
    }

    #[test]
    fn test_crop_via_broadcast_tile() {
        // The engine tiles one frame into a batch with a broadcast view.
        let frame = Array3::<u8>::from_elem((8, 8, 3), 90);
        let batched = frame.view().insert_axis(Axis(0));
        let tiled = batched.broadcast((3, 8, 8, 3)).unwrap();

        let boxes = [[0.0, 0.0, 1.0, 1.0]; 3];
        let out = crop_and_resize(tiled, &boxes, &[0, 1, 2], (2, 2));
        assert_eq!(out.shape(), &[3, 2, 2, 3]);
        assert!(out.iter().all(|&v| (v - 90.0).abs() < 1e-4));
    }

    #[test]
    fn test_crop_to_rgb_bytes_clamps() {
        let crop = Array3::<f32>::from_shape_vec(
            (1, 2, 3),
            vec![-5.0, 0.0, 127.6, 255.0, 300.0, 128.4],
        )
        .unwrap();
        assert_eq!(crop_to_rgb_bytes(crop.view()), vec![0, 0, 128, 255, 255, 128]);
    }
}
