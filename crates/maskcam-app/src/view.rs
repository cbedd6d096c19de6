//! Presentation surface — score snapshots and the raster targets the
//! engine draws into.
//!
//! The engine owns the rasters and is their only writer; the display layer
//! reads them and the latest [`ViewSnapshot`] from a watch channel.
//! Publication is last-write-wins: a reader always sees one coherent
//! snapshot, never a partially-updated pair of score arrays.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use maskcam_core::tensor;
use maskcam_core::types::CLASSIFIER_CROP_SIZE;
use maskcam_core::MaskLabel;
use ndarray::ArrayView3;
use serde::Serialize;
use tokio::sync::watch;

/// Number of fixed face display slots.
pub const MAX_DISPLAY_FACES: usize = 5;

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
const BOX_STROKE_WIDTH: i64 = 2;

/// Pipeline availability as seen by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    ModelsLoading { detection: f32, classification: f32 },
    Ready,
    CycleRunning,
}

/// One published frame of scores. Slot `i` of `face_scores` and
/// `mask_scores` always agree on emptiness.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub phase: PipelinePhase,
    pub face_scores: [Option<f32>; MAX_DISPLAY_FACES],
    pub mask_scores: [Option<f32>; MAX_DISPLAY_FACES],
}

impl ViewSnapshot {
    pub fn empty(phase: PipelinePhase) -> Self {
        Self {
            phase,
            face_scores: [None; MAX_DISPLAY_FACES],
            mask_scores: [None; MAX_DISPLAY_FACES],
        }
    }

    /// Mask labels for the populated slots, per the classifier sign
    /// convention.
    pub fn labels(&self) -> [Option<MaskLabel>; MAX_DISPLAY_FACES] {
        self.mask_scores.map(|s| s.map(MaskLabel::from_score))
    }
}

/// Create the snapshot channel, primed with an idle snapshot.
pub fn view_channel() -> (watch::Sender<ViewSnapshot>, watch::Receiver<ViewSnapshot>) {
    watch::channel(ViewSnapshot::empty(PipelinePhase::Idle))
}

/// The bounding-box overlay and the per-face crop canvases.
pub struct RenderTargets {
    overlay: RgbaImage,
    slots: [RgbImage; MAX_DISPLAY_FACES],
}

impl Default for RenderTargets {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTargets {
    pub fn new() -> Self {
        let side = CLASSIFIER_CROP_SIZE as u32;
        Self {
            overlay: RgbaImage::new(0, 0),
            slots: std::array::from_fn(|_| RgbImage::new(side, side)),
        }
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    pub fn slots(&self) -> &[RgbImage] {
        &self.slots
    }

    /// Match the overlay to the current display dimensions. Idempotent:
    /// unchanged dimensions keep the existing raster.
    pub fn resize_overlay(&mut self, width: u32, height: u32) {
        if self.overlay.dimensions() != (width, height) {
            self.overlay = RgbaImage::new(width, height);
        }
    }

    pub fn clear_overlay(&mut self) {
        for pixel in self.overlay.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Stroke one draw-space `[x, y, w, h]` rectangle onto the overlay.
    pub fn draw_box(&mut self, bbox: [f32; 4]) {
        let x0 = bbox[0].round() as i64;
        let y0 = bbox[1].round() as i64;
        let x1 = x0 + (bbox[2].round() as i64).max(1) - 1;
        let y1 = y0 + (bbox[3].round() as i64).max(1) - 1;

        for t in 0..BOX_STROKE_WIDTH {
            horizontal_line(&mut self.overlay, x0, x1, y0 + t);
            horizontal_line(&mut self.overlay, x0, x1, y1 - t);
            vertical_line(&mut self.overlay, y0, y1, x0 + t);
            vertical_line(&mut self.overlay, y0, y1, x1 - t);
        }
    }

    /// Render one `[H, W, 3]` f32 crop into a slot canvas.
    pub fn render_slot(&mut self, index: usize, crop: ArrayView3<'_, f32>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        let height = crop.shape()[0] as u32;
        let width = crop.shape()[1] as u32;
        if let Some(canvas) = RgbImage::from_raw(width, height, tensor::crop_to_rgb_bytes(crop)) {
            *slot = canvas;
        }
    }

    /// Wipe a slot canvas, keeping its dimensions.
    pub fn clear_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            for pixel in slot.pixels_mut() {
                *pixel = Rgb([0, 0, 0]);
            }
        }
    }
}

fn horizontal_line(canvas: &mut RgbaImage, x0: i64, x1: i64, y: i64) {
    let (width, height) = canvas.dimensions();
    if y < 0 || y >= height as i64 {
        return;
    }
    let start = x0.max(0);
    let end = x1.min(width as i64 - 1);
    for x in start..=end {
        canvas.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

fn vertical_line(canvas: &mut RgbaImage, y0: i64, y1: i64, x: i64) {
    let (width, height) = canvas.dimensions();
    if x < 0 || x >= width as i64 {
        return;
    }
    let start = y0.max(0);
    let end = y1.min(height as i64 - 1);
    for y in start..=end {
        canvas.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_resize_overlay_idempotent() {
        let mut targets = RenderTargets::new();
        targets.resize_overlay(100, 80);
        targets.draw_box([10.0, 10.0, 20.0, 20.0]);
        let before = targets.overlay().clone();

        targets.resize_overlay(100, 80);
        assert_eq!(targets.overlay().as_raw(), before.as_raw());

        targets.resize_overlay(50, 40);
        assert_eq!(targets.overlay().dimensions(), (50, 40));
    }

    #[test]
    fn test_draw_box_strokes_edges_not_interior() {
        let mut targets = RenderTargets::new();
        targets.resize_overlay(100, 100);
        targets.draw_box([10.0, 20.0, 30.0, 40.0]);

        let overlay = targets.overlay();
        assert_eq!(*overlay.get_pixel(10, 20), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(39, 20), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(10, 59), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(39, 59), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(25, 40), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_draw_box_clipped_to_canvas() {
        let mut targets = RenderTargets::new();
        targets.resize_overlay(50, 50);
        targets.draw_box([-10.0, -10.0, 200.0, 200.0]);
        assert_eq!(*targets.overlay().get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_clear_overlay() {
        let mut targets = RenderTargets::new();
        targets.resize_overlay(40, 40);
        targets.draw_box([5.0, 5.0, 10.0, 10.0]);
        targets.clear_overlay();
        assert!(targets.overlay().pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_render_and_clear_slot() {
        let mut targets = RenderTargets::new();
        let crop = Array3::<f32>::from_elem((8, 8, 3), 128.0);
        targets.render_slot(0, crop.view());
        assert_eq!(*targets.slots()[0].get_pixel(4, 4), Rgb([128, 128, 128]));

        targets.clear_slot(0);
        assert!(targets.slots()[0].pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_render_slot_out_of_range_is_ignored() {
        let mut targets = RenderTargets::new();
        let crop = Array3::<f32>::from_elem((8, 8, 3), 128.0);
        targets.render_slot(MAX_DISPLAY_FACES, crop.view());
        targets.clear_slot(MAX_DISPLAY_FACES);
    }

    #[test]
    fn test_snapshot_labels_follow_sign_convention() {
        let mut snapshot = ViewSnapshot::empty(PipelinePhase::Ready);
        snapshot.mask_scores[0] = Some(1.5);
        snapshot.mask_scores[1] = Some(-0.5);

        let labels = snapshot.labels();
        assert_eq!(labels[0], Some(MaskLabel::NoMask));
        assert_eq!(labels[1], Some(MaskLabel::Mask));
        assert_eq!(labels[2], None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = ViewSnapshot::empty(PipelinePhase::Ready);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("face_scores"));
        assert!(json.contains("null"));
    }
}
