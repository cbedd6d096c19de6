//! The inference pipeline controller.
//!
//! Drives one capture, detect, decode, crop, classify, render pass per
//! tick. Every intermediate numeric buffer a cycle allocates is
//! [`Tracked`] against the engine's [`BufferGauge`], and the gauge must
//! return to its pre-cycle baseline on every exit path; the engine checks
//! that after each cycle. Per-cycle failures are logged and absorbed at
//! the cycle boundary, while model-load failures propagate to whoever
//! requested the (re)load.

use std::path::Path;
use std::time::Duration;

use maskcam_core::types::CLASSIFIER_CROP_SIZE;
use maskcam_core::{
    decoder, geometry, tensor, BufferGauge, CaptureSize, ClassifyModel, DetectModel, DrawSize,
    FaceDetector, InferError, MaskClassifier, ModelLoadError, Tracked,
};
use maskcam_hw::{CaptureError, FrameSource, SourceKind};
use ndarray::Axis;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::view::{PipelinePhase, RenderTargets, ViewSnapshot, MAX_DISPLAY_FACES};

/// Primary aspect ratio requested from the camera (16:9).
const CAMERA_ASPECT_RATIO: f32 = 16.0 / 9.0;

/// Consecutive not-ready cycles before the engine warns that the capture
/// source has never produced a frame.
const NOT_READY_WARN_TICKS: usize = 50;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("inference error: {0}")]
    Infer(#[from] InferError),
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A model handle is absent; no work was attempted.
    ModelsNotLoaded,
    /// The source had no decodable frame; nothing was touched.
    SourceNotReady,
    /// The cycle ran to completion and published a snapshot.
    Completed { detections: usize },
}

/// Control messages for a running engine.
pub enum EngineEvent {
    /// The display area changed; still sources re-run a cycle.
    Resized { width: u32, height: u32 },
    /// Swap the frame source (camera ↔ still image). An in-flight cycle's
    /// buffers belong to the frame it started with, so the swap cannot
    /// corrupt it.
    SwitchSource(Box<dyn FrameSource + Send>),
    Shutdown,
}

/// The pipeline controller. Generic over the two model seams so cycle
/// behavior can be exercised with stub models.
pub struct Engine<D, C> {
    detector: Option<D>,
    classifier: Option<C>,
    source: Box<dyn FrameSource + Send>,
    targets: RenderTargets,
    view_size: (u32, u32),
    threshold: f32,
    gauge: BufferGauge,
    phase: PipelinePhase,
    not_ready_streak: usize,
    publisher: watch::Sender<ViewSnapshot>,
}

impl<D: DetectModel, C: ClassifyModel> Engine<D, C> {
    pub fn new(
        source: Box<dyn FrameSource + Send>,
        view_size: (u32, u32),
        threshold: f32,
        publisher: watch::Sender<ViewSnapshot>,
    ) -> Self {
        Self {
            detector: None,
            classifier: None,
            source,
            targets: RenderTargets::new(),
            view_size,
            threshold,
            gauge: BufferGauge::new(),
            phase: PipelinePhase::Idle,
            not_ready_streak: 0,
            publisher,
        }
    }

    pub fn gauge(&self) -> &BufferGauge {
        &self.gauge
    }

    pub fn render_targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn set_view_size(&mut self, width: u32, height: u32) {
        self.view_size = (width, height);
    }

    pub fn set_source(&mut self, source: Box<dyn FrameSource + Send>) {
        self.source = source;
    }

    /// Install freshly built model handles, entering `Ready`. Any previous
    /// handles are dropped first, so two backend resource sets never
    /// coexist.
    pub fn install_models(&mut self, detector: D, classifier: C) {
        self.detector = None;
        self.classifier = None;
        self.detector = Some(detector);
        self.classifier = Some(classifier);
        self.phase = PipelinePhase::Ready;
        self.publisher.send_replace(ViewSnapshot::empty(self.phase));
    }

    /// Drop both model handles and return to `Idle`.
    pub fn teardown(&mut self) {
        self.detector = None;
        self.classifier = None;
        self.phase = PipelinePhase::Idle;
        self.publisher.send_replace(ViewSnapshot::empty(self.phase));
    }

    /// Run cycles until shutdown. Live camera sources tick on a fixed
    /// period with skipped-tick semantics: a slow cycle drops ticks
    /// instead of queuing work. Still sources run once up front and again
    /// on each relevant input change.
    pub async fn run(&mut self, mut events: mpsc::Receiver<EngineEvent>, tick_period: Duration) {
        let mut ticker = tokio::time::interval(tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.source.kind() == SourceKind::StillImage {
            log_cycle(self.run_cycle());
        }

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.source.kind() == SourceKind::Camera => {
                    log_cycle(self.run_cycle());
                }
                event = events.recv() => match event {
                    None | Some(EngineEvent::Shutdown) => {
                        self.teardown();
                        break;
                    }
                    Some(EngineEvent::Resized { width, height }) => {
                        self.view_size = (width, height);
                        if self.source.kind() == SourceKind::StillImage {
                            log_cycle(self.run_cycle());
                        }
                    }
                    Some(EngineEvent::SwitchSource(source)) => {
                        tracing::info!(kind = ?source.kind(), "switching frame source");
                        self.source = source;
                        if self.source.kind() == SourceKind::StillImage {
                            log_cycle(self.run_cycle());
                        }
                    }
                }
            }
        }
    }

    /// Run one cycle and verify the buffer-leak invariant around it.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, EngineError> {
        let baseline = self.gauge.live();
        let result = self.cycle_inner();
        let live = self.gauge.live();
        if live != baseline {
            tracing::error!(baseline, live, "cycle leaked intermediate buffers");
            debug_assert_eq!(live, baseline, "cycle leaked intermediate buffers");
        }
        if self.phase == PipelinePhase::CycleRunning {
            self.phase = PipelinePhase::Ready;
        }
        if matches!(&result, Ok(CycleOutcome::SourceNotReady)) {
            self.not_ready_streak += 1;
            if self.not_ready_streak == NOT_READY_WARN_TICKS {
                tracing::warn!("capture source has produced no frames; still waiting");
            }
        } else {
            self.not_ready_streak = 0;
        }
        result
    }

    fn cycle_inner(&mut self) -> Result<CycleOutcome, EngineError> {
        let (Some(detector), Some(classifier)) =
            (self.detector.as_mut(), self.classifier.as_mut())
        else {
            return Ok(CycleOutcome::ModelsNotLoaded);
        };

        let Some(frame) = self.source.current_frame()? else {
            return Ok(CycleOutcome::SourceNotReady);
        };
        self.phase = PipelinePhase::CycleRunning;

        let capture = self
            .source
            .capture_size()
            .unwrap_or((frame.width, frame.height));

        // The layout is recomputed wholesale from current inputs; the
        // overlay resize below is idempotent when nothing changed.
        let (view_w, view_h) = self.view_size;
        let (draw_w, draw_h) = match self.source.kind() {
            SourceKind::Camera => {
                geometry::fit_with_aspect(view_w as f32, view_h as f32, CAMERA_ASPECT_RATIO)
            }
            SourceKind::StillImage => geometry::fit_source(
                view_w as f32,
                view_h as f32,
                capture.0 as f32,
                capture.1 as f32,
            ),
        };
        self.targets
            .resize_overlay(draw_w.round() as u32, draw_h.round() as u32);

        let frame_tensor = match tensor::frame_tensor(&frame.data, frame.width, frame.height) {
            Ok(t) => Tracked::new(&self.gauge, t),
            Err(e) => {
                tracing::warn!(error = %e, "frame buffer has unexpected length; skipping cycle");
                return Ok(CycleOutcome::SourceNotReady);
            }
        };

        // Batched [1, H, W, 3] view; channel order flows through untouched.
        let raw = {
            let input = frame_tensor.view().insert_axis(Axis(0));
            Tracked::new(&self.gauge, detector.detect(input)?)
        };

        let detections = decoder::decode(
            &raw.scores,
            self.threshold,
            &raw.boxes,
            DrawSize {
                width: draw_w,
                height: draw_h,
            },
            CaptureSize {
                width: capture.0,
                height: capture.1,
            },
        );
        drop(raw);

        let mut face_scores = [None; MAX_DISPLAY_FACES];
        let mut mask_scores = [None; MAX_DISPLAY_FACES];

        if detections.is_empty() {
            self.targets.clear_overlay();
            for slot in 0..MAX_DISPLAY_FACES {
                self.targets.clear_slot(slot);
            }
            self.publisher.send_replace(ViewSnapshot {
                phase: PipelinePhase::Ready,
                face_scores,
                mask_scores,
            });
            return Ok(CycleOutcome::Completed { detections: 0 });
        }

        // Every detection gets a rectangle; only the first
        // MAX_DISPLAY_FACES get a score slot.
        self.targets.clear_overlay();
        for (i, det) in detections.iter().enumerate() {
            self.targets.draw_box(det.bbox);
            if i < MAX_DISPLAY_FACES {
                face_scores[i] = Some(det.score);
            }
        }

        let crop_boxes: Vec<[f32; 4]> = detections.iter().map(|d| d.crop_box).collect();
        let box_indices: Vec<usize> = detections.iter().map(|d| d.box_index).collect();

        // Tile the frame into a batch with a broadcast view (no pixel
        // copies) and issue the single batched crop-and-resize call.
        let height = frame.height as usize;
        let width = frame.width as usize;
        let batched = frame_tensor.view().insert_axis(Axis(0));
        let Some(tiled) = batched.broadcast((detections.len(), height, width, 3)) else {
            return Err(InferError::InferenceFailed("frame tile broadcast failed".into()).into());
        };
        let crops = Tracked::new(
            &self.gauge,
            tensor::crop_and_resize(
                tiled,
                &crop_boxes,
                &box_indices,
                (CLASSIFIER_CROP_SIZE, CLASSIFIER_CROP_SIZE),
            ),
        );

        // The whole batch classifies in one call, before any slot score is
        // published.
        let scores = Tracked::new(&self.gauge, classifier.classify(crops.view())?);
        if scores.len() != detections.len() {
            return Err(InferError::InferenceFailed(format!(
                "classifier returned {} scores for {} detections",
                scores.len(),
                detections.len()
            ))
            .into());
        }

        for slot in 0..MAX_DISPLAY_FACES {
            if slot < detections.len() {
                self.targets
                    .render_slot(slot, crops.index_axis(Axis(0), slot));
                mask_scores[slot] = Some(scores[slot]);
            } else {
                self.targets.clear_slot(slot);
            }
        }

        self.publisher.send_replace(ViewSnapshot {
            phase: PipelinePhase::Ready,
            face_scores,
            mask_scores,
        });

        Ok(CycleOutcome::Completed {
            detections: detections.len(),
        })
    }
}

impl Engine<FaceDetector, MaskClassifier> {
    /// (Re)load both ONNX models, publishing fractional progress through
    /// the snapshot channel.
    ///
    /// Previous handles are dropped before the replacements load, so two
    /// backend resource sets never coexist. A failed load leaves the
    /// engine idle with no partial handle; calling again retries cleanly.
    pub fn load_models(
        &mut self,
        detection_path: &Path,
        classification_path: &Path,
    ) -> Result<(), ModelLoadError> {
        self.detector = None;
        self.classifier = None;
        self.phase = PipelinePhase::ModelsLoading {
            detection: 0.0,
            classification: 0.0,
        };
        self.publisher.send_replace(ViewSnapshot::empty(self.phase));

        match self.build_models(detection_path, classification_path) {
            Ok((detector, classifier)) => {
                self.detector = Some(detector);
                self.classifier = Some(classifier);
                self.phase = PipelinePhase::Ready;
                self.publisher.send_replace(ViewSnapshot::empty(self.phase));
                tracing::info!("models loaded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "model load failed");
                self.phase = PipelinePhase::Idle;
                self.publisher.send_replace(ViewSnapshot::empty(self.phase));
                Err(e)
            }
        }
    }

    fn build_models(
        &self,
        detection_path: &Path,
        classification_path: &Path,
    ) -> Result<(FaceDetector, MaskClassifier), ModelLoadError> {
        let publisher = &self.publisher;
        let detector = FaceDetector::load(detection_path, &mut |fraction| {
            publisher.send_replace(ViewSnapshot::empty(PipelinePhase::ModelsLoading {
                detection: fraction,
                classification: 0.0,
            }));
        })?;
        let classifier = MaskClassifier::load(classification_path, &mut |fraction| {
            publisher.send_replace(ViewSnapshot::empty(PipelinePhase::ModelsLoading {
                detection: 1.0,
                classification: fraction,
            }));
        })?;
        Ok((detector, classifier))
    }
}

fn log_cycle(result: Result<CycleOutcome, EngineError>) {
    match result {
        Ok(CycleOutcome::Completed { detections }) => {
            tracing::debug!(detections, "cycle completed")
        }
        Ok(CycleOutcome::SourceNotReady) => tracing::debug!("source not ready; cycle skipped"),
        Ok(CycleOutcome::ModelsNotLoaded) => tracing::debug!("models not loaded; cycle skipped"),
        Err(e) => tracing::warn!(error = %e, "cycle aborted"),
    }
}
