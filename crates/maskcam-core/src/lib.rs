//! maskcam-core — Face detection and mask classification engine.
//!
//! Wraps the two ONNX models (SSD face detector, binary mask classifier)
//! behind narrow adapters, decodes raw detector output into pixel-space
//! detections, and provides the tensor plumbing between them: batched
//! crop-and-resize and cycle-scoped buffer tracking.

pub mod arena;
pub mod classifier;
pub mod decoder;
pub mod detector;
pub mod geometry;
pub mod loader;
pub mod model;
pub mod tensor;
pub mod types;

pub use arena::{BufferGauge, Tracked};
pub use classifier::MaskClassifier;
pub use detector::FaceDetector;
pub use loader::ModelLoadError;
pub use model::{ClassifyModel, DetectModel, InferError};
pub use types::{CaptureSize, Detection, DrawSize, MaskLabel, RawDetections};
