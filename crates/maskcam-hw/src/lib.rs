//! maskcam-hw — Capture source abstraction.
//!
//! The pipeline engine pulls frames through one [`FrameSource`] interface;
//! behind it sit a V4L2 camera and a still test image. A source that is
//! not ready yet reports `None` rather than an error, so the pipeline
//! idles instead of crashing.

pub mod camera;
pub mod frame;
pub mod source;
pub mod still;

pub use camera::{CameraSource, DeviceInfo};
pub use frame::RgbFrame;
pub use source::{CaptureError, FrameSource, SourceKind};
pub use still::StillImageSource;
