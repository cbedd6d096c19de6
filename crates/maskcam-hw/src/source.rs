//! The capture seam the pipeline engine pulls frames through.

use crate::frame::RgbFrame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture source not found: {0}")]
    NotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("image decode failed: {0}")]
    Decode(String),
}

/// Which kind of source is feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    StillImage,
}

/// Where a cycle's pixels come from.
///
/// `Ok(None)` means "no decodable frame yet", e.g. a camera stream that
/// has not produced a frame. The engine treats it as a no-op cycle, not a
/// failure. A cycle's buffers derive from the frame returned at its
/// start; swapping the source mid-run never touches them.
pub trait FrameSource {
    /// The current frame, or `None` while the source is not ready.
    fn current_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError>;

    /// Native capture dimensions, once known.
    fn capture_size(&self) -> Option<(u32, u32)>;

    fn kind(&self) -> SourceKind;
}
