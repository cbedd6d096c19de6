//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, RgbFrame};
use crate::source::{CaptureError, FrameSource, SourceKind};
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed RGB24 (3 bytes/pixel, passed through).
    Rgb3,
}

/// Live camera source.
pub struct CameraSource {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    sequence: u32,
}

impl CameraSource {
    /// Open a V4L2 device by path (e.g. "/dev/video0") and negotiate the
    /// requested capture size.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
        if !Path::new(device_path).exists() {
            return Err(CaptureError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CaptureError::DeviceBusy
            } else {
                CaptureError::NotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::StreamingNotSupported);
        }

        let mut fmt = device
            .format()
            .map_err(|e| CaptureError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CaptureError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb3
        } else {
            return Err(CaptureError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or RGB3)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
            sequence: 0,
        })
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CaptureError> {
        let pixels = (self.width * self.height) as usize;
        match self.pixel_format {
            PixelFormat::Rgb3 => {
                let expected = pixels * 3;
                if buf.len() < expected {
                    return Err(CaptureError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..expected].to_vec())
            }
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CaptureError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
            });
        }

        devices
    }
}

impl FrameSource for CameraSource {
    /// Dequeue one frame. A frame the driver delivers but we cannot decode
    /// counts as "not ready" — the stream has not produced a usable frame
    /// yet — rather than a hard failure.
    fn current_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CaptureError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, meta) = match stream.next() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "frame dequeue failed; treating source as not ready");
                return Ok(None);
            }
        };

        match self.buf_to_rgb(buf) {
            Ok(rgb) => {
                self.sequence = meta.sequence;
                Ok(Some(RgbFrame::new(rgb, self.width, self.height, meta.sequence)))
            }
            Err(e) => {
                tracing::warn!(error = %e, seq = meta.sequence, "undecodable frame; skipping");
                Ok(None)
            }
        }
    }

    fn capture_size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }
}
