//! Still test-image source.

use crate::frame::RgbFrame;
use crate::source::{CaptureError, FrameSource, SourceKind};
use std::path::Path;

/// A static test image behind the [`FrameSource`] interface.
///
/// Ready as soon as the file has decoded; every cycle receives the same
/// pixels at the image's natural dimensions.
pub struct StillImageSource {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u32,
}

impl StillImageSource {
    /// Decode an image file into an RGB24 buffer.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        if !path.exists() {
            return Err(CaptureError::NotFound(path.display().to_string()));
        }

        let image = image::open(path)
            .map_err(|e| CaptureError::Decode(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (width, height) = image.dimensions();

        tracing::info!(path = %path.display(), width, height, "loaded test image");

        Ok(Self {
            data: image.into_raw(),
            width,
            height,
            sequence: 0,
        })
    }

    /// Natural dimensions of the decoded image.
    pub fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for StillImageSource {
    fn current_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError> {
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(RgbFrame::new(
            self.data.clone(),
            self.width,
            self.height,
            self.sequence,
        )))
    }

    fn capture_size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::StillImage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_png(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("maskcam-still-{name}.png"));
        let img = image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_still_source_ready_with_natural_dims() {
        let path = temp_png("dims");
        let mut source = StillImageSource::open(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(source.natural_size(), (6, 4));
        assert_eq!(source.capture_size(), Some((6, 4)));
        assert_eq!(source.kind(), SourceKind::StillImage);

        let frame = source.current_frame().unwrap().unwrap();
        assert_eq!(frame.width, 6);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.data.len(), 6 * 4 * 3);
        assert_eq!(&frame.data[0..3], &[10, 20, 30]);
    }

    #[test]
    fn test_still_source_sequence_advances() {
        let path = temp_png("sequence");
        let mut source = StillImageSource::open(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let a = source.current_frame().unwrap().unwrap();
        let b = source.current_frame().unwrap().unwrap();
        assert!(b.sequence > a.sequence);
    }

    #[test]
    fn test_still_source_missing_file() {
        let err = StillImageSource::open(Path::new("/nonexistent/img.png"));
        assert!(matches!(err, Err(CaptureError::NotFound(_))));
    }
}
