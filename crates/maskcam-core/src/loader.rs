//! Model artifact loading with fractional progress reporting.

use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("failed to read model artifact: {0}")]
    Read(#[from] std::io::Error),
    #[error("model has unexpected signature: {0}")]
    UnexpectedSignature(String),
    #[error("ort: {0}")]
    Backend(#[from] ort::Error),
}

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Read a model artifact into memory, reporting monotonic fractional
/// progress (0.0 → 1.0) through `on_progress` after each chunk.
///
/// On failure nothing is retained, so the caller can simply retry; the
/// session is only built from the returned bytes.
pub fn read_model_with_progress(
    path: &Path,
    on_progress: &mut dyn FnMut(f32),
) -> Result<Vec<u8>, ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.display().to_string()));
    }

    let file = std::fs::File::open(path)?;
    let total = file.metadata()?.len();
    let mut reader = std::io::BufReader::new(file);

    on_progress(0.0);

    let mut bytes = Vec::with_capacity(total as usize);
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        let fraction = if total == 0 {
            1.0
        } else {
            (bytes.len() as f64 / total as f64) as f32
        };
        on_progress(fraction.min(1.0));
    }
    on_progress(1.0);

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_artifact(len: usize) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("maskcam-loader-test-{len}.bin"));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0xabu8; len]).unwrap();
        path
    }

    #[test]
    fn test_read_reports_monotonic_progress_to_one() {
        let path = temp_artifact(3 * READ_CHUNK_BYTES + 17);
        let mut fractions = Vec::new();
        let bytes = read_model_with_progress(&path, &mut |f| fractions.push(f)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(bytes.len(), 3 * READ_CHUNK_BYTES + 17);
        assert_eq!(fractions.first().copied(), Some(0.0));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "{fractions:?}");
    }

    #[test]
    fn test_read_empty_artifact_still_completes() {
        let path = temp_artifact(0);
        let mut fractions = Vec::new();
        let bytes = read_model_with_progress(&path, &mut |f| fractions.push(f)).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(bytes.is_empty());
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_model_with_progress(Path::new("/nonexistent/model.onnx"), &mut |_| {});
        assert!(matches!(err, Err(ModelLoadError::NotFound(_))));
    }
}
