use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::error::AdapterError;

/// Anything smaller is a placeholder or an error page, not a camera frame.
pub const MIN_SNAPSHOT_BYTES: usize = 1024;

/// A fetched frame that decodes as an image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

pub fn inspect_snapshot(bytes: Vec<u8>) -> Result<Snapshot, AdapterError> {
    if bytes.len() < MIN_SNAPSHOT_BYTES {
        return Err(AdapterError::InvalidImage(format!(
            "snapshot too small ({} bytes)",
            bytes.len()
        )));
    }

    let format = image::guess_format(&bytes)
        .map_err(|err| AdapterError::InvalidImage(format!("unrecognised format: {err}")))?;
    let mime_type = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        other => {
            return Err(AdapterError::InvalidImage(format!(
                "unsupported format {other:?}"
            )))
        }
    };

    let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format)
        .into_dimensions()
        .map_err(|err| AdapterError::InvalidImage(err.to_string()))?;
    if width == 0 || height == 0 {
        return Err(AdapterError::InvalidImage("empty frame".into()));
    }

    Ok(Snapshot {
        bytes,
        mime_type,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::camera::testing::png_frame;

    #[test]
    fn accepts_png_frame() {
        let snapshot = inspect_snapshot(png_frame(128, 96)).unwrap();
        assert_eq!(snapshot.mime_type, "image/png");
        assert_eq!((snapshot.width, snapshot.height), (128, 96));
    }

    #[test]
    fn rejects_tiny_payload() {
        let err = inspect_snapshot(vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidImage(msg) if msg.contains("too small")));
    }

    #[test]
    fn rejects_non_image_payload() {
        let html = "<html><body>camera unavailable</body></html>".repeat(50);
        let err = inspect_snapshot(html.into_bytes()).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidImage(_)));
    }
}
