use std::io::Cursor;

use image::ImageReader;

use crate::error::{OcrGateError, Result};

/// What the server learns about an upload before touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Reject anything that is not a decodable raster image.
///
/// Magic bytes decide the type (client-supplied content types and
/// extensions are not trusted); only the header is parsed for dimensions.
pub fn inspect_image(bytes: &[u8]) -> Result<ImageInfo> {
    if bytes.is_empty() {
        return Err(OcrGateError::Validation("Uploaded image is empty".to_string()));
    }

    let kind = infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .ok_or_else(|| {
            OcrGateError::Validation("Uploaded file is not a recognized image".to_string())
        })?;

    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| OcrGateError::Validation(format!("Failed to read image: {e}")))?
        .into_dimensions()
        .map_err(|e| {
            OcrGateError::Validation(format!("Unsupported {} image: {e}", kind.mime_type()))
        })?;

    if width == 0 || height == 0 {
        return Err(OcrGateError::Validation(format!(
            "Image has no pixels: {width}x{height}"
        )));
    }

    Ok(ImageInfo {
        mime_type: kind.mime_type().to_string(),
        width,
        height,
    })
}
