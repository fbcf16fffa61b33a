use base64::Engine;
use thiserror::Error;
use tracing::info;

use crate::models::{ImageSlot, ReferenceImage};

#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("{}", read_failure(.0))]
    Empty(ImageSlot),
    #[error("{} Unsupported image type.", read_failure(.0))]
    UnknownType(ImageSlot),
}

fn read_failure(slot: &ImageSlot) -> &'static str {
    match slot {
        ImageSlot::Source => "Failed to read the image file.",
        ImageSlot::StyleReference => "Failed to read the style reference image file.",
        ImageSlot::CharacterReference => "Failed to read the character reference image file.",
        ImageSlot::ThumbnailReference => "Failed to read the thumbnail reference image file.",
    }
}

/// Encodes an uploaded file. A declared `image/*` type wins; otherwise the
/// type is sniffed from the file's magic bytes.
pub fn reference_image_from_upload(
    slot: ImageSlot,
    bytes: &[u8],
    declared_type: Option<&str>,
) -> Result<ReferenceImage, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Empty(slot));
    }

    let declared = declared_type
        .map(|t| t.split(';').next().unwrap_or(t).trim().to_ascii_lowercase())
        .filter(|t| t.starts_with("image/") && t.len() > "image/".len());

    let mime_type = match declared {
        Some(t) => t,
        None => image::guess_format(bytes)
            .map(|format| format.to_mime_type().to_string())
            .map_err(|_| UploadError::UnknownType(slot))?,
    };

    info!("📎 Uploaded {:?} image: {} ({} bytes)", slot, mime_type, bytes.len());
    Ok(ReferenceImage::new(base64::engine::general_purpose::STANDARD.encode(bytes), mime_type))
}
