//! Derives thumbnails from original images.
//!
//! Thumbnails always have the same height. Their width follows the original's
//! aspect ratio.

use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView as _, ImageFormat};

use crate::error::ThumbnailError;

/// The height that thumbnails get when nobody says otherwise.
pub const DEFAULT_HEIGHT: u32 = 200;

/// Computes the size of a thumbnail for an image that's `width` x `height`.
///
/// The result is always exactly `target_height` tall, even when that means
/// scaling a small image up. Width rounds to the nearest pixel and never
/// drops below one.
pub fn dimensions(width: u32, height: u32, target_height: u32) -> (u32, u32) {
    let target_height = target_height.max(1);
    if height == 0 {
        return (width.max(1), target_height);
    }

    let scaled = (u64::from(width) * u64::from(target_height) + u64::from(height) / 2)
        / u64::from(height);
    let scaled = u32::try_from(scaled).unwrap_or(u32::MAX).max(1);

    (scaled, target_height)
}

/// Resizes an already-decoded image to thumbnail size.
pub fn resize(img: &DynamicImage, target_height: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (thumb_w, thumb_h) = dimensions(w, h, target_height);
    img.resize_exact(thumb_w, thumb_h, FilterType::Triangle)
}

/// Decodes `original`, resizes it, and encodes it again in the format matching
/// `extension`.
///
/// This is CPU-heavy. Run it on a blocking thread.
pub fn render(
    original: &[u8],
    target_height: u32,
    extension: &str,
    name: &str,
) -> Result<Vec<u8>, ThumbnailError> {
    let format = ImageFormat::from_extension(extension)
        .ok_or_else(|| ThumbnailError::UnsupportedFormat(extension.to_string()))?;

    let img = image::load_from_memory(original)
        .map_err(|e| ThumbnailError::ImageParsingFailed(e, name.to_string()))?;

    let mut thumbnail = resize(&img, target_height);

    // jpeg can't hold an alpha channel
    if format == ImageFormat::Jpeg {
        thumbnail = DynamicImage::ImageRgb8(thumbnail.to_rgb8());
    }

    let mut buf = Vec::new();
    thumbnail
        .write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| ThumbnailError::ThumbnailSaveFailure(e, name.to_string()))?;

    Ok(buf)
}
