//! Side-by-side composition of the original and transformed photo.

use std::io::Cursor;

use image::{
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
    RgbImage,
};

use crate::Result;

/// Composites never exceed this height, whatever the inputs are.
pub const MAX_HEIGHT: u32 = 1024;
pub const JPEG_QUALITY: u8 = 95;

/// Decode both images, scale them to a shared height and place them side by side.
///
/// Returns the composite encoded as JPEG.
pub fn combine_side_by_side(left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
    let left = image::load_from_memory(left)?.to_rgb8();
    let right = image::load_from_memory(right)?.to_rgb8();

    let target_height = left.height().min(right.height()).min(MAX_HEIGHT);
    let left = scale_to_height(&left, target_height);
    let right = scale_to_height(&right, target_height);

    let mut canvas = RgbImage::new(left.width() + right.width(), target_height);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(left.width()), 0);

    let mut out = Cursor::new(Vec::new());
    canvas.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out.into_inner())
}

/// Width after scaling `width x height` to `target_height`, aspect preserved.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    let w = (f64::from(width) * f64::from(target_height) / f64::from(height)).round();
    (w as u32).max(1)
}

fn scale_to_height(img: &RgbImage, target_height: u32) -> RgbImage {
    if img.height() == target_height {
        return img.clone();
    }
    let width = scaled_width(img.width(), img.height(), target_height);
    imageops::resize(img, width, target_height, FilterType::Lanczos3)
}
