use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;

/// Preprocessing failure; both variants mean the source was not a usable
/// image.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image could not be decoded")]
    Decode(#[source] image::ImageError),
    #[error("image could not be re-encoded")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    pub target_width: u32,
    pub jpeg_quality: u8,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            target_width: 1200,
            jpeg_quality: 75,
        }
    }
}

/// Resizes a captured photo to the target width (aspect ratio preserved)
/// and re-encodes it as JPEG. Pure transform: bounds upload size and
/// normalizes the resolution the model sees.
pub fn preprocess(raw: &[u8], opts: PreprocessOptions) -> Result<Bytes, PreprocessError> {
    let img = image::load_from_memory(raw).map_err(PreprocessError::Decode)?;

    let scale = opts.target_width as f64 / img.width() as f64;
    let target_height = ((img.height() as f64 * scale).round() as u32).max(1);
    let resized = img.resize_exact(opts.target_width, target_height, FilterType::Lanczos3);

    let rgb = resized.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, opts.jpeg_quality)
        .encode_image(&rgb)
        .map_err(PreprocessError::Encode)?;
    Ok(Bytes::from(out))
}
