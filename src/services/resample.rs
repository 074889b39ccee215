//! # Resampling Engine
//!
//! Decodes a source image, maps it onto the requested box with the selected
//! method and filter, and encodes the result. The engine performs no I/O:
//! the caller supplies the source bytes and persists the output.

use std::io::Cursor;

use image::{
    DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits, codecs::jpeg::JpegEncoder,
};
use tracing::{debug, instrument, trace};

use crate::error::{ThumbError, ThumbResult};
use crate::models::{ResampleMethod, ThumbFormat, ThumbnailSpec};

/// Where the kept window sits inside an overflowing fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Center,
    TopLeft,
    BottomRight,
}

#[derive(Debug, Clone)]
pub struct ResamplingEngine {
    max_pixels: u64,
    max_source_dimension: u32,
    jpeg_quality: u8,
}

impl ResamplingEngine {
    pub fn new(max_pixels: u64, max_source_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_pixels,
            max_source_dimension,
            jpeg_quality,
        }
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Produces the encoded thumbnail for `spec` from `source`.
    ///
    /// # Errors
    ///
    /// - [`ThumbError::DimensionsInvalid`] - zero or oversized target box
    /// - [`ThumbError::DecodeFailed`] - `source` is not a decodable image
    /// - [`ThumbError::EncodeFailed`] - the encoder rejected the output
    #[instrument(skip_all, fields(w = spec.width, h = spec.height, method = %spec.options.method))]
    pub fn generate(&self, spec: &ThumbnailSpec, source: &[u8]) -> ThumbResult<Vec<u8>> {
        spec.validate(self.max_pixels)?;

        let img = self.decode(source)?;
        let (src_w, src_h) = img.dimensions();
        trace!(src_w, src_h, "Source decoded");

        let filter = spec.options.filter.filter_type();
        let (w, h) = (spec.width, spec.height);
        let out = match spec.options.method {
            ResampleMethod::Fit => {
                if src_w <= w && src_h <= h {
                    img
                } else {
                    img.resize(w, h, filter)
                }
            }
            ResampleMethod::Resize => img.resize_exact(w, h, filter),
            ResampleMethod::FillCenter => fill(&img, w, h, filter, Anchor::Center),
            ResampleMethod::FillTopLeft => fill(&img, w, h, filter, Anchor::TopLeft),
            ResampleMethod::FillBottomRight => fill(&img, w, h, filter, Anchor::BottomRight),
        };

        let bytes = self.encode(&out, spec.options.format)?;
        debug!(
            out_w = out.width(),
            out_h = out.height(),
            size = bytes.len(),
            "Thumbnail encoded"
        );
        Ok(bytes)
    }

    fn decode(&self, source: &[u8]) -> ThumbResult<DynamicImage> {
        let mut reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| ThumbError::DecodeFailed(e.to_string()))?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_source_dimension);
        limits.max_image_height = Some(self.max_source_dimension);
        reader.limits(limits);

        reader
            .decode()
            .map_err(|e| ThumbError::DecodeFailed(e.to_string()))
    }

    fn encode(&self, img: &DynamicImage, format: ThumbFormat) -> ThumbResult<Vec<u8>> {
        let mut buffer = Vec::new();
        match format {
            ThumbFormat::Jpeg => {
                // JPEG carries no alpha channel
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
                    .encode_image(&rgb)
                    .map_err(|e| ThumbError::EncodeFailed(e.to_string()))?;
            }
            ThumbFormat::Png => {
                img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| ThumbError::EncodeFailed(e.to_string()))?;
            }
        }
        Ok(buffer)
    }
}

/// Crops the largest `w`:`h` window of `img` at `anchor`, then scales it to
/// exactly `w`x`h`.
///
/// Cropping first keeps every intermediate buffer within the source or the
/// target box, whatever the source aspect ratio.
fn fill(
    img: &DynamicImage,
    w: u32,
    h: u32,
    filter: image::imageops::FilterType,
    anchor: Anchor,
) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let (crop_w, crop_h) = crop_window(src_w, src_h, w, h);

    let (x, y) = match anchor {
        Anchor::Center => ((src_w - crop_w) / 2, (src_h - crop_h) / 2),
        Anchor::TopLeft => (0, 0),
        Anchor::BottomRight => (src_w - crop_w, src_h - crop_h),
    };
    trace!(x, y, crop_w, crop_h, "Fill window");

    let window = img.crop_imm(x, y, crop_w, crop_h);
    if (crop_w, crop_h) == (w, h) {
        window
    } else {
        window.resize_exact(w, h, filter)
    }
}

/// Largest window of the `w`:`h` aspect ratio that fits in the source.
fn crop_window(src_w: u32, src_h: u32, w: u32, h: u32) -> (u32, u32) {
    let (src_w64, src_h64) = (u64::from(src_w), u64::from(src_h));
    let (w64, h64) = (u64::from(w), u64::from(h));

    // Compare src_w/src_h against w/h without floating point
    if src_w64 * h64 > src_h64 * w64 {
        // Source is wider: keep the full height
        let crop_w = (src_h64 * w64 + h64 / 2) / h64;
        (crop_w.clamp(1, src_w64) as u32, src_h)
    } else {
        let crop_h = (src_w64 * h64 + w64 / 2) / w64;
        (src_w, crop_h.clamp(1, src_h64) as u32)
    }
}
