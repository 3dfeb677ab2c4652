//! Image encoding: rendered bitmap → encoded bytes.
//!
//! Raw RGBA bitmaps of a 4× supersampled Letter page weigh ~120 MB, so each
//! page is encoded as soon as it is rendered and only the encoded form is
//! kept. JPEG is the default and embeds into the OCR page without
//! re-encoding; PNG is available when lossless page images matter more than
//! size.

use crate::config::RasterFormat;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Container format of an [`EncodedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

impl ImageEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Png => "png",
        }
    }
}

/// An encoded page bitmap plus the metadata downstream stages need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub encoding: ImageEncoding,
    pub width_px: u32,
    pub height_px: u32,
    /// Effective resolution (72 × scale factor), passed to the OCR engine.
    pub dpi: u32,
    pub data: Vec<u8>,
}

/// Encode a rendered page. Alpha is dropped; pages are composed on white.
pub fn encode_page(
    img: DynamicImage,
    format: RasterFormat,
    dpi: u32,
) -> Result<EncodedImage, image::ImageError> {
    let rgb = img.into_rgb8();
    let (width_px, height_px) = rgb.dimensions();
    let mut buf = Vec::new();

    let encoding = match format {
        RasterFormat::Jpeg { quality } => {
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
            ImageEncoding::Jpeg
        }
        RasterFormat::Png => {
            DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
            ImageEncoding::Png
        }
    };

    debug!(
        "Encoded {}x{} page → {} bytes {:?}",
        width_px,
        height_px,
        buf.len(),
        encoding
    );

    Ok(EncodedImage {
        encoding,
        width_px,
        height_px,
        dpi,
        data: buf,
    })
}

/// Decode an encoded page back to RGB samples.
pub fn decode_rgb(image: &EncodedImage) -> Result<RgbImage, image::ImageError> {
    let format = match image.encoding {
        ImageEncoding::Jpeg => image::ImageFormat::Jpeg,
        ImageEncoding::Png => image::ImageFormat::Png,
    };
    Ok(image::load_from_memory_with_format(&image.data, format)?.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_page() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_jpeg() {
        let img = encode_page(red_page(), RasterFormat::Jpeg { quality: 90 }, 288).unwrap();
        assert_eq!(img.encoding, ImageEncoding::Jpeg);
        assert_eq!((img.width_px, img.height_px), (16, 8));
        assert_eq!(&img.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn encode_png_is_lossless() {
        let img = encode_page(red_page(), RasterFormat::Png, 288).unwrap();
        assert_eq!(img.encoding, ImageEncoding::Png);
        let rgb = decode_rgb(&img).unwrap();
        assert_eq!(rgb.dimensions(), (16, 8));
        assert!(rgb.pixels().all(|p| p.0 == [255, 0, 0]));
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_page(red_page(), RasterFormat::default(), 288).unwrap();
        let b = encode_page(red_page(), RasterFormat::default(), 288).unwrap();
        assert_eq!(a, b);
    }
}
