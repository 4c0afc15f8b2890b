//! Image codec used by the conversion pipeline
//!
//! Uses:
//! - **mozjpeg** for JPEG: 4-channel (CMYK/YCCK) decode to raw ink samples, and encode
//! - **image crate** for every other container and for 1/3-channel JPEG decode;
//!   CMYK TIFFs arrive as RGB pixels and are classified by their stored color type

use crate::jpeg_header::{read_header, JpegHeader};
use crate::{ColorspaceError, DecodedImage, Result};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Decode and encode primitives the pipeline relies on
pub trait ImageCodec: Send + Sync {
    /// Decode bytes, recording container format and colorspace
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage>;

    /// Encode in the image's original container format
    fn encode(&self, image: &DecodedImage) -> Result<Vec<u8>>;
}

/// Default codec backed by mozjpeg and the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct StandardCodec {
    jpeg_quality: u8,
}

impl StandardCodec {
    /// `jpeg_quality` is clamped to 1-100
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(95)
    }
}

impl ImageCodec for StandardCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let format = image::guess_format(bytes).map_err(|_| ColorspaceError::UnknownFormat)?;

        if format == ImageFormat::Jpeg {
            let header = read_header(bytes)?;
            debug!(
                width = header.width,
                height = header.height,
                components = header.components,
                adobe_transform = ?header.adobe_transform,
                "Read JPEG header"
            );
            if header.components == 4 {
                return decode_cmyk_jpeg(bytes, &header);
            }
        }

        // Some decoders (TIFF) hand back CMYK files as RGB pixels; the original
        // color type is the only record of the stored mode
        let decoder = ImageReader::with_format(Cursor::new(bytes), format)
            .into_decoder()
            .map_err(|e| ColorspaceError::DecodeError(e.to_string()))?;
        let stored = decoder.original_color_type();
        let image = DynamicImage::from_decoder(decoder)
            .map_err(|e| ColorspaceError::DecodeError(e.to_string()))?;

        Ok(DecodedImage::from_decoder_output(image, stored, format))
    }

    fn encode(&self, image: &DecodedImage) -> Result<Vec<u8>> {
        let pixels = image.as_dynamic().ok_or_else(|| {
            ColorspaceError::Unsupported(format!("cannot encode {} samples", image.colorspace()))
        })?;

        match image.format() {
            ImageFormat::Jpeg => encode_jpeg(&pixels.to_rgb8(), self.jpeg_quality),
            format => {
                let mut buffer = Vec::new();
                pixels
                    .write_to(&mut Cursor::new(&mut buffer), format)
                    .map_err(|e| ColorspaceError::EncodeError(e.to_string()))?;
                Ok(buffer)
            }
        }
    }
}

/// Decode a 4-channel JPEG to raw CMYK samples (YCCK is converted to CMYK by libjpeg)
fn decode_cmyk_jpeg(bytes: &[u8], header: &JpegHeader) -> Result<DecodedImage> {
    let decompress = mozjpeg::Decompress::new_mem(bytes)
        .map_err(|e| ColorspaceError::DecodeError(format!("Failed to create decompressor: {e}")))?;

    let (width, height) = (decompress.width(), decompress.height());

    let mut started = decompress
        .to_colorspace(mozjpeg::ColorSpace::JCS_CMYK)
        .map_err(|e| ColorspaceError::DecodeError(format!("Failed to start CMYK decode: {e}")))?;

    let samples: Vec<u8> = started
        .read_scanlines()
        .map_err(|e| ColorspaceError::DecodeError(format!("Failed to read scanlines: {e}")))?;

    started
        .finish()
        .map_err(|e| ColorspaceError::DecodeError(format!("Failed to finish decode: {e}")))?;

    let width = u32::try_from(width)
        .map_err(|_| ColorspaceError::Corrupted(format!("width {width} out of range")))?;
    let height = u32::try_from(height)
        .map_err(|_| ColorspaceError::Corrupted(format!("height {height} out of range")))?;

    DecodedImage::from_cmyk(
        width,
        height,
        samples,
        header.has_adobe_marker(),
        header.colorspace(),
        ImageFormat::Jpeg,
    )
}

/// Encode RGB pixels as JPEG with mozjpeg
fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(f32::from(quality));

    let mut comp_started = comp
        .start_compress(Vec::new())
        .map_err(|e| ColorspaceError::EncodeError(format!("Failed to start compression: {e}")))?;

    comp_started
        .write_scanlines(image.as_raw())
        .map_err(|e| ColorspaceError::EncodeError(format!("Failed to write scanlines: {e}")))?;

    comp_started
        .finish()
        .map_err(|e| ColorspaceError::EncodeError(format!("Failed to finish compression: {e}")))
}
