//! Colorspace detection and conversion
//!
//! Classifies decoded images by the mode recorded in the file and converts anything
//! outside the RGB family to RGB, keeping the original container format:
//! - **JPEG**: mode read from the frame header and Adobe APP14 marker; CMYK/YCCK
//!   samples are decoded with mozjpeg so the conversion sees the real ink values
//! - **Other containers**: mode taken from the decoder's stored color type when it
//!   differs from the pixel layout (CMYK TIFF), otherwise from the layout
//!
//! # Example
//! ```no_run
//! use normalizer_colorspace::{classify, convert_to_target, ImageCodec, StandardCodec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = StandardCodec::default();
//! let bytes = std::fs::read("poster_cmyk.jpg")?;
//!
//! let image = codec.decode(&bytes)?;
//! if !classify(&image).is_target() {
//!     let rgb = convert_to_target(image)?;
//!     std::fs::write("poster_rgb.jpg", codec.encode(&rgb)?)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod jpeg_header;

pub use codec::{ImageCodec, StandardCodec};
pub use image::ImageFormat;

use image::{ColorType, DynamicImage, ExtendedColorType, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while decoding, converting or encoding an image
#[derive(Error, Debug)]
pub enum ColorspaceError {
    #[error("Unrecognized image format")]
    UnknownFormat,

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Corrupted image: {0}")]
    Corrupted(String),

    #[error("Unsupported colorspace: {0}")]
    Unsupported(String),
}

/// Result type for colorspace operations
pub type Result<T> = std::result::Result<T, ColorspaceError>;

/// Colorspace of an image as recorded by its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colorspace {
    Rgb,
    Rgba,
    Gray,
    GrayAlpha,
    Cmyk,
    /// Adobe YCC-K, decoded to CMYK samples
    Ycck,
    Other,
}

impl Colorspace {
    /// The colorspace every served image is normalized to
    pub const TARGET: Colorspace = Colorspace::Rgb;

    /// RGB with or without alpha needs no conversion
    #[must_use]
    pub fn is_target(self) -> bool {
        matches!(self, Colorspace::Rgb | Colorspace::Rgba)
    }

    fn from_color_type(color: ColorType) -> Self {
        match color {
            ColorType::L8 | ColorType::L16 => Colorspace::Gray,
            ColorType::La8 | ColorType::La16 => Colorspace::GrayAlpha,
            ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => Colorspace::Rgb,
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => Colorspace::Rgba,
            _ => Colorspace::Other,
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Colorspace::Rgb => "RGB",
            Colorspace::Rgba => "RGBA",
            Colorspace::Gray => "L",
            Colorspace::GrayAlpha => "LA",
            Colorspace::Cmyk => "CMYK",
            Colorspace::Ycck => "YCCK",
            Colorspace::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Pixels {
    Cmyk {
        width: u32,
        height: u32,
        samples: Vec<u8>,
        /// Adobe-marked files store ink values inverted
        inverted: bool,
    },
    Decoded(DynamicImage),
}

/// A decoded image together with its container format and recorded colorspace
#[derive(Debug, Clone)]
pub struct DecodedImage {
    format: ImageFormat,
    colorspace: Colorspace,
    pixels: Pixels,
}

impl DecodedImage {
    /// Wrap pixels decoded by the `image` crate; the colorspace follows their layout
    #[must_use]
    pub fn from_dynamic(image: DynamicImage, format: ImageFormat) -> Self {
        Self {
            format,
            colorspace: Colorspace::from_color_type(image.color()),
            pixels: Pixels::Decoded(image),
        }
    }

    /// Wrap pixels from an `image` crate decoder that may have converted the stored mode
    ///
    /// `stored` is the decoder's original color type; CMYK files keep their CMYK
    /// classification even though the pixels are already RGB.
    pub(crate) fn from_decoder_output(
        image: DynamicImage,
        stored: ExtendedColorType,
        format: ImageFormat,
    ) -> Self {
        let mut decoded = Self::from_dynamic(image, format);
        if matches!(stored, ExtendedColorType::Cmyk8) {
            decoded.colorspace = Colorspace::Cmyk;
        }
        decoded
    }

    /// Wrap raw 4-channel ink samples
    pub fn from_cmyk(
        width: u32,
        height: u32,
        samples: Vec<u8>,
        inverted: bool,
        colorspace: Colorspace,
        format: ImageFormat,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if samples.len() != expected {
            return Err(ColorspaceError::Corrupted(format!(
                "expected {expected} CMYK samples for {width}x{height}, got {}",
                samples.len()
            )));
        }
        if !matches!(colorspace, Colorspace::Cmyk | Colorspace::Ycck) {
            return Err(ColorspaceError::Unsupported(format!(
                "{colorspace} is not a 4-channel ink colorspace"
            )));
        }

        Ok(Self {
            format,
            colorspace,
            pixels: Pixels::Cmyk {
                width,
                height,
                samples,
                inverted,
            },
        })
    }

    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[must_use]
    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.pixels {
            Pixels::Cmyk { width, height, .. } => (*width, *height),
            Pixels::Decoded(image) => (image.width(), image.height()),
        }
    }

    /// Pixels in a layout the encoders accept; `None` for raw ink samples
    #[must_use]
    pub fn as_dynamic(&self) -> Option<&DynamicImage> {
        match &self.pixels {
            Pixels::Decoded(image) => Some(image),
            Pixels::Cmyk { .. } => None,
        }
    }
}

/// Colorspace recorded for the image
#[must_use]
pub fn classify(image: &DecodedImage) -> Colorspace {
    image.colorspace
}

/// Convert an image to the target colorspace
///
/// Images already in the RGB family are returned unchanged.
pub fn convert_to_target(image: DecodedImage) -> Result<DecodedImage> {
    let DecodedImage {
        format,
        colorspace,
        pixels,
    } = image;

    let converted = match pixels {
        Pixels::Cmyk {
            width,
            height,
            samples,
            inverted,
        } => DynamicImage::ImageRgb8(cmyk_to_rgb(width, height, &samples, inverted)?),
        Pixels::Decoded(image) => match colorspace {
            Colorspace::Rgb | Colorspace::Rgba => image,
            // Decoder-converted CMYK already holds light values
            Colorspace::Gray | Colorspace::Cmyk => DynamicImage::ImageRgb8(image.to_rgb8()),
            Colorspace::GrayAlpha => DynamicImage::ImageRgba8(image.to_rgba8()),
            other => return Err(ColorspaceError::Unsupported(other.to_string())),
        },
    };

    Ok(DecodedImage::from_dynamic(converted, format))
}

/// Naive ink-to-light conversion: each channel is `(255 - ink) * (255 - K) / 255`
fn cmyk_to_rgb(width: u32, height: u32, samples: &[u8], inverted: bool) -> Result<RgbImage> {
    let mut rgb = RgbImage::new(width, height);
    if samples.len() != rgb.as_raw().len() / 3 * 4 {
        return Err(ColorspaceError::Corrupted(format!(
            "CMYK sample count {} does not match {width}x{height}",
            samples.len()
        )));
    }

    for (pixel, ink) in rgb.pixels_mut().zip(samples.chunks_exact(4)) {
        let ink: [u8; 4] = if inverted {
            [255 - ink[0], 255 - ink[1], 255 - ink[2], 255 - ink[3]]
        } else {
            [ink[0], ink[1], ink[2], ink[3]]
        };
        let light = 255 - u32::from(ink[3]);
        pixel.0 = [
            channel(ink[0], light),
            channel(ink[1], light),
            channel(ink[2], light),
        ];
    }

    Ok(rgb)
}

fn channel(ink: u8, light: u32) -> u8 {
    // Both factors are <= 255, so the rounded quotient fits in a u8
    (((255 - u32::from(ink)) * light + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbaImage};

    fn cmyk_pixel(ink: [u8; 4], inverted: bool) -> [u8; 3] {
        let image = DecodedImage::from_cmyk(
            1,
            1,
            ink.to_vec(),
            inverted,
            Colorspace::Cmyk,
            ImageFormat::Jpeg,
        )
        .unwrap();
        let converted = convert_to_target(image).unwrap();
        converted.as_dynamic().unwrap().to_rgb8().get_pixel(0, 0).0
    }

    #[test]
    fn test_cmyk_primaries() {
        assert_eq!(cmyk_pixel([0, 0, 0, 0], false), [255, 255, 255]);
        assert_eq!(cmyk_pixel([0, 0, 0, 255], false), [0, 0, 0]);
        assert_eq!(cmyk_pixel([255, 0, 0, 0], false), [0, 255, 255]);
        assert_eq!(cmyk_pixel([0, 255, 255, 0], false), [255, 0, 0]);
        assert_eq!(cmyk_pixel([0, 0, 0, 128], false), [127, 127, 127]);
    }

    #[test]
    fn test_inverted_cmyk() {
        // Adobe files store 255 - ink
        assert_eq!(cmyk_pixel([255, 255, 255, 255], true), [255, 255, 255]);
        assert_eq!(cmyk_pixel([255, 255, 255, 0], true), [0, 0, 0]);
    }

    #[test]
    fn test_conversion_keeps_format_and_dimensions() {
        let image = DecodedImage::from_cmyk(
            3,
            2,
            vec![0; 3 * 2 * 4],
            false,
            Colorspace::Ycck,
            ImageFormat::Jpeg,
        )
        .unwrap();
        assert_eq!(classify(&image), Colorspace::Ycck);

        let converted = convert_to_target(image).unwrap();
        assert_eq!(classify(&converted), Colorspace::Rgb);
        assert_eq!(converted.format(), ImageFormat::Jpeg);
        assert_eq!(converted.dimensions(), (3, 2));
    }

    #[test]
    fn test_sample_count_mismatch_is_rejected() {
        let err = DecodedImage::from_cmyk(2, 2, vec![0; 4], false, Colorspace::Cmyk, ImageFormat::Jpeg)
            .unwrap_err();
        assert!(matches!(err, ColorspaceError::Corrupted(_)));
    }

    #[test]
    fn test_gray_converts_to_rgb() {
        let gray = GrayImage::from_pixel(2, 2, Luma([200]));
        let image = DecodedImage::from_dynamic(DynamicImage::ImageLuma8(gray), ImageFormat::Png);
        assert_eq!(classify(&image), Colorspace::Gray);

        let converted = convert_to_target(image).unwrap();
        assert_eq!(classify(&converted), Colorspace::Rgb);
        assert_eq!(
            converted.as_dynamic().unwrap().to_rgb8().get_pixel(1, 1),
            &Rgb([200, 200, 200])
        );
    }

    #[test]
    fn test_rgba_is_target() {
        let image = DecodedImage::from_dynamic(
            DynamicImage::ImageRgba8(RgbaImage::new(1, 1)),
            ImageFormat::Png,
        );
        assert!(classify(&image).is_target());
        assert_eq!(classify(&convert_to_target(image).unwrap()), Colorspace::Rgba);
    }

    #[test]
    fn test_decoder_converted_cmyk_keeps_classification() {
        let rgb = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let image = DecodedImage::from_decoder_output(
            DynamicImage::ImageRgb8(rgb),
            ExtendedColorType::Cmyk8,
            ImageFormat::Tiff,
        );
        assert_eq!(classify(&image), Colorspace::Cmyk);

        let converted = convert_to_target(image).unwrap();
        assert_eq!(classify(&converted), Colorspace::Rgb);
        assert_eq!(converted.format(), ImageFormat::Tiff);
        assert_eq!(
            converted.as_dynamic().unwrap().to_rgb8().get_pixel(1, 0),
            &Rgb([10, 20, 30])
        );

        let plain = DecodedImage::from_decoder_output(
            DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
            ExtendedColorType::Rgb8,
            ImageFormat::Tiff,
        );
        assert_eq!(classify(&plain), Colorspace::Rgb);
    }

    #[test]
    fn test_display_uses_mode_names() {
        assert_eq!(Colorspace::Cmyk.to_string(), "CMYK");
        assert_eq!(Colorspace::Gray.to_string(), "L");
        assert_eq!(Colorspace::TARGET.to_string(), "RGB");
    }
}
