//! Minimal JPEG marker scanner
//!
//! Reads only what colorspace classification needs: the frame header (SOFn) and the
//! Adobe APP14 segment. Scanning stops at the first SOS, so entropy-coded data is
//! never touched.

use crate::{ColorspaceError, Colorspace, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP14: u8 = 0xEE;

/// Fields of a JPEG header relevant to colorspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegHeader {
    pub width: u16,
    pub height: u16,
    pub components: u8,
    /// Transform flag of the Adobe APP14 segment (0 = none/CMYK, 1 = YCbCr, 2 = YCCK)
    pub adobe_transform: Option<u8>,
}

impl JpegHeader {
    #[must_use]
    pub fn colorspace(&self) -> Colorspace {
        match (self.components, self.adobe_transform) {
            (1, _) => Colorspace::Gray,
            (3, _) => Colorspace::Rgb,
            (4, Some(2)) => Colorspace::Ycck,
            (4, _) => Colorspace::Cmyk,
            _ => Colorspace::Other,
        }
    }

    /// Adobe-marked 4-channel files carry inverted ink values
    #[must_use]
    pub fn has_adobe_marker(&self) -> bool {
        self.adobe_transform.is_some()
    }
}

/// SOF0..SOF15, excluding DHT (C4), JPG (C8) and DAC (CC)
fn is_frame_marker(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Scan markers up to the first SOS and return the frame header
pub fn read_header(data: &[u8]) -> Result<JpegHeader> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return Err(ColorspaceError::Corrupted("missing JPEG SOI marker".to_string()));
    }

    let mut frame: Option<(u16, u16, u8)> = None;
    let mut adobe_transform = None;
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(ColorspaceError::Corrupted(format!(
                "expected marker at offset {pos}"
            )));
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        pos += 2;

        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            EOI | SOS => break,
            _ => {}
        }

        if pos + 2 > data.len() {
            break;
        }
        let length = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
        if length < 2 || pos + length > data.len() {
            return Err(ColorspaceError::Corrupted(format!(
                "truncated segment 0xFF{marker:02X} at offset {pos}"
            )));
        }
        let segment = &data[pos + 2..pos + length];

        if is_frame_marker(marker) {
            if segment.len() < 6 {
                return Err(ColorspaceError::Corrupted("short frame header".to_string()));
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]);
            let width = u16::from_be_bytes([segment[3], segment[4]]);
            frame = Some((width, height, segment[5]));
        } else if marker == APP14 && segment.len() >= 12 && segment.starts_with(b"Adobe") {
            adobe_transform = Some(segment[11]);
        }

        pos += length;
    }

    let (width, height, components) =
        frame.ok_or_else(|| ColorspaceError::Corrupted("no JPEG frame header".to_string()))?;

    Ok(JpegHeader {
        width,
        height,
        components,
        adobe_transform,
    })
}
