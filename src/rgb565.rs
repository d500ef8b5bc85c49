//! RGB565 to 24-bit color conversion
//!
//! The camera sends each pixel as a big-endian 16-bit sample. After the byte
//! swap the sensor's layout is B5-G6-R5 from the high bit down, so the low
//! five bits carry red:
//!
//! ```text
//! bit  15 ........ 11 10 .......... 5 4 ......... 0
//!      [ blue (5)    ][ green (6)     ][ red (5)    ]
//! ```
//!
//! Each channel is rescaled to 8 bits with integer arithmetic
//! (`value * 255 / max`), so full-scale inputs land exactly on 255.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum value of a 5-bit channel
const MAX_5BIT: u32 = 0x1F;
/// Maximum value of a 6-bit channel
const MAX_6BIT: u32 = 0x3F;

/// Error type for conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Input length does not match `width * height * 2`.
    #[error("RGB565 size mismatch: {actual} bytes, expected {expected} for {width}x{height}")]
    SizeMismatch {
        /// Bytes received.
        actual: usize,
        /// Bytes required by the configured dimensions.
        expected: usize,
        /// Configured width in pixels.
        width: u32,
        /// Configured height in pixels.
        height: u32,
    },
}

/// Byte order of the three channels in the output image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Blue-Green-Red, what OpenCV-style renderers expect
    #[default]
    Bgr,
    /// Red-Green-Blue
    Rgb,
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bgr" => Ok(Self::Bgr),
            "rgb" => Ok(Self::Rgb),
            other => Err(format!(
                "unknown channel order '{}' (expected 'bgr' or 'rgb')",
                other
            )),
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bgr => write!(f, "bgr"),
            Self::Rgb => write!(f, "rgb"),
        }
    }
}

/// A decoded image, `height` rows of `width` pixels, 3 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel order of `pixels`
    pub order: ChannelOrder,
    /// Row-major pixel data
    pub pixels: Vec<u8>,
}

impl RgbImage {
    /// Channels of the pixel at (`x`, `y`) in this image's channel order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.pixels.get(index..index + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Pixel at (`x`, `y`) as (red, green, blue), regardless of storage order.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        let [a, g, c] = self.pixel(x, y)?;
        Some(match self.order {
            ChannelOrder::Bgr => (c, g, a),
            ChannelOrder::Rgb => (a, g, c),
        })
    }
}

/// Expected RGB565 buffer size for the given dimensions
pub fn expected_frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 2
}

/// Split one RGB565 sample into 8-bit (red, green, blue).
#[inline]
pub fn decode_sample(sample: u16) -> (u8, u8, u8) {
    let sample = u32::from(sample);
    let r = sample & MAX_5BIT;
    let g = (sample >> 5) & MAX_6BIT;
    let b = (sample >> 11) & MAX_5BIT;

    (
        (r * 255 / MAX_5BIT) as u8,
        (g * 255 / MAX_6BIT) as u8,
        (b * 255 / MAX_5BIT) as u8,
    )
}

/// Pack 8-bit (red, green, blue) into an RGB565 sample, truncating low bits.
pub fn encode_sample(r: u8, g: u8, b: u8) -> u16 {
    let r5 = u16::from(r) >> 3;
    let g6 = u16::from(g) >> 2;
    let b5 = u16::from(b) >> 3;
    (b5 << 11) | (g6 << 5) | r5
}

/// Convert a big-endian RGB565 frame into a 24-bit image
///
/// # Arguments
///
/// * `data` - Exactly `width * height * 2` bytes of big-endian samples
/// * `width` - Frame width in pixels
/// * `height` - Frame height in pixels
/// * `order` - Channel order of the output
///
/// # Errors
///
/// Returns [`ConversionError::SizeMismatch`] if `data` is not exactly the
/// expected size. No partial image is produced.
pub fn convert_rgb565(
    data: &[u8],
    width: u32,
    height: u32,
    order: ChannelOrder,
) -> Result<RgbImage, ConversionError> {
    let expected = expected_frame_size(width, height);
    if data.len() != expected {
        return Err(ConversionError::SizeMismatch {
            actual: data.len(),
            expected,
            width,
            height,
        });
    }

    let mut pixels = Vec::with_capacity(expected / 2 * 3);
    for chunk in data.chunks_exact(2) {
        let (r, g, b) = decode_sample(u16::from_be_bytes([chunk[0], chunk[1]]));
        match order {
            ChannelOrder::Bgr => pixels.extend_from_slice(&[b, g, r]),
            ChannelOrder::Rgb => pixels.extend_from_slice(&[r, g, b]),
        }
    }

    Ok(RgbImage {
        width,
        height,
        order,
        pixels,
    })
}
