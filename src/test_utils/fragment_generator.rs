//! Synthetic fragment generation for testing
//!
//! Generates RGB565 frames with known pixels and splits them into datagrams
//! the way the camera firmware does, for pixel-exact checks downstream.
//!
//! # Example
//!
//! ```rust,ignore
//! use espcam_receiver_lib::test_utils::{FragmentGenerator, Rgb};
//!
//! let mut gen = FragmentGenerator::default();
//!
//! // Datagrams for a solid red QQVGA frame
//! let (frame_id, datagrams) = gen.solid_frame(160, 120, Rgb::RED);
//!
//! // Datagrams for a gradient test pattern
//! let (frame_id, datagrams) = gen.gradient_frame(160, 120);
//! ```

use crate::fragment::{encode_datagram, FragmentHeader, SENDER_CHUNK_SIZE};
use crate::rgb565::encode_sample;

/// RGB color for test patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    /// Red component (0-255)
    pub r: u8,
    /// Green component (0-255)
    pub g: u8,
    /// Blue component (0-255)
    pub b: u8,
}

impl Rgb {
    /// Pure red color
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    /// Pure green color
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    /// Pure blue color
    pub const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };
    /// Pure white color
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
    /// Pure black color
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Pack into an RGB565 sample (red in the low five bits).
    pub fn to_rgb565(&self) -> u16 {
        encode_sample(self.r, self.g, self.b)
    }
}

/// Splits frames into header-prefixed datagrams
pub struct FragmentGenerator {
    /// Payload bytes per datagram (excluding header)
    pub chunk_size: usize,
    /// ID the next generated frame will carry
    next_frame_id: u16,
}

impl Default for FragmentGenerator {
    fn default() -> Self {
        Self::new(SENDER_CHUNK_SIZE)
    }
}

impl FragmentGenerator {
    /// Create a generator with the given payload size per datagram.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            next_frame_id: 0,
        }
    }

    /// Take the next frame ID, wrapping at `u16::MAX`.
    pub fn next_frame_id(&mut self) -> u16 {
        let id = self.next_frame_id;
        self.next_frame_id = self.next_frame_id.wrapping_add(1);
        id
    }

    /// Datagrams for a solid color frame, with the frame ID they carry.
    pub fn solid_frame(&mut self, width: u32, height: u32, color: Rgb) -> (u16, Vec<Vec<u8>>) {
        let data = rgb565_solid(width, height, color);
        let frame_id = self.next_frame_id();
        (frame_id, self.fragment_frame(frame_id, &data))
    }

    /// Datagrams for a horizontal red gradient frame.
    pub fn gradient_frame(&mut self, width: u32, height: u32) -> (u16, Vec<Vec<u8>>) {
        let data = rgb565_gradient(width, height);
        let frame_id = self.next_frame_id();
        (frame_id, self.fragment_frame(frame_id, &data))
    }

    /// Split `data` into in-order datagrams of at most `chunk_size` payload bytes.
    pub fn fragment_frame(&self, frame_id: u16, data: &[u8]) -> Vec<Vec<u8>> {
        let total_length = data.len() as u32;

        data.chunks(self.chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let header = FragmentHeader {
                    frame_id,
                    total_length,
                    offset: (i * self.chunk_size) as u32,
                };
                encode_datagram(&header, chunk)
            })
            .collect()
    }
}

/// Raw frame bytes for a solid color, big-endian samples
pub fn rgb565_solid(width: u32, height: u32, color: Rgb) -> Vec<u8> {
    let sample = color.to_rgb565().to_be_bytes();
    let pixels = (width as usize) * (height as usize);
    sample.iter().copied().cycle().take(pixels * 2).collect()
}

/// Raw frame bytes for a red ramp from 0 at the left edge to full at the right
///
/// Every row is identical, so a row-stride mistake shows up as a shear.
pub fn rgb565_gradient(width: u32, height: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity((width as usize) * (height as usize) * 2);

    for _ in 0..height {
        for x in 0..width {
            let red = if width > 1 { x * 255 / (width - 1) } else { 0 };
            let sample = encode_sample(red as u8, 0, 0);
            frame.extend_from_slice(&sample.to_be_bytes());
        }
    }

    frame
}
