//! Fragment wire format
//!
//! Every datagram sent by the camera carries one slice of a frame, prefixed
//! by a fixed 10-byte little-endian header:
//!
//! ```text
//! [u16 LE: frame_id][u32 LE: total_length][u32 LE: offset][payload bytes]...
//! ```
//!
//! There is no checksum and no fragment count; completion is inferred by the
//! [`crate::frame_assembler`] from accumulated byte coverage.

use thiserror::Error;

/// Size of the fragment header in bytes
pub const HEADER_SIZE: usize = 10;

/// Default upper bound on a datagram, header included
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Payload bytes per datagram sent by the camera firmware
pub const SENDER_CHUNK_SIZE: usize = 1024;

/// Reasons a datagram is rejected at the parse boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    /// Datagram shorter than the fixed header.
    #[error("datagram too short: {len} bytes (header is {HEADER_SIZE})")]
    TooShort {
        /// Length of the rejected datagram.
        len: usize,
    },

    /// Header declares an empty frame.
    #[error("frame {frame_id} declares zero total length")]
    ZeroLength {
        /// Frame ID from the header.
        frame_id: u16,
    },

    /// Header declares a frame larger than the configured limit.
    #[error("frame {frame_id} declares {total_length} bytes (limit {limit})")]
    FrameTooLarge {
        /// Frame ID from the header.
        frame_id: u16,
        /// Declared total length.
        total_length: u32,
        /// Configured maximum frame size.
        limit: u32,
    },
}

/// Parsed fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Sender-assigned frame counter (wraps)
    pub frame_id: u16,
    /// Size of the whole frame in bytes
    pub total_length: u32,
    /// Byte offset of this payload within the frame
    pub offset: u32,
}

impl FragmentHeader {
    /// Decode the header from the first [`HEADER_SIZE`] bytes of a datagram.
    #[inline]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            frame_id: u16::from_le_bytes([data[0], data[1]]),
            total_length: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            offset: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
        })
    }

    /// Encode the header to its wire representation.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&self.frame_id.to_le_bytes());
        bytes[2..6].copy_from_slice(&self.total_length.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.offset.to_le_bytes());
        bytes
    }
}

/// One received slice of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Frame this slice belongs to
    pub frame_id: u16,
    /// Total frame length declared by this datagram
    pub total_length: u32,
    /// Byte offset of `payload` within the frame
    pub offset: u32,
    /// Slice contents
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Byte range `[offset, offset + len)` this fragment claims, before clipping.
    pub fn extent(&self) -> (u64, u64) {
        let start = u64::from(self.offset);
        (start, start + self.payload.len() as u64)
    }
}

/// Parse a raw datagram into a [`Fragment`].
///
/// `max_frame_bytes` bounds the declared `total_length`; a header claiming
/// more is treated as malformed rather than allocating for it later.
///
/// # Errors
///
/// Returns [`FragmentError`] when the datagram is shorter than the header or
/// declares an empty or oversized frame.
pub fn parse_datagram(data: &[u8], max_frame_bytes: u32) -> Result<Fragment, FragmentError> {
    let header = FragmentHeader::decode(data).ok_or(FragmentError::TooShort { len: data.len() })?;

    if header.total_length == 0 {
        return Err(FragmentError::ZeroLength {
            frame_id: header.frame_id,
        });
    }

    if header.total_length > max_frame_bytes {
        return Err(FragmentError::FrameTooLarge {
            frame_id: header.frame_id,
            total_length: header.total_length,
            limit: max_frame_bytes,
        });
    }

    Ok(Fragment {
        frame_id: header.frame_id,
        total_length: header.total_length,
        offset: header.offset,
        payload: data[HEADER_SIZE..].to_vec(),
    })
}

/// Build a datagram (header + payload) the way the camera firmware does.
pub fn encode_datagram(header: &FragmentHeader, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_SIZE + payload.len());
    datagram.extend_from_slice(&header.encode());
    datagram.extend_from_slice(payload);
    datagram
}

/// Render the first `limit` bytes of a datagram as space-separated hex.
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    data.iter()
        .take(limit)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
