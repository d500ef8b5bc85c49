//! Contiguous frame buffers from finished assembly entries

use crate::frame_assembler::InFlightFrame;

/// A fully reassembled frame, ready for pixel conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    /// Frame ID the fragments carried
    pub frame_id: u16,
    /// Exactly `total_length` bytes
    pub data: Vec<u8>,
}

/// Copy a finished entry's fragments into one zero-initialised buffer.
///
/// Payloads running past the frame end are clipped. If the written byte
/// ranges do not cover the whole frame the buffer is discarded and `None`
/// is returned; a partial frame is never emitted.
pub fn emit(frame: InFlightFrame) -> Option<CompletedFrame> {
    let total = frame.total_length() as usize;
    let mut data = vec![0u8; total];
    let mut reach = 0usize;
    let mut filled = 0usize;

    // Offsets arrive sorted, so coverage is a single sweep
    for (offset, payload) in frame.fragments() {
        let offset = offset as usize;
        if offset >= total {
            continue;
        }

        let write_len = payload.len().min(total - offset);
        data[offset..offset + write_len].copy_from_slice(&payload[..write_len]);

        let end = offset + write_len;
        let start = offset.max(reach);
        if end > start {
            filled += end - start;
            reach = end;
        }
    }

    if filled != total {
        log::debug!(
            "Discarding frame {}: {} of {} bytes covered",
            frame.frame_id(),
            filled,
            total
        );
        return None;
    }

    Some(CompletedFrame {
        frame_id: frame.frame_id(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use crate::frame_assembler::{CompletionCheck, EvictionPolicy, FrameAssembler, InsertResult};

    fn finish(
        assembler: &mut FrameAssembler,
        fragments: &[(u32, &[u8])],
        total: u32,
    ) -> InFlightFrame {
        let mut finished = None;
        for &(offset, payload) in fragments {
            if let InsertResult::Complete(frame) = assembler.insert(Fragment {
                frame_id: 1,
                total_length: total,
                offset,
                payload: payload.to_vec(),
            }) {
                finished = Some(frame);
            }
        }
        finished.expect("frame should complete")
    }

    #[test]
    fn test_emit_places_fragments_at_offsets() {
        let mut assembler = FrameAssembler::new(2);
        let frame = finish(
            &mut assembler,
            &[(4, &[5, 6]), (0, &[1, 2]), (2, &[3, 4])],
            6,
        );

        let completed = emit(frame).unwrap();
        assert_eq!(completed.frame_id, 1);
        assert_eq!(completed.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_emit_clips_trailing_payload() {
        let mut assembler = FrameAssembler::new(2);
        let frame = finish(&mut assembler, &[(0, &[1, 2]), (2, &[3, 4, 0xEE, 0xEE])], 4);

        assert_eq!(emit(frame).unwrap().data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_emit_later_offset_overwrites_overlap() {
        let mut assembler = FrameAssembler::new(2);
        let frame = finish(&mut assembler, &[(0, &[1, 1, 1]), (2, &[2, 2])], 4);

        assert_eq!(emit(frame).unwrap().data, vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_emit_refuses_gapped_frame() {
        // Byte-sum completion lets an overlapping, gapped frame through the table
        let mut assembler =
            FrameAssembler::with_policies(2, EvictionPolicy::LowestId, CompletionCheck::ByteSum);
        let frame = finish(&mut assembler, &[(0, &[1; 4]), (2, &[2; 4])], 8);

        assert_eq!(emit(frame), None);
    }
}
