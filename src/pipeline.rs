//! Per-datagram processing
//!
//! ```text
//! datagram → parse → assembly table → emitter → RGB565 conversion → sink
//! ```
//!
//! [`FramePipeline`] owns the assembly table outright and is driven by one
//! thread. It has no socket of its own, so tests feed it datagrams directly.

use std::sync::Arc;

use crate::config::ReceiverConfig;
use crate::fragment::{parse_datagram, FragmentError};
use crate::frame_assembler::{FrameAssembler, InsertResult};
use crate::frame_emitter::emit;
use crate::rgb565::{convert_rgb565, ChannelOrder, ConversionError};
use crate::sink::{DecodedFrame, FrameSink, SinkControl};
use crate::stats::StreamStats;

/// Outcome of processing one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Datagram failed to parse and was dropped
    Malformed(FragmentError),
    /// Fragment carried nothing usable
    Skipped,
    /// Fragment stored, frame not yet complete
    Accumulating,
    /// Frame completed but its buffer had a coverage gap
    Rejected {
        /// Frame that was discarded
        frame_id: u16,
    },
    /// Frame completed but did not match the configured image size
    ConversionFailed {
        /// Frame that was discarded
        frame_id: u16,
        /// Why conversion refused it
        error: ConversionError,
    },
    /// Frame converted and handed to the sink
    Delivered {
        /// Frame that was delivered
        frame_id: u16,
        /// What the sink asked for next
        control: SinkControl,
    },
}

impl PipelineEvent {
    /// Whether the sink asked the receiver to shut down.
    pub fn wants_stop(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Delivered {
                control: SinkControl::Stop,
                ..
            }
        )
    }
}

/// Assembly table, converter settings and sink, driven one datagram at a time
pub struct FramePipeline<S: FrameSink> {
    assembler: FrameAssembler,
    sink: S,
    width: u32,
    height: u32,
    order: ChannelOrder,
    max_frame_bytes: u32,
    stats: Arc<StreamStats>,
}

impl<S: FrameSink> FramePipeline<S> {
    /// Build a pipeline from a configuration.
    pub fn new(config: &ReceiverConfig, sink: S, stats: Arc<StreamStats>) -> Self {
        Self {
            assembler: FrameAssembler::with_policies(
                config.max_in_flight,
                config.eviction,
                config.completion,
            ),
            sink,
            width: config.width,
            height: config.height,
            order: config.channel_order,
            max_frame_bytes: config.frame_byte_limit(),
            stats,
        }
    }

    /// The assembly table, for diagnostics.
    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// The sink frames are delivered to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Consume the pipeline, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run one datagram through every stage.
    ///
    /// Per-packet and per-frame failures are absorbed here and reported only
    /// through the returned event and the counters.
    pub fn process_datagram(&mut self, datagram: &[u8]) -> PipelineEvent {
        let fragment = match parse_datagram(datagram, self.max_frame_bytes) {
            Ok(fragment) => fragment,
            Err(e) => {
                log::trace!("Dropping datagram: {}", e);
                self.stats.record_malformed();
                return PipelineEvent::Malformed(e);
            }
        };

        let result = self.assembler.insert(fragment);
        self.stats.sync_assembler(&self.assembler.stats());

        let frame = match result {
            InsertResult::Complete(frame) => frame,
            InsertResult::Accumulating => return PipelineEvent::Accumulating,
            InsertResult::Skipped => return PipelineEvent::Skipped,
        };

        let frame_id = frame.frame_id();
        let Some(completed) = emit(frame) else {
            self.stats.record_emit_reject();
            return PipelineEvent::Rejected { frame_id };
        };

        let image = match convert_rgb565(&completed.data, self.width, self.height, self.order) {
            Ok(image) => image,
            Err(error) => {
                log::debug!("Frame {} not converted: {}", frame_id, error);
                self.stats.record_conversion_failure();
                return PipelineEvent::ConversionFailed { frame_id, error };
            }
        };

        let control = self.sink.deliver(DecodedFrame { frame_id, image });
        self.stats.record_delivery();
        PipelineEvent::Delivered { frame_id, control }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{encode_datagram, FragmentHeader};
    use crate::sink::LoggingSink;

    fn small_config() -> ReceiverConfig {
        ReceiverConfig {
            width: 2,
            height: 1,
            ..Default::default()
        }
    }

    fn datagram(frame_id: u16, total_length: u32, offset: u32, payload: &[u8]) -> Vec<u8> {
        encode_datagram(
            &FragmentHeader {
                frame_id,
                total_length,
                offset,
            },
            payload,
        )
    }

    #[test]
    fn test_short_datagram_is_isolated() {
        let stats = Arc::new(StreamStats::new());
        let mut pipeline = FramePipeline::new(&small_config(), LoggingSink::new(0), stats);

        pipeline.process_datagram(&datagram(1, 4, 0, &[0xFF, 0xFF]));
        let event = pipeline.process_datagram(&[0x01, 0x00, 0x04]);

        assert!(matches!(event, PipelineEvent::Malformed(FragmentError::TooShort { len: 3 })));
        assert_eq!(pipeline.assembler().table_size(), 1);
        assert_eq!(pipeline.assembler().stats().fragments_accepted, 1);
        assert_eq!(pipeline.stats().snapshot().datagrams_malformed, 1);
    }

    #[test]
    fn test_two_fragment_frame_delivered() {
        let stats = Arc::new(StreamStats::new());
        let mut pipeline = FramePipeline::new(&small_config(), LoggingSink::new(0), stats);

        assert_eq!(
            pipeline.process_datagram(&datagram(3, 4, 2, &[0xFF, 0xFF])),
            PipelineEvent::Accumulating
        );
        let event = pipeline.process_datagram(&datagram(3, 4, 0, &[0x00, 0x00]));

        assert_eq!(
            event,
            PipelineEvent::Delivered {
                frame_id: 3,
                control: SinkControl::Continue
            }
        );
        assert!(!event.wants_stop());
        assert_eq!(pipeline.sink().frames_delivered(), 1);

        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.frames_completed, 1);
        assert_eq!(snapshot.frames_delivered, 1);
    }

    #[test]
    fn test_wrong_size_frame_fails_conversion() {
        let config = ReceiverConfig {
            max_frame_bytes: Some(64),
            ..small_config()
        };
        let stats = Arc::new(StreamStats::new());
        let mut pipeline = FramePipeline::new(&config, LoggingSink::new(0), stats);

        let event = pipeline.process_datagram(&datagram(4, 6, 0, &[0; 6]));
        assert!(matches!(
            event,
            PipelineEvent::ConversionFailed {
                frame_id: 4,
                error: ConversionError::SizeMismatch { actual: 6, expected: 4, .. }
            }
        ));
        assert_eq!(pipeline.stats().snapshot().conversion_failures, 1);
        assert_eq!(pipeline.stats().snapshot().frames_delivered, 0);
    }

    #[test]
    fn test_oversized_frame_rejected_by_default() {
        let stats = Arc::new(StreamStats::new());
        let mut pipeline = FramePipeline::new(&small_config(), LoggingSink::new(0), stats);

        let event = pipeline.process_datagram(&datagram(4, 4 * 1024 * 1024, 0, &[0; 16]));
        assert!(matches!(
            event,
            PipelineEvent::Malformed(FragmentError::FrameTooLarge { limit: 4, .. })
        ));
        assert_eq!(pipeline.assembler().table_size(), 0);
    }

    #[test]
    fn test_sink_stop_is_reported() {
        let stats = Arc::new(StreamStats::new());
        let sink = |_frame: DecodedFrame| SinkControl::Stop;
        let mut pipeline = FramePipeline::new(&small_config(), sink, stats);

        let event = pipeline.process_datagram(&datagram(1, 4, 0, &[0; 4]));
        assert!(event.wants_stop());
    }

    #[test]
    fn test_gapped_byte_sum_frame_rejected() {
        let config = ReceiverConfig {
            width: 4,
            height: 1,
            completion: crate::frame_assembler::CompletionCheck::ByteSum,
            ..Default::default()
        };
        let stats = Arc::new(StreamStats::new());
        let mut pipeline = FramePipeline::new(&config, LoggingSink::new(0), stats);

        pipeline.process_datagram(&datagram(9, 8, 0, &[0; 4]));
        let event = pipeline.process_datagram(&datagram(9, 8, 2, &[0; 4]));

        assert_eq!(event, PipelineEvent::Rejected { frame_id: 9 });
        assert_eq!(pipeline.stats().snapshot().emit_rejects, 1);
    }
}
