//! Shared stream counters
//!
//! Updated from both the socket reader and the processing thread, so every
//! field is an atomic. [`StreamStats::snapshot`] gives a plain copy for
//! logging.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame_assembler::AssemblerStats;

/// Live counters for one receiver
#[derive(Debug, Default)]
pub struct StreamStats {
    datagrams_received: AtomicU64,
    datagrams_malformed: AtomicU64,
    queue_drops: AtomicU64,
    recv_errors: AtomicU64,
    frames_completed: AtomicU64,
    frames_evicted: AtomicU64,
    emit_rejects: AtomicU64,
    conversion_failures: AtomicU64,
    frames_delivered: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Datagrams read from the socket
    pub datagrams_received: u64,
    /// Datagrams dropped at the parse boundary
    pub datagrams_malformed: u64,
    /// Datagrams dropped because the processing queue was full
    pub queue_drops: u64,
    /// Socket errors other than read timeouts
    pub recv_errors: u64,
    /// Frames the assembly table reported complete
    pub frames_completed: u64,
    /// Incomplete frames dropped under capacity pressure
    pub frames_evicted: u64,
    /// Completed frames the emitter refused (coverage gap)
    pub emit_rejects: u64,
    /// Frames whose size did not match the configured image
    pub conversion_failures: u64,
    /// Frames handed to the sink
    pub frames_delivered: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        #[doc = concat!("Increment `", stringify!($field), "`.")]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl StreamStats {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_datagram, datagrams_received);
    counter!(record_malformed, datagrams_malformed);
    counter!(record_queue_drop, queue_drops);
    counter!(record_recv_error, recv_errors);
    counter!(record_emit_reject, emit_rejects);
    counter!(record_conversion_failure, conversion_failures);
    counter!(record_delivery, frames_delivered);

    /// Mirror the assembler's completion and eviction totals.
    pub fn sync_assembler(&self, stats: &AssemblerStats) {
        self.frames_completed
            .store(stats.frames_completed, Ordering::Relaxed);
        self.frames_evicted
            .store(stats.frames_evicted, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_malformed: self.datagrams_malformed.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            emit_rejects: self.emit_rejects.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
        }
    }
}
