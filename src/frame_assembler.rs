//! Frame reassembly from out-of-order UDP fragments
//!
//! Keeps a small, bounded table of in-flight frames keyed by frame ID. Each
//! entry accumulates payloads by byte offset until the frame's byte range is
//! covered, at which point the entry is removed and handed back to the caller
//! for emission.
//!
//! # Usage
//!
//! ```rust,ignore
//! use espcam_receiver_lib::frame_assembler::{FrameAssembler, InsertResult};
//!
//! let mut assembler = FrameAssembler::new(2);
//!
//! for fragment in fragments {
//!     if let InsertResult::Complete(frame) = assembler.insert(fragment) {
//!         // All bytes of the frame have arrived
//!         emit(frame);
//!     }
//! }
//! ```
//!
//! When a fragment for an unseen frame would push the table past capacity,
//! one other incomplete frame is dropped. Recent frames win over stragglers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::fragment::Fragment;

/// Default number of incomplete frames held at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

/// How the eviction victim is chosen when the table is full
///
/// The default is [`OldestArrival`](Self::OldestArrival). Evicting the
/// numerically smallest frame ID, as the camera's reference receiver does,
/// needs [`LowestId`](Self::LowestId) (`--eviction lowest-id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Numerically smallest frame ID. Treats the ID as an age proxy, which
    /// breaks when the sender's 16-bit counter wraps.
    LowestId,
    /// Entry whose first fragment arrived earliest
    #[default]
    OldestArrival,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lowest-id" | "lowest_id" | "id" => Ok(Self::LowestId),
            "oldest-arrival" | "oldest_arrival" | "oldest" | "age" => Ok(Self::OldestArrival),
            other => Err(format!(
                "unknown eviction policy '{}' (expected 'lowest-id' or 'oldest-arrival')",
                other
            )),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowestId => write!(f, "lowest-id"),
            Self::OldestArrival => write!(f, "oldest-arrival"),
        }
    }
}

/// How a frame is judged complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionCheck {
    /// Sum of clipped payload lengths equals the frame length.
    /// Overlapping fragments can satisfy this while leaving gaps.
    ByteSum,
    /// Union of clipped payload extents covers `[0, total_length)` with no gaps
    #[default]
    Coverage,
}

impl FromStr for CompletionCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "byte-sum" | "byte_sum" | "sum" => Ok(Self::ByteSum),
            "coverage" | "gap-free" | "strict" => Ok(Self::Coverage),
            other => Err(format!(
                "unknown completion check '{}' (expected 'byte-sum' or 'coverage')",
                other
            )),
        }
    }
}

impl fmt::Display for CompletionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteSum => write!(f, "byte-sum"),
            Self::Coverage => write!(f, "coverage"),
        }
    }
}

/// A frame whose fragments are still arriving
#[derive(Debug, Clone)]
pub struct InFlightFrame {
    frame_id: u16,
    /// Authoritative length, taken from the first fragment seen
    total_length: u32,
    /// Payloads keyed by byte offset; a repeated offset overwrites
    fragments: BTreeMap<u32, Vec<u8>>,
    /// Disjoint, non-adjacent covered extents (start to end), clipped to the frame
    covered: BTreeMap<u64, u64>,
    /// Total length of `covered`
    covered_total: u64,
    /// Sum of clipped payload lengths over `fragments`
    summed_total: u64,
    /// Longest payload ever recorded, bounds how far back a fragment can reach
    max_payload: usize,
    /// Monotonic insertion order within the owning assembler
    arrival_seq: u64,
    first_seen: Instant,
}

impl InFlightFrame {
    fn new(frame_id: u16, total_length: u32, arrival_seq: u64) -> Self {
        Self {
            frame_id,
            total_length,
            fragments: BTreeMap::new(),
            covered: BTreeMap::new(),
            covered_total: 0,
            summed_total: 0,
            max_payload: 0,
            arrival_seq,
            first_seen: Instant::now(),
        }
    }

    /// Frame ID shared by all fragments of this frame
    pub fn frame_id(&self) -> u16 {
        self.frame_id
    }

    /// Authoritative frame length in bytes
    pub fn total_length(&self) -> u32 {
        self.total_length
    }

    /// Number of distinct offsets recorded
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Time since the first fragment of this frame arrived
    pub fn age(&self) -> Duration {
        self.first_seen.elapsed()
    }

    /// Recorded payloads in ascending offset order
    pub fn fragments(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.fragments
            .iter()
            .map(|(&offset, payload)| (offset, payload.as_slice()))
    }

    /// Clipped `[start, end)` extent of a payload at `offset`, if non-empty.
    fn extent(&self, offset: u32, len: usize) -> Option<(u64, u64)> {
        let start = u64::from(offset);
        let end = (start + len as u64).min(u64::from(self.total_length));
        (end > start).then_some((start, end))
    }

    /// Record a payload at `offset`, returning `true` if the offset was already present.
    ///
    /// Coverage and byte-sum totals are updated in place; the cost does not
    /// grow with the number of fragments already stored.
    fn record(&mut self, offset: u32, payload: Vec<u8>) -> bool {
        let new_extent = self.extent(offset, payload.len());
        let new_len = new_extent.map_or(0, |(start, end)| end - start);
        self.max_payload = self.max_payload.max(payload.len());

        let Some(old) = self.fragments.insert(offset, payload) else {
            self.summed_total += new_len;
            if let Some((start, end)) = new_extent {
                self.cover(start, end);
            }
            return false;
        };

        let old_len = self.extent(offset, old.len()).map_or(0, |(start, end)| end - start);
        self.summed_total = self.summed_total - old_len + new_len;

        if new_len >= old_len {
            if let Some((start, end)) = new_extent {
                self.cover(start, end);
            }
        } else {
            let start = u64::from(offset);
            self.recheck(start + new_len, start + old_len);
        }
        true
    }

    /// Merge `[start, end)` into the covered extents.
    fn cover(&mut self, mut start: u64, mut end: u64) {
        if let Some((&prev_start, &prev_end)) = self.covered.range(..=start).next_back() {
            if prev_end >= end {
                return;
            }
            if prev_end >= start {
                start = prev_start;
                self.covered.remove(&prev_start);
                self.covered_total -= prev_end - prev_start;
            }
        }

        let absorbed: Vec<(u64, u64)> = self
            .covered
            .range(start..=end)
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in absorbed {
            self.covered.remove(&s);
            self.covered_total -= e - s;
            end = end.max(e);
        }

        self.covered.insert(start, end);
        self.covered_total += end - start;
    }

    /// Drop `[start, end)` from the covered extents, then re-add whatever
    /// stored fragments still reach into it.
    fn recheck(&mut self, start: u64, end: u64) {
        let mut overlapping: Vec<(u64, u64)> = self
            .covered
            .range(..start)
            .next_back()
            .filter(|(_, &e)| e > start)
            .map(|(&s, &e)| (s, e))
            .into_iter()
            .collect();
        overlapping.extend(self.covered.range(start..end).map(|(&s, &e)| (s, e)));

        for (s, e) in overlapping {
            self.covered.remove(&s);
            self.covered_total -= e - s;
            if s < start {
                self.covered.insert(s, start);
                self.covered_total += start - s;
            }
            if e > end {
                self.covered.insert(end, e);
                self.covered_total += e - end;
            }
        }

        // Only fragments starting within one payload length of `start` can reach it
        let lo = start.saturating_sub(self.max_payload as u64) as u32;
        let refill: Vec<(u64, u64)> = self
            .fragments
            .range(lo..end as u32)
            .filter_map(|(&offset, payload)| self.extent(offset, payload.len()))
            .map(|(s, e)| (s.max(start), e.min(end)))
            .filter(|(s, e)| e > s)
            .collect();
        for (s, e) in refill {
            self.cover(s, e);
        }
    }

    /// Bytes of `[0, total_length)` covered by at least one fragment.
    pub fn covered_bytes(&self) -> u64 {
        self.covered_total
    }

    /// Sum of each fragment's length after clipping to the frame end.
    pub fn summed_bytes(&self) -> u64 {
        self.summed_total
    }

    /// Evaluate the completion predicate.
    pub fn is_complete(&self, check: CompletionCheck) -> bool {
        let filled = match check {
            CompletionCheck::ByteSum => self.summed_bytes(),
            CompletionCheck::Coverage => self.covered_bytes(),
        };
        filled == u64::from(self.total_length)
    }
}

/// Result of inserting one fragment
#[derive(Debug)]
pub enum InsertResult {
    /// Fragment recorded, frame still incomplete
    Accumulating,
    /// Frame complete and removed from the table
    Complete(InFlightFrame),
    /// Fragment carried no usable bytes and was ignored
    Skipped,
}

/// Running counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblerStats {
    /// Fragments recorded into an entry
    pub fragments_accepted: u64,
    /// Fragments ignored (empty or starting past the frame end)
    pub fragments_skipped: u64,
    /// Fragments that replaced an earlier payload at the same offset
    pub duplicate_offsets: u64,
    /// Fragments whose declared length disagreed with the entry's
    pub length_mismatches: u64,
    /// Frames that reached completion
    pub frames_completed: u64,
    /// Incomplete frames dropped to make room
    pub frames_evicted: u64,
}

/// Bounded table of in-flight frames
#[derive(Debug)]
pub struct FrameAssembler {
    frames: BTreeMap<u16, InFlightFrame>,
    capacity: usize,
    eviction: EvictionPolicy,
    completion: CompletionCheck,
    next_arrival_seq: u64,
    stats: AssemblerStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl FrameAssembler {
    /// Create an assembler holding at most `capacity` incomplete frames.
    ///
    /// Evicts by arrival order and completes on gap-free coverage. Use
    /// [`with_policies`](Self::with_policies) with [`EvictionPolicy::LowestId`]
    /// to evict by smallest frame ID instead.
    ///
    /// A capacity of zero is raised to one; the frame being built always needs a slot.
    pub fn new(capacity: usize) -> Self {
        Self::with_policies(
            capacity,
            EvictionPolicy::default(),
            CompletionCheck::default(),
        )
    }

    /// Create an assembler with explicit eviction and completion policies.
    pub fn with_policies(
        capacity: usize,
        eviction: EvictionPolicy,
        completion: CompletionCheck,
    ) -> Self {
        Self {
            frames: BTreeMap::new(),
            capacity: capacity.max(1),
            eviction,
            completion,
            next_arrival_seq: 0,
            stats: AssemblerStats::default(),
        }
    }

    /// Maximum number of incomplete frames held at once
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently being assembled
    pub fn table_size(&self) -> usize {
        self.frames.len()
    }

    /// Number of incomplete frames dropped so far
    pub fn evict_count(&self) -> u64 {
        self.stats.frames_evicted
    }

    /// Snapshot of the running counters
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Whether a frame with this ID is currently being assembled
    pub fn contains(&self, frame_id: u16) -> bool {
        self.frames.contains_key(&frame_id)
    }

    /// Look at an in-flight frame without modifying it
    pub fn get(&self, frame_id: u16) -> Option<&InFlightFrame> {
        self.frames.get(&frame_id)
    }

    /// Drop every in-flight frame. Counters are kept.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Insert one fragment
    ///
    /// Creates an entry for unseen frame IDs (evicting another incomplete
    /// frame if the table is full), records the payload at its offset, and
    /// returns the finished entry once the completion predicate holds.
    pub fn insert(&mut self, fragment: Fragment) -> InsertResult {
        let Fragment {
            frame_id,
            total_length,
            offset,
            payload,
        } = fragment;

        let authoritative_length = self
            .frames
            .get(&frame_id)
            .map_or(total_length, InFlightFrame::total_length);

        // Nothing inside the frame's byte range; never worth a table slot
        if payload.is_empty() || offset >= authoritative_length {
            log::trace!(
                "Ignoring fragment for frame {}: offset={} len={} total={}",
                frame_id,
                offset,
                payload.len(),
                authoritative_length
            );
            self.stats.fragments_skipped += 1;
            return InsertResult::Skipped;
        }

        if !self.frames.contains_key(&frame_id) {
            let entry = InFlightFrame::new(frame_id, total_length, self.next_arrival_seq);
            self.next_arrival_seq += 1;
            self.frames.insert(frame_id, entry);

            if self.frames.len() > self.capacity {
                self.evict_one(frame_id);
            }
        }

        let Some(entry) = self.frames.get_mut(&frame_id) else {
            return InsertResult::Skipped;
        };

        if total_length != entry.total_length {
            log::debug!(
                "Frame {} length mismatch: fragment says {}, keeping {}",
                frame_id,
                total_length,
                entry.total_length
            );
            self.stats.length_mismatches += 1;
        }

        if entry.record(offset, payload) {
            self.stats.duplicate_offsets += 1;
        }
        self.stats.fragments_accepted += 1;

        if !entry.is_complete(self.completion) {
            return InsertResult::Accumulating;
        }

        match self.frames.remove(&frame_id) {
            Some(frame) => {
                log::debug!(
                    "Frame {} complete: {} bytes in {} fragments",
                    frame_id,
                    frame.total_length,
                    frame.fragment_count()
                );
                self.stats.frames_completed += 1;
                InsertResult::Complete(frame)
            }
            None => InsertResult::Accumulating,
        }
    }

    /// Drop one incomplete frame other than `keep`.
    fn evict_one(&mut self, keep: u16) {
        let victim = match self.eviction {
            EvictionPolicy::LowestId => self.frames.keys().copied().find(|&id| id != keep),
            EvictionPolicy::OldestArrival => self
                .frames
                .values()
                .filter(|frame| frame.frame_id != keep)
                .min_by_key(|frame| frame.arrival_seq)
                .map(InFlightFrame::frame_id),
        };

        if let Some(frame) = victim.and_then(|id| self.frames.remove(&id)) {
            log::debug!(
                "Evicted frame {} ({} of {} bytes, {} fragments, age {:?}) for frame {}",
                frame.frame_id,
                frame.covered_bytes(),
                frame.total_length,
                frame.fragment_count(),
                frame.age(),
                keep
            );
            self.stats.frames_evicted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(frame_id: u16, total_length: u32, offset: u32, payload: &[u8]) -> Fragment {
        Fragment {
            frame_id,
            total_length,
            offset,
            payload: payload.to_vec(),
        }
    }

    fn expect_complete(result: InsertResult) -> InFlightFrame {
        match result {
            InsertResult::Complete(frame) => frame,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    #[test]
    fn test_single_fragment_frame_completes() {
        let mut assembler = FrameAssembler::new(2);
        let frame = expect_complete(assembler.insert(fragment(1, 4, 0, &[1, 2, 3, 4])));

        assert_eq!(frame.frame_id(), 1);
        assert_eq!(frame.fragment_count(), 1);
        assert_eq!(assembler.table_size(), 0);
        assert_eq!(assembler.stats().frames_completed, 1);
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut assembler = FrameAssembler::new(2);

        assert!(matches!(
            assembler.insert(fragment(5, 6, 4, &[5, 6])),
            InsertResult::Accumulating
        ));
        assert!(matches!(
            assembler.insert(fragment(5, 6, 0, &[1, 2])),
            InsertResult::Accumulating
        ));
        assert!(assembler.contains(5));

        let frame = expect_complete(assembler.insert(fragment(5, 6, 2, &[3, 4])));
        let offsets: Vec<u32> = frame.fragments().map(|(offset, _)| offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert!(!assembler.contains(5));
    }

    #[test]
    fn test_duplicate_fragment_does_not_complete_twice() {
        let mut assembler = FrameAssembler::new(2);

        assembler.insert(fragment(2, 4, 0, &[1, 2]));
        assembler.insert(fragment(2, 4, 0, &[1, 2]));
        assert_eq!(assembler.stats().duplicate_offsets, 1);

        expect_complete(assembler.insert(fragment(2, 4, 2, &[3, 4])));

        // Late duplicate starts a fresh entry rather than completing again
        assert!(matches!(
            assembler.insert(fragment(2, 4, 2, &[3, 4])),
            InsertResult::Accumulating
        ));
        assert_eq!(assembler.stats().frames_completed, 1);
    }

    #[test]
    fn test_last_write_wins_on_same_offset() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(3, 4, 0, &[0xAA, 0xAA]));
        assembler.insert(fragment(3, 4, 0, &[0xBB, 0xBB]));

        let frame = expect_complete(assembler.insert(fragment(3, 4, 2, &[0xCC, 0xCC])));
        let (_, first) = frame.fragments().next().unwrap();
        assert_eq!(first, &[0xBB, 0xBB]);
    }

    #[test]
    fn test_payload_past_end_is_clipped() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(4, 5, 0, &[1, 2, 3]));

        // Runs two bytes past the end; clipped bytes still complete the frame
        let frame = expect_complete(assembler.insert(fragment(4, 5, 3, &[4, 5, 6, 7])));
        assert_eq!(frame.covered_bytes(), 5);
        assert_eq!(frame.summed_bytes(), 5);
    }

    #[test]
    fn test_coverage_rejects_overlap_with_gap() {
        // [0,4) and [2,6) overlap, [6,8) missing: sum is 8, coverage is 6
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(6, 8, 0, &[0; 4]));
        let result = assembler.insert(fragment(6, 8, 2, &[0; 4]));

        assert!(matches!(result, InsertResult::Accumulating));
        let entry = assembler.get(6).unwrap();
        assert_eq!(entry.covered_bytes(), 6);
        assert_eq!(entry.summed_bytes(), 8);
    }

    #[test]
    fn test_byte_sum_accepts_overlap_with_gap() {
        let mut assembler =
            FrameAssembler::with_policies(2, EvictionPolicy::LowestId, CompletionCheck::ByteSum);
        assembler.insert(fragment(6, 8, 0, &[0; 4]));
        let frame = expect_complete(assembler.insert(fragment(6, 8, 2, &[0; 4])));
        assert_eq!(frame.covered_bytes(), 6);
    }

    #[test]
    fn test_many_one_byte_fragments_stay_fast() {
        const TOTAL: u32 = 100_000;
        let mut assembler = FrameAssembler::new(2);
        let started = Instant::now();

        // Every even byte first leaves TOTAL / 2 separate extents to merge later
        for offset in (0..TOTAL).step_by(2) {
            assembler.insert(fragment(1, TOTAL, offset, &[0xAB]));
        }
        let entry = assembler.get(1).unwrap();
        assert_eq!(entry.covered.len(), (TOTAL / 2) as usize);
        assert_eq!(entry.covered_bytes(), u64::from(TOTAL / 2));

        let mut completed = None;
        for offset in (1..TOTAL).step_by(2).rev() {
            let result = assembler.insert(fragment(1, TOTAL, offset, &[0xCD]));
            if let InsertResult::Complete(frame) = result {
                completed = Some(frame);
            }
        }

        let frame = completed.expect("last odd byte completes the frame");
        assert_eq!(frame.covered.len(), 1);
        assert_eq!(frame.fragment_count(), TOTAL as usize);
        assert_eq!(assembler.stats().fragments_accepted, u64::from(TOTAL));
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "insert cost grew with fragment count: {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_shorter_overwrite_uncovers_bytes() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(2, 8, 0, &[1; 6]));
        assert_eq!(assembler.get(2).unwrap().covered_bytes(), 6);

        // Same offset, shorter payload: bytes 2..6 are no longer held
        assembler.insert(fragment(2, 8, 0, &[2; 2]));
        let entry = assembler.get(2).unwrap();
        assert_eq!(entry.covered_bytes(), 2);
        assert_eq!(entry.summed_bytes(), 2);
        assert_eq!(entry.covered.len(), 1);

        assert!(matches!(
            assembler.insert(fragment(2, 8, 6, &[3; 2])),
            InsertResult::Accumulating
        ));
        expect_complete(assembler.insert(fragment(2, 8, 2, &[4; 4])));
    }

    #[test]
    fn test_shorter_overwrite_keeps_bytes_held_by_neighbours() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(5, 10, 0, &[1; 6]));
        assembler.insert(fragment(5, 10, 4, &[1; 4]));
        assembler.insert(fragment(5, 10, 1, &[1; 2]));
        assert_eq!(assembler.get(5).unwrap().covered_bytes(), 8);

        // 0..6 shrinks to 0..1; 1..3 and 4..8 are still held by other offsets
        assembler.insert(fragment(5, 10, 0, &[2; 1]));
        let entry = assembler.get(5).unwrap();
        assert_eq!(entry.covered_bytes(), 7);
        assert_eq!(entry.covered.len(), 2);

        assembler.insert(fragment(5, 10, 3, &[3; 1]));
        expect_complete(assembler.insert(fragment(5, 10, 8, &[4; 2])));
    }

    #[test]
    fn test_coverage_merges_adjacent_and_contained_extents() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(3, 20, 10, &[0; 5]));
        assembler.insert(fragment(3, 20, 0, &[0; 5]));
        assembler.insert(fragment(3, 20, 5, &[0; 5]));
        assembler.insert(fragment(3, 20, 2, &[0; 3]));

        let entry = assembler.get(3).unwrap();
        assert_eq!(entry.covered.len(), 1);
        assert_eq!(entry.covered_bytes(), 15);
        assert_eq!(entry.summed_bytes(), 18);
    }

    #[test]
    fn test_length_mismatch_keeps_first_length() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(8, 4, 0, &[1, 2]));
        assembler.insert(fragment(8, 100, 2, &[3]));

        assert_eq!(assembler.get(8).unwrap().total_length(), 4);
        assert_eq!(assembler.stats().length_mismatches, 1);
        expect_complete(assembler.insert(fragment(8, 4, 3, &[4])));
    }

    #[test]
    fn test_empty_and_out_of_range_fragments_skipped() {
        let mut assembler = FrameAssembler::new(2);

        assert!(matches!(
            assembler.insert(fragment(1, 4, 0, &[])),
            InsertResult::Skipped
        ));
        assert!(matches!(
            assembler.insert(fragment(1, 4, 4, &[9])),
            InsertResult::Skipped
        ));
        assert_eq!(assembler.table_size(), 0);
        assert_eq!(assembler.stats().fragments_skipped, 2);
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    #[test]
    fn test_capacity_bound_lowest_id() {
        let mut assembler =
            FrameAssembler::with_policies(2, EvictionPolicy::LowestId, CompletionCheck::Coverage);

        assembler.insert(fragment(10, 8, 0, &[0; 2]));
        assembler.insert(fragment(11, 8, 0, &[0; 2]));
        assembler.insert(fragment(12, 8, 0, &[0; 2]));

        assert_eq!(assembler.table_size(), 2);
        assert!(!assembler.contains(10));
        assert!(assembler.contains(11));
        assert!(assembler.contains(12));
        assert_eq!(assembler.evict_count(), 1);
    }

    #[test]
    fn test_lowest_id_never_evicts_incoming() {
        let mut assembler =
            FrameAssembler::with_policies(2, EvictionPolicy::LowestId, CompletionCheck::Coverage);

        assembler.insert(fragment(50, 8, 0, &[0; 2]));
        assembler.insert(fragment(60, 8, 0, &[0; 2]));
        // Incoming ID is the smallest; the next smallest goes instead
        assembler.insert(fragment(1, 8, 0, &[0; 2]));

        assert!(assembler.contains(1));
        assert!(!assembler.contains(50));
        assert!(assembler.contains(60));
    }

    #[test]
    fn test_oldest_arrival_handles_wrapped_ids() {
        let mut assembler = FrameAssembler::new(2);

        assembler.insert(fragment(65534, 8, 0, &[0; 2]));
        assembler.insert(fragment(65535, 8, 0, &[0; 2]));
        // Counter wrapped; 0 is newest, 65534 is oldest
        assembler.insert(fragment(0, 8, 0, &[0; 2]));

        assert!(!assembler.contains(65534));
        assert!(assembler.contains(65535));
        assert!(assembler.contains(0));
    }

    #[test]
    fn test_evicted_id_restarts_fresh() {
        let mut assembler = FrameAssembler::new(1);

        assembler.insert(fragment(1, 4, 0, &[1, 2]));
        assembler.insert(fragment(2, 4, 0, &[5, 6]));
        assert!(!assembler.contains(1));

        // Frame 1's first half was discarded; its second half alone is not enough
        assert!(matches!(
            assembler.insert(fragment(1, 4, 2, &[3, 4])),
            InsertResult::Accumulating
        ));
        assert_eq!(assembler.get(1).unwrap().covered_bytes(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let assembler = FrameAssembler::new(0);
        assert_eq!(assembler.capacity(), 1);
    }

    #[test]
    fn test_reset_keeps_counters() {
        let mut assembler = FrameAssembler::new(2);
        assembler.insert(fragment(1, 4, 0, &[1]));
        assembler.reset();

        assert_eq!(assembler.table_size(), 0);
        assert_eq!(assembler.stats().fragments_accepted, 1);
    }

    // =========================================================================
    // Policy parsing
    // =========================================================================

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "lowest-id".parse::<EvictionPolicy>(),
            Ok(EvictionPolicy::LowestId)
        );
        assert_eq!(
            "OLDEST".parse::<EvictionPolicy>(),
            Ok(EvictionPolicy::OldestArrival)
        );
        assert!("newest".parse::<EvictionPolicy>().is_err());

        assert_eq!(
            "byte-sum".parse::<CompletionCheck>(),
            Ok(CompletionCheck::ByteSum)
        );
        assert_eq!(
            "gap-free".parse::<CompletionCheck>(),
            Ok(CompletionCheck::Coverage)
        );
        assert!("maybe".parse::<CompletionCheck>().is_err());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [EvictionPolicy::LowestId, EvictionPolicy::OldestArrival] {
            assert_eq!(policy.to_string().parse::<EvictionPolicy>(), Ok(policy));
        }
    }
}
