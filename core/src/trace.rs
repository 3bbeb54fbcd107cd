//! Determinism trace
//!
//! Folds every clock observation into a running xxHash3 digest so two runs
//! can be compared with a single number, the same way rollback snapshots
//! are checksummed for desync detection.

use std::collections::VecDeque;
use std::sync::Mutex;

use xxhash_rust::xxh3::Xxh3;

use crate::clock::QueryKind;
use crate::time::TimeSpec;

/// Frame digests kept by [`DeterminismTrace::new`] (ten minutes at 60 fps)
pub const DEFAULT_FRAME_HISTORY: usize = 36_000;

/// Per-frame summary kept by the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDigest {
    pub frame: u64,
    pub ticks: TimeSpec,
    /// Queries observed since the previous frame entry
    pub queries: u64,
    /// Digest of everything up to and including this frame
    pub digest: u64,
}

struct TraceState {
    hasher: Xxh3,
    queries_this_frame: u64,
    total_queries: u64,
    /// Most recent digests, oldest first
    frames: VecDeque<FrameDigest>,
    frame_history: usize,
}

/// Running record of clock observations.
///
/// The checksum covers the whole run; only the latest `frame_history`
/// per-frame digests are retained.
pub struct DeterminismTrace {
    state: Mutex<TraceState>,
}

impl Default for DeterminismTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterminismTrace {
    pub fn new() -> Self {
        Self::with_frame_history(DEFAULT_FRAME_HISTORY)
    }

    /// Trace retaining at most `frames` per-frame digests.
    pub fn with_frame_history(frames: usize) -> Self {
        Self {
            state: Mutex::new(TraceState {
                hasher: Xxh3::new(),
                queries_this_frame: 0,
                total_queries: 0,
                frames: VecDeque::with_capacity(frames.min(1024)),
                frame_history: frames,
            }),
        }
    }

    fn kind_tag(kind: QueryKind) -> u8 {
        kind.index().map(|i| i as u8 + 1).unwrap_or(0)
    }

    /// Record one value returned to the program.
    pub fn observe(&self, kind: QueryKind, value: TimeSpec) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.hasher.update(&[Self::kind_tag(kind)]);
        state.hasher.update(&value.as_nanos().to_le_bytes());
        state.queries_this_frame += 1;
        state.total_queries += 1;
    }

    /// Close the current frame.
    pub fn end_frame(&self, frame: u64, ticks: TimeSpec) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.hasher.update(&[0xFF]);
        state.hasher.update(&frame.to_le_bytes());
        state.hasher.update(&ticks.as_nanos().to_le_bytes());
        let digest = FrameDigest {
            frame,
            ticks,
            queries: state.queries_this_frame,
            digest: state.hasher.digest(),
        };
        if state.frame_history > 0 {
            if state.frames.len() >= state.frame_history {
                state.frames.pop_front();
            }
            state.frames.push_back(digest);
        }
        state.queries_this_frame = 0;
    }

    /// Digest over everything observed so far
    pub fn checksum(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .hasher
            .digest()
    }

    pub fn total_queries(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_queries
    }

    pub fn frames(&self) -> Vec<FrameDigest> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
            .iter()
            .copied()
            .collect()
    }

    /// First retained frame at which two traces disagree.
    ///
    /// Digests are cumulative, so when the runs already differed before the
    /// retained window this is the oldest frame both traces still hold.
    pub fn first_divergence(&self, other: &DeterminismTrace) -> Option<u64> {
        let ours = self.frames();
        let theirs = other.frames();
        let differs = |a: &FrameDigest| {
            digest_at(&theirs, a.frame).is_some_and(|b| b.digest != a.digest)
        };
        if let Some(a) = ours.iter().find(|a| differs(a)) {
            return Some(a.frame);
        }

        let last_ours = ours.last().map_or(0, |d| d.frame);
        let last_theirs = theirs.last().map_or(0, |d| d.frame);
        (last_ours != last_theirs).then(|| last_ours.min(last_theirs) + 1)
    }
}

/// Digest of `frame` in a run of consecutive frames
fn digest_at(frames: &[FrameDigest], frame: u64) -> Option<&FrameDigest> {
    let first = frames.first()?.frame;
    let digest = frames.get(usize::try_from(frame.checked_sub(first)?).ok()?)?;
    (digest.frame == frame).then_some(digest)
}
