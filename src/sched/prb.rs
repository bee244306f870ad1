/*!
 * PRB Occupancy
 * Half-open PRB intervals, fixed-width occupancy masks and contiguous-run search
 */

use crate::core::limits::MAX_PRB;
use serde::{Deserialize, Serialize};
use std::fmt;

const WORD_BITS: u32 = u64::BITS;
const MASK_WORDS: usize = MAX_PRB.div_ceil(WORD_BITS) as usize;

/// Contiguous PRB range `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrbInterval {
    start: u32,
    stop: u32,
}

impl PrbInterval {
    /// Interval `[start, stop)`; an inverted range collapses to empty
    #[inline]
    pub const fn new(start: u32, stop: u32) -> Self {
        if stop < start {
            Self { start, stop: start }
        } else {
            Self { start, stop }
        }
    }

    #[inline]
    pub const fn with_length(start: u32, length: u32) -> Self {
        Self {
            start,
            stop: start + length,
        }
    }

    #[inline(always)]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[inline(always)]
    pub const fn stop(&self) -> u32 {
        self.stop
    }

    #[inline(always)]
    pub const fn length(&self) -> u32 {
        self.stop - self.start
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    #[inline]
    pub const fn overlaps(&self, other: &PrbInterval) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.stop && other.start < self.stop
    }

    /// Grow (positive) or shrink (negative) the interval at its end
    #[inline]
    fn resize_by(&mut self, delta: i32) {
        self.stop = self.stop.saturating_add_signed(delta).max(self.start);
    }

    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.stop
    }
}

impl fmt::Display for PrbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Per-slot, per-carrier PRB occupancy bitmap
///
/// # Performance
/// - Fixed-size inline storage, no allocation per slot
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrbMask {
    words: [u64; MASK_WORDS],
    nof_prb: u32,
}

impl PrbMask {
    /// All-free mask of `nof_prb` PRBs (capped at the largest bandwidth)
    pub fn new(nof_prb: u32) -> Self {
        Self {
            words: [0; MASK_WORDS],
            nof_prb: nof_prb.min(MAX_PRB),
        }
    }

    #[inline(always)]
    pub fn size(&self) -> u32 {
        self.nof_prb
    }

    /// Whether PRB `prb` is occupied; PRBs beyond the bandwidth read as occupied
    #[inline]
    pub fn test(&self, prb: u32) -> bool {
        if prb >= self.nof_prb {
            return true;
        }
        self.words[(prb / WORD_BITS) as usize] & (1 << (prb % WORD_BITS)) != 0
    }

    #[inline]
    fn set(&mut self, prb: u32) {
        self.words[(prb / WORD_BITS) as usize] |= 1 << (prb % WORD_BITS);
    }

    /// Mark every PRB of `interval` occupied
    pub fn fill(&mut self, interval: PrbInterval) {
        for prb in interval.start()..interval.stop().min(self.nof_prb) {
            self.set(prb);
        }
    }

    /// Whether every PRB of `interval` lies within the bandwidth and is free
    pub fn is_free(&self, interval: PrbInterval) -> bool {
        interval.stop() <= self.nof_prb && interval.iter().all(|prb| !self.test(prb))
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn nof_free(&self) -> u32 {
        self.nof_prb - self.count()
    }

    pub fn is_full(&self) -> bool {
        self.nof_free() == 0
    }

    pub fn reset(&mut self) {
        self.words = [0; MASK_WORDS];
    }
}

impl fmt::Debug for PrbMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.nof_prb)
            .map(|prb| if self.test(prb) { '1' } else { '0' })
            .collect();
        write!(f, "PrbMask({})", bits)
    }
}

/// Whether `nof_prb` is a valid SC-FDMA allocation width (2^a * 3^b * 5^c)
pub fn is_dft_valid_width(nof_prb: u32) -> bool {
    if nof_prb == 0 {
        return false;
    }
    let mut n = nof_prb;
    for factor in [2, 3, 5] {
        while n % factor == 0 {
            n /= factor;
        }
    }
    n == 1
}

/// Find a contiguous UL allocation of up to `max_len` PRBs
///
/// Takes the first free run reaching `max_len`, or else the longest free run.
/// The width is then made SC-FDMA valid, growing into free PRBs first and
/// shrinking if that is not possible. Returns an empty interval when no PRB
/// is free.
pub fn find_contiguous_ul_prbs(max_len: u32, mask: &PrbMask) -> PrbInterval {
    let mut current = PrbInterval::default();
    let mut best = PrbInterval::default();

    let mut prb = 0;
    while prb < mask.size() && current.length() < max_len {
        if !mask.test(prb) {
            if current.is_empty() {
                current = PrbInterval::new(prb, prb + 1);
            } else {
                current.resize_by(1);
            }
        } else if !current.is_empty() {
            if current.length() > best.length() {
                best = current;
            }
            current = PrbInterval::default();
        }
        prb += 1;
    }

    let mut interval = if best.length() > current.length() {
        best
    } else {
        current
    };
    if interval.is_empty() {
        return interval;
    }

    while !is_dft_valid_width(interval.length()) && !mask.test(interval.stop()) {
        interval.resize_by(1);
    }
    while !is_dft_valid_width(interval.length()) {
        interval.resize_by(-1);
    }
    interval
}

/// First free run of the mask, capped at `max_len` PRBs
pub fn find_first_free_run(max_len: u32, mask: &PrbMask) -> PrbInterval {
    let Some(start) = (0..mask.size()).find(|&prb| !mask.test(prb)) else {
        return PrbInterval::default();
    };
    let mut interval = PrbInterval::new(start, start);
    while interval.length() < max_len && !mask.test(interval.stop()) {
        interval.resize_by(1);
    }
    interval
}

/// Lowest-start free run of exactly `len` PRBs
pub fn find_free_run_of(len: u32, mask: &PrbMask) -> Option<PrbInterval> {
    if len == 0 || len > mask.size() {
        return None;
    }
    (0..=mask.size() - len)
        .map(|start| PrbInterval::with_length(start, len))
        .find(|interval| mask.is_free(*interval))
}
