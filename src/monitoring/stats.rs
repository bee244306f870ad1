/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters for zero-contention stats tracking across carrier workers
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedStats {
    pub carrier_slots: u64,
    pub dl_newtx: u64,
    pub dl_retx: u64,
    pub ul_newtx: u64,
    pub ul_retx: u64,
    pub no_cch_space: u64,
    pub no_sch_space: u64,
    pub harq_flushes: u64,
    pub deadline_overruns: u64,
}

/// Atomic scheduler statistics for lock-free updates
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - All operations use relaxed ordering
#[repr(C, align(64))]
#[derive(Default)]
pub struct AtomicSchedStats {
    carrier_slots: AtomicU64,
    dl_newtx: AtomicU64,
    dl_retx: AtomicU64,
    ul_newtx: AtomicU64,
    ul_retx: AtomicU64,
    no_cch_space: AtomicU64,
    no_sch_space: AtomicU64,
    harq_flushes: AtomicU64,
    deadline_overruns: AtomicU64,
}

impl AtomicSchedStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_carrier_slots(&self) {
        self.carrier_slots.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_dl(&self, retx: bool) {
        if retx {
            self.dl_retx.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dl_newtx.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn inc_ul(&self, retx: bool) {
        if retx {
            self.ul_retx.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ul_newtx.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn inc_no_cch_space(&self) {
        self.no_cch_space.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_no_sch_space(&self) {
        self.no_sch_space.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_harq_flushes(&self) {
        self.harq_flushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_deadline_overruns(&self) {
        self.deadline_overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> SchedStats {
        SchedStats {
            carrier_slots: self.carrier_slots.load(Ordering::Relaxed),
            dl_newtx: self.dl_newtx.load(Ordering::Relaxed),
            dl_retx: self.dl_retx.load(Ordering::Relaxed),
            ul_newtx: self.ul_newtx.load(Ordering::Relaxed),
            ul_retx: self.ul_retx.load(Ordering::Relaxed),
            no_cch_space: self.no_cch_space.load(Ordering::Relaxed),
            no_sch_space: self.no_sch_space.load(Ordering::Relaxed),
            harq_flushes: self.harq_flushes.load(Ordering::Relaxed),
            deadline_overruns: self.deadline_overruns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = AtomicSchedStats::new();
        stats.inc_dl(false);
        stats.inc_dl(true);
        stats.inc_ul(false);
        stats.inc_no_cch_space();

        let snap = stats.snapshot();
        assert_eq!(snap.dl_newtx, 1);
        assert_eq!(snap.dl_retx, 1);
        assert_eq!(snap.ul_newtx, 1);
        assert_eq!(snap.no_cch_space, 1);
        assert_eq!(snap.carrier_slots, 0);
    }
}
