/*!
 * Slot Algorithms
 *
 * Closed set of per-slot allocation strategies selected once at configuration
 * time. All of them walk the attach-ordered user list with [`WrapAround`],
 * visiting each user exactly once per pass from a chosen start position:
 *
 * - `Absolute`: DL starts at the externally prioritized user, one interleaved
 *   pass (retx, else newtx). UL starts at `tti_tx_ul mod N` so uplink keeps
 *   flowing even when the feed is silent.
 * - `Tiered`: DL and UL each resolve the feed, then run a retx pass followed
 *   by a newtx pass.
 * - `RoundRobin`: time round-robin, two passes per direction, no feed.
 * - `Disabled`: produces nothing.
 */

use super::alloc::{
    get_dl_newtx_harq, get_dl_retx_harq, get_ul_newtx_harq, get_ul_retx_harq, report_failure,
    try_dl_newtx_alloc_greedy, try_dl_retx_alloc, try_ul_newtx_alloc, try_ul_retx_alloc,
};
use super::grid::SlotGrid;
use super::types::AlgorithmKind;
use super::ue::{SchedUser, UeCarrier, UserList};
use crate::core::Direction;
use crate::feed::{FeedStats, PriorityFeed, PriorityReceiver};
use crate::monitoring::AtomicSchedStats;

/// Priority feed as owned by one carrier's algorithm
pub type CarrierFeed = PriorityFeed<Box<dyn PriorityReceiver>>;

/// Positions `start, start+1, ..` modulo `len`, each exactly once
#[derive(Debug, Clone)]
pub struct WrapAround {
    start: usize,
    len: usize,
    visited: usize,
}

impl WrapAround {
    pub fn new(start: usize, len: usize) -> Self {
        Self {
            start: if len == 0 { 0 } else { start % len },
            len,
            visited: 0,
        }
    }
}

impl Iterator for WrapAround {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.visited == self.len {
            return None;
        }
        let pos = (self.start + self.visited) % self.len;
        self.visited += 1;
        Some(pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.visited;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WrapAround {}

/// Users of `users` in wraparound order from `start`
fn wrap_users(users: &UserList, start: usize) -> impl Iterator<Item = &SchedUser> {
    WrapAround::new(start, users.len()).filter_map(move |pos| users.get_index(pos).map(|(_, u)| u))
}

/// Which allocation classes a pass attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Retx,
    Newtx,
    /// Retx if one is pending, else newtx
    Interleaved,
}

/// Per-carrier allocation strategy
pub enum SlotAlgorithm {
    Absolute { feed: CarrierFeed },
    Tiered { feed: CarrierFeed },
    RoundRobin,
    Disabled,
}

impl SlotAlgorithm {
    /// Build the variant for `kind`; `receiver` is only consumed by variants
    /// that follow the external feed
    pub fn new(kind: AlgorithmKind, receiver: Box<dyn PriorityReceiver>) -> Self {
        match kind {
            AlgorithmKind::Absolute => Self::Absolute {
                feed: PriorityFeed::new(receiver),
            },
            AlgorithmKind::Tiered => Self::Tiered {
                feed: PriorityFeed::new(receiver),
            },
            AlgorithmKind::RoundRobin => Self::RoundRobin,
            AlgorithmKind::Disabled => Self::Disabled,
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Absolute { .. } => AlgorithmKind::Absolute,
            Self::Tiered { .. } => AlgorithmKind::Tiered,
            Self::RoundRobin => AlgorithmKind::RoundRobin,
            Self::Disabled => AlgorithmKind::Disabled,
        }
    }

    pub fn feed_stats(&self) -> Option<FeedStats> {
        match self {
            Self::Absolute { feed } | Self::Tiered { feed } => Some(feed.stats()),
            Self::RoundRobin | Self::Disabled => None,
        }
    }

    /// Allocate DL and UL for one carrier and one slot into `grid`
    pub fn run(&mut self, users: &UserList, grid: &mut SlotGrid, stats: &AtomicSchedStats) {
        if users.is_empty() {
            return;
        }
        let rntis = || users.keys().copied();
        let nof_users = users.len();
        let tti_tx_dl = grid.ctx().tti_tx_dl.to_uint() as usize;
        let tti_tx_ul = grid.ctx().tti_tx_ul.to_uint() as usize;

        match self {
            Self::Absolute { feed } => {
                let dl_start = feed.resolve(rntis());
                sched_dl(users, grid, stats, dl_start, &[Pass::Interleaved]);
                sched_ul(users, grid, stats, tti_tx_ul % nof_users, &[Pass::Interleaved]);
            }
            Self::Tiered { feed } => {
                let dl_start = feed.resolve(rntis());
                sched_dl(users, grid, stats, dl_start, &[Pass::Retx, Pass::Newtx]);
                let ul_start = feed.resolve(rntis());
                sched_ul(users, grid, stats, ul_start, &[Pass::Retx, Pass::Newtx]);
            }
            Self::RoundRobin => {
                sched_dl(users, grid, stats, tti_tx_dl % nof_users, &[Pass::Retx, Pass::Newtx]);
                sched_ul(users, grid, stats, tti_tx_ul % nof_users, &[Pass::Retx, Pass::Newtx]);
            }
            Self::Disabled => {}
        }
    }
}

/// Active carrier of `user` on the grid's carrier
#[inline]
fn active_carrier<'u>(user: &'u SchedUser, grid: &SlotGrid) -> Option<&'u UeCarrier> {
    user.carrier(grid.cc()).filter(|c| c.is_active())
}

fn sched_dl(
    users: &UserList,
    grid: &mut SlotGrid,
    stats: &AtomicSchedStats,
    start: usize,
    passes: &[Pass],
) {
    if !grid.is_dl_enabled() {
        return;
    }
    grid.set_dl_start(start);
    let cc = grid.cc();

    for &pass in passes {
        for user in wrap_users(users, start) {
            // Without a mapping to this carrier the user has no DL here at all
            let Some(carrier) = active_carrier(user, grid) else {
                continue;
            };
            if grid.has_dl_dci(user.rnti()) {
                continue;
            }
            let cfg = carrier.cfg();
            let mut harq = carrier.harq();

            let retx_pid = match pass {
                Pass::Newtx => None,
                Pass::Retx | Pass::Interleaved => get_dl_retx_harq(grid, &harq),
            };
            if let Some(pid) = retx_pid {
                if let Err(err) = try_dl_retx_alloc(grid, user.rnti(), cfg, &mut harq, pid) {
                    report_failure(stats, err, Direction::Downlink, true, user.rnti(), cc);
                }
                continue;
            }
            if pass == Pass::Retx {
                continue;
            }

            let Some(pid) = get_dl_newtx_harq(grid, &harq) else {
                continue;
            };
            if let Err(err) = try_dl_newtx_alloc_greedy(grid, user, cfg, &mut harq, pid) {
                report_failure(stats, err, Direction::Downlink, false, user.rnti(), cc);
            }
        }
    }
}

fn sched_ul(
    users: &UserList,
    grid: &mut SlotGrid,
    stats: &AtomicSchedStats,
    start: usize,
    passes: &[Pass],
) {
    if !grid.is_ul_enabled() {
        return;
    }
    grid.set_ul_start(start);
    let cc = grid.cc();

    for &pass in passes {
        for user in wrap_users(users, start) {
            let Some(carrier) = active_carrier(user, grid) else {
                continue;
            };
            if grid.has_ul_grant(user.rnti()) {
                continue;
            }
            let cfg = carrier.cfg();
            let mut harq = carrier.harq();

            if matches!(pass, Pass::Retx | Pass::Interleaved) {
                if let Some(pid) = get_ul_retx_harq(grid, &harq) {
                    if let Err(err) = try_ul_retx_alloc(grid, user.rnti(), cfg, &mut harq, pid) {
                        report_failure(stats, err, Direction::Uplink, true, user.rnti(), cc);
                    }
                    continue;
                }
            }
            if pass == Pass::Retx {
                continue;
            }

            let Some(pid) = get_ul_newtx_harq(grid, &harq) else {
                continue;
            };
            if let Err(err) = try_ul_newtx_alloc(grid, user, cfg, &mut harq, pid) {
                report_failure(stats, err, Direction::Uplink, false, user.rnti(), cc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Rnti, SlotContext, TtiPoint};
    use crate::feed::{encode_hint, HintBroadcaster, SilentReceiver};
    use crate::sched::config::{CellConfig, UeConfig};
    use proptest::prelude::*;

    fn users(rntis: &[Rnti], cell: &CellConfig) -> UserList {
        let mut list = UserList::default();
        for &rnti in rntis {
            let user = SchedUser::new(rnti, &UeConfig::single_carrier(0), std::slice::from_ref(cell));
            user.set_dl_pending(100);
            list.insert(rnti, user);
        }
        list
    }

    fn fdd_cell() -> CellConfig {
        CellConfig {
            nof_prb: 50,
            nof_cce: 64,
            ..Default::default()
        }
    }

    fn grid(cell: &CellConfig, tti_rx: u32) -> SlotGrid {
        SlotGrid::new(0, SlotContext::new(TtiPoint::new(tti_rx)), cell)
    }

    #[test]
    fn test_wraparound_order() {
        assert_eq!(WrapAround::new(3, 5).collect::<Vec<_>>(), vec![3, 4, 0, 1, 2]);
        assert_eq!(WrapAround::new(7, 5).collect::<Vec<_>>(), vec![2, 3, 4, 0, 1]);
        assert_eq!(WrapAround::new(0, 0).count(), 0);
        assert_eq!(WrapAround::new(1, 4).len(), 4);
    }

    #[test]
    fn test_absolute_dl_follows_hint() {
        let cell = fdd_cell();
        let list = users(&[0x46, 0x47, 0x48, 0x49, 0x4a], &cell);
        let broadcaster = HintBroadcaster::new();
        let mut algo = SlotAlgorithm::new(AlgorithmKind::Absolute, Box::new(broadcaster.subscribe()));
        let stats = AtomicSchedStats::new();

        broadcaster.publish(encode_hint(0x49));
        let mut g = grid(&cell, 0);
        algo.run(&list, &mut g, &stats);

        let order: Vec<Rnti> = g.dl_grants().iter().map(|d| d.rnti).collect();
        assert_eq!(order, vec![0x49, 0x4a, 0x46, 0x47, 0x48]);
        assert_eq!(g.into_result().dl_start, Some(3));
    }

    #[test]
    fn test_absolute_ul_uses_tti_start() {
        let cell = fdd_cell();
        let list = users(&[0x46, 0x47, 0x48], &cell);
        for user in list.values() {
            user.set_ul_pending(50);
        }
        let mut algo = SlotAlgorithm::new(AlgorithmKind::Absolute, Box::new(SilentReceiver));
        let stats = AtomicSchedStats::new();

        // tti_tx_ul = 0 + 8
        let mut g = grid(&cell, 0);
        algo.run(&list, &mut g, &stats);
        let result = g.into_result();
        assert_eq!(result.ul_start, Some(8 % 3));
        assert_eq!(result.ul[0].rnti, 0x48);
    }

    #[test]
    fn test_tiered_retx_pass_precedes_newtx() {
        let cell = CellConfig {
            nof_prb: 50,
            nof_cce: 4,
            ..Default::default()
        };
        let list = users(&[0x46, 0x47], &cell);
        // Second user has a DL retx pending; the CCE budget fits a single DCI
        if let Some(carrier) = list[1].carrier(0) {
            let mut harq = carrier.harq();
            harq.new_tx(
                Direction::Downlink,
                0,
                TtiPoint::new(0),
                crate::sched::prb::PrbInterval::new(0, 3),
                10,
                80,
            );
            harq.feedback(Direction::Downlink, 0, false);
        }

        let mut algo = SlotAlgorithm::new(AlgorithmKind::Tiered, Box::new(SilentReceiver));
        let stats = AtomicSchedStats::new();
        let mut g = grid(&cell, 0);
        algo.run(&list, &mut g, &stats);

        assert_eq!(g.dl_grants().len(), 1);
        assert_eq!(g.dl_grants()[0].rnti, 0x47);
        assert!(g.dl_grants()[0].is_retx);
        assert_eq!(stats.snapshot().no_cch_space, 1);
    }

    #[test]
    fn test_round_robin_rotates_with_tti() {
        let cell = fdd_cell();
        let list = users(&[0x46, 0x47, 0x48], &cell);
        let mut algo = SlotAlgorithm::new(AlgorithmKind::RoundRobin, Box::new(SilentReceiver));
        let stats = AtomicSchedStats::new();

        // tti_tx_dl = 1 + 4 = 5 -> start 2
        let mut g = grid(&cell, 1);
        algo.run(&list, &mut g, &stats);
        assert_eq!(g.dl_grants()[0].rnti, 0x48);
        assert!(algo.feed_stats().is_none());
    }

    #[test]
    fn test_disabled_produces_nothing() {
        let cell = fdd_cell();
        let list = users(&[0x46], &cell);
        let mut algo = SlotAlgorithm::new(AlgorithmKind::Disabled, Box::new(SilentReceiver));
        let mut g = grid(&cell, 0);
        algo.run(&list, &mut g, &AtomicSchedStats::new());
        assert_eq!(g.into_result().nof_grants(), 0);
    }

    #[test]
    fn test_user_without_carrier_mapping_is_skipped() {
        let cells = [fdd_cell(), fdd_cell()];
        let mut list = UserList::default();
        let user = SchedUser::new(0x46, &UeConfig::single_carrier(1), &cells);
        user.set_dl_pending(100);
        list.insert(0x46, user);

        let mut algo = SlotAlgorithm::new(AlgorithmKind::RoundRobin, Box::new(SilentReceiver));
        let mut g = grid(&cells[0], 0);
        algo.run(&list, &mut g, &AtomicSchedStats::new());
        assert!(g.dl_grants().is_empty());
    }

    proptest! {
        #[test]
        fn prop_wraparound_visits_each_once(start in 0usize..64, len in 0usize..32) {
            let mut seen: Vec<usize> = WrapAround::new(start, len).collect();
            prop_assert_eq!(seen.len(), len);
            if len > 0 {
                prop_assert_eq!(seen[0], start % len);
            }
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..len).collect::<Vec<_>>());
        }

        #[test]
        fn prop_ul_grants_never_overlap(
            pending in proptest::collection::vec(1u32..5000, 1..12),
            tti in 0u32..10240,
        ) {
            let cell = fdd_cell();
            let mut list = UserList::default();
            for (i, bytes) in pending.iter().enumerate() {
                let rnti = 0x46 + i as Rnti;
                let user = SchedUser::new(rnti, &UeConfig::single_carrier(0), std::slice::from_ref(&cell));
                user.set_ul_pending(*bytes);
                list.insert(rnti, user);
            }
            let mut algo = SlotAlgorithm::new(AlgorithmKind::RoundRobin, Box::new(SilentReceiver));
            let mut g = grid(&cell, tti);
            algo.run(&list, &mut g, &AtomicSchedStats::new());

            let ul = g.ul_grants();
            for (i, a) in ul.iter().enumerate() {
                for b in &ul[i + 1..] {
                    prop_assert!(!a.prbs.overlaps(&b.prbs));
                }
            }
        }
    }
}
