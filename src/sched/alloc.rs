/*!
 * Grant Allocation
 * Building blocks shared by every slot algorithm: HARQ selection, retx and
 * newtx placement, and failure reporting
 *
 * Each helper works on one user, one carrier and one direction with the
 * carrier's HARQ entity already locked by the caller.
 */

use super::config::UeCarrierConfig;
use super::grid::SlotGrid;
use super::harq::HarqEntity;
use super::link::{required_prbs, tbs_bytes};
use super::prb::{find_contiguous_ul_prbs, find_first_free_run, find_free_run_of};
use super::result::{DlGrant, UlGrant};
use super::types::{AllocError, AllocResult};
use super::ue::SchedUser;
use crate::core::{CcIdx, Direction, HarqPid, Rnti, RntiFmt};
use crate::monitoring::AtomicSchedStats;
use tracing::{debug, info, trace};

const DL: Direction = Direction::Downlink;
const UL: Direction = Direction::Uplink;

/// DL HARQ process with a retransmission pending, if PDSCH is available
#[inline]
pub fn get_dl_retx_harq(grid: &SlotGrid, harq: &HarqEntity) -> Option<HarqPid> {
    grid.is_dl_enabled().then(|| harq.retx_pid(DL)).flatten()
}

/// Empty DL HARQ process for a new transport block, if PDSCH is available
#[inline]
pub fn get_dl_newtx_harq(grid: &SlotGrid, harq: &HarqEntity) -> Option<HarqPid> {
    grid.is_dl_enabled().then(|| harq.newtx_pid(DL)).flatten()
}

#[inline]
pub fn get_ul_retx_harq(grid: &SlotGrid, harq: &HarqEntity) -> Option<HarqPid> {
    grid.is_ul_enabled().then(|| harq.retx_pid(UL)).flatten()
}

#[inline]
pub fn get_ul_newtx_harq(grid: &SlotGrid, harq: &HarqEntity) -> Option<HarqPid> {
    grid.is_ul_enabled().then(|| harq.newtx_pid(UL)).flatten()
}

/// Retransmit a DL transport block with its original parameters
///
/// Reuses the original PRBs when free, otherwise any free run of the same width.
pub fn try_dl_retx_alloc(
    grid: &mut SlotGrid,
    rnti: Rnti,
    cfg: &UeCarrierConfig,
    harq: &mut HarqEntity,
    pid: HarqPid,
) -> AllocResult<()> {
    let h = *harq.get(DL, pid).ok_or(AllocError::InvalidGrantParams)?;
    let prbs = if grid.dl_mask().is_free(h.prbs()) {
        h.prbs()
    } else {
        find_free_run_of(h.prbs().length(), grid.dl_mask()).ok_or(AllocError::NoSchSpace)?
    };

    grid.alloc_dl(DlGrant {
        rnti,
        pid,
        prbs,
        mcs: h.mcs(),
        tbs: h.tbs(),
        aggregation_level: cfg.aggregation_level,
        ndi: h.ndi(),
        is_retx: true,
    })?;
    harq.new_retx(DL, pid, grid.ctx().tti_tx_dl, prbs);
    Ok(())
}

/// Allocate a new DL transport block sized to the pending data, taking the
/// first free PRB run up to the required width
pub fn try_dl_newtx_alloc_greedy(
    grid: &mut SlotGrid,
    user: &SchedUser,
    cfg: &UeCarrierConfig,
    harq: &mut HarqEntity,
    pid: HarqPid,
) -> AllocResult<()> {
    let pending = user.dl_pending_bytes();
    if pending == 0 {
        return Err(AllocError::NoData);
    }
    let wanted = required_prbs(cfg.dl_mcs, pending, grid.nof_prb());
    let prbs = find_first_free_run(wanted, grid.dl_mask());
    if prbs.is_empty() {
        return Err(AllocError::NoSchSpace);
    }

    let tbs = tbs_bytes(cfg.dl_mcs, prbs.length());
    let ndi = !harq.get(DL, pid).ok_or(AllocError::InvalidGrantParams)?.ndi();
    grid.alloc_dl(DlGrant {
        rnti: user.rnti(),
        pid,
        prbs,
        mcs: cfg.dl_mcs,
        tbs,
        aggregation_level: cfg.aggregation_level,
        ndi,
        is_retx: false,
    })?;
    harq.new_tx(DL, pid, grid.ctx().tti_tx_dl, prbs, cfg.dl_mcs, tbs);
    user.consume_dl(tbs);
    Ok(())
}

/// Retransmit a UL transport block
///
/// Non-adaptive (same PRBs, no DCI) when the original PRBs are free,
/// otherwise adaptive on a same-width run with a DCI.
pub fn try_ul_retx_alloc(
    grid: &mut SlotGrid,
    rnti: Rnti,
    cfg: &UeCarrierConfig,
    harq: &mut HarqEntity,
    pid: HarqPid,
) -> AllocResult<()> {
    let h = *harq.get(UL, pid).ok_or(AllocError::InvalidGrantParams)?;
    let (prbs, needs_pdcch) = if grid.ul_mask().is_free(h.prbs()) {
        (h.prbs(), false)
    } else {
        let prbs =
            find_free_run_of(h.prbs().length(), grid.ul_mask()).ok_or(AllocError::NoSchSpace)?;
        (prbs, true)
    };

    grid.alloc_ul(
        UlGrant {
            rnti,
            pid,
            prbs,
            mcs: h.mcs(),
            tbs: h.tbs(),
            needs_pdcch,
            is_retx: true,
        },
        cfg.aggregation_level,
    )?;
    harq.new_retx(UL, pid, grid.ctx().tti_tx_ul, prbs);
    Ok(())
}

/// Grant a new UL transport block for the user's buffered data
pub fn try_ul_newtx_alloc(
    grid: &mut SlotGrid,
    user: &SchedUser,
    cfg: &UeCarrierConfig,
    harq: &mut HarqEntity,
    pid: HarqPid,
) -> AllocResult<()> {
    let pending = user.ul_pending_bytes();
    if pending == 0 {
        return Err(AllocError::NoData);
    }
    let wanted = required_prbs(cfg.ul_mcs, pending, grid.nof_prb());
    let prbs = find_contiguous_ul_prbs(wanted, grid.ul_mask());
    if prbs.is_empty() {
        return Err(AllocError::NoSchSpace);
    }

    let tbs = tbs_bytes(cfg.ul_mcs, prbs.length());
    grid.alloc_ul(
        UlGrant {
            rnti: user.rnti(),
            pid,
            prbs,
            mcs: cfg.ul_mcs,
            tbs,
            needs_pdcch: true,
            is_retx: false,
        },
        cfg.aggregation_level,
    )?;
    harq.new_tx(UL, pid, grid.ctx().tti_tx_ul, prbs, cfg.ul_mcs, tbs);
    user.consume_ul(tbs);
    Ok(())
}

/// Log and count a skipped grant
///
/// PDCCH exhaustion on new transmissions is logged at info, everything else
/// at debug or below. The user is simply retried next slot.
pub fn report_failure(
    stats: &AtomicSchedStats,
    err: AllocError,
    dir: Direction,
    is_retx: bool,
    rnti: Rnti,
    cc: CcIdx,
) {
    match err {
        AllocError::NoCchSpace => {
            stats.inc_no_cch_space();
            if is_retx {
                debug!(rnti = %RntiFmt(rnti), cc, dir = %dir, "couldn't find space in PDCCH for retx");
            } else {
                info!(rnti = %RntiFmt(rnti), cc, dir = %dir, "couldn't find space in PDCCH for tx");
            }
        }
        AllocError::NoSchSpace => {
            stats.inc_no_sch_space();
            debug!(rnti = %RntiFmt(rnti), cc, dir = %dir, retx = is_retx, "no contiguous PRB space");
        }
        AllocError::NoData | AllocError::NoRntiOpportunity => {
            trace!(rnti = %RntiFmt(rnti), cc, dir = %dir, reason = %err, "grant skipped");
        }
        AllocError::InvalidGrantParams => {
            debug!(rnti = %RntiFmt(rnti), cc, dir = %dir, retx = is_retx, "invalid grant parameters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SlotContext, TtiPoint};
    use crate::sched::config::{CellConfig, UeConfig};
    use crate::sched::harq::HarqState;
    use crate::sched::prb::PrbInterval;

    fn setup() -> (SlotGrid, SchedUser, UeCarrierConfig) {
        let cell = CellConfig {
            nof_prb: 25,
            nof_cce: 16,
            ..Default::default()
        };
        let cfg = UeConfig::single_carrier(0);
        let user = SchedUser::new(0x46, &cfg, &[cell]);
        let grid = SlotGrid::new(0, SlotContext::new(TtiPoint::new(0)), &cell);
        (grid, user, cfg.carriers[0])
    }

    #[test]
    fn test_dl_newtx_consumes_buffer() {
        let (mut grid, user, cfg) = setup();
        user.set_dl_pending(200);
        let mut harq = HarqEntity::new(4);
        let pid = get_dl_newtx_harq(&grid, &harq).unwrap();

        try_dl_newtx_alloc_greedy(&mut grid, &user, &cfg, &mut harq, pid).unwrap();

        let grant = grid.dl_grants()[0];
        assert!(grant.tbs >= 200);
        assert_eq!(user.dl_pending_bytes(), 0);
        assert_eq!(harq.get(DL, pid).unwrap().state(), HarqState::PendingNewData);
    }

    #[test]
    fn test_dl_newtx_without_data() {
        let (mut grid, user, cfg) = setup();
        let mut harq = HarqEntity::new(4);
        assert_eq!(
            try_dl_newtx_alloc_greedy(&mut grid, &user, &cfg, &mut harq, 0),
            Err(AllocError::NoData)
        );
        assert!(grid.dl_grants().is_empty());
    }

    #[test]
    fn test_dl_retx_moves_when_original_prbs_taken() {
        let (mut grid, _user, cfg) = setup();
        let mut harq = HarqEntity::new(4);
        harq.new_tx(DL, 2, TtiPoint::new(0), PrbInterval::new(0, 4), 10, 300);
        harq.feedback(DL, 2, false);

        grid.alloc_dl(DlGrant {
            rnti: 0x99,
            pid: 0,
            prbs: PrbInterval::new(0, 2),
            mcs: 1,
            tbs: 10,
            aggregation_level: 1,
            ndi: true,
            is_retx: false,
        })
        .unwrap();

        let pid = get_dl_retx_harq(&grid, &harq).unwrap();
        try_dl_retx_alloc(&mut grid, 0x46, &cfg, &mut harq, pid).unwrap();
        let grant = grid.dl_grants()[1];
        assert_eq!(grant.prbs, PrbInterval::new(2, 6));
        assert_eq!(grant.tbs, 300);
        assert!(grant.is_retx);
        assert_eq!(harq.get(DL, 2).unwrap().nof_retx(), 1);
    }

    #[test]
    fn test_ul_retx_non_adaptive_then_adaptive() {
        let (mut grid, _user, cfg) = setup();
        let mut harq = HarqEntity::new(4);
        harq.new_tx(UL, 0, TtiPoint::new(0), PrbInterval::new(0, 3), 10, 100);
        harq.feedback(UL, 0, false);

        try_ul_retx_alloc(&mut grid, 0x46, &cfg, &mut harq, 0).unwrap();
        assert!(!grid.ul_grants()[0].needs_pdcch);
        assert_eq!(grid.cce_available(), 16);

        // Second user's identical retx collides and goes adaptive
        let mut other = HarqEntity::new(4);
        other.new_tx(UL, 0, TtiPoint::new(0), PrbInterval::new(0, 3), 10, 100);
        other.feedback(UL, 0, false);
        try_ul_retx_alloc(&mut grid, 0x47, &cfg, &mut other, 0).unwrap();
        let grant = grid.ul_grants()[1];
        assert!(grant.needs_pdcch);
        assert_eq!(grant.prbs, PrbInterval::new(3, 6));
    }

    #[test]
    fn test_ul_newtx_uses_valid_width() {
        let (mut grid, user, cfg) = setup();
        user.set_ul_pending(1_000_000);
        let mut harq = HarqEntity::new(4);
        let pid = get_ul_newtx_harq(&grid, &harq).unwrap();

        try_ul_newtx_alloc(&mut grid, &user, &cfg, &mut harq, pid).unwrap();
        // 25 PRBs is 5^2, a valid width covering the whole carrier
        assert_eq!(grid.ul_grants()[0].prbs, PrbInterval::new(0, 25));
    }

    #[test]
    fn test_report_failure_counts() {
        let stats = AtomicSchedStats::new();
        report_failure(&stats, AllocError::NoCchSpace, DL, false, 0x46, 0);
        report_failure(&stats, AllocError::NoSchSpace, UL, true, 0x46, 0);
        report_failure(&stats, AllocError::NoData, UL, false, 0x46, 0);
        let snap = stats.snapshot();
        assert_eq!(snap.no_cch_space, 1);
        assert_eq!(snap.no_sch_space, 1);
    }
}
