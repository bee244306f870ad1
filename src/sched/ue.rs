/*!
 * Scheduler Users
 * Per-user scheduling state and the ordered user list
 *
 * The user list keeps attach order, which is the round-robin baseline that
 * priority positions index into. During a slot the list is only read; the
 * mutable parts (HARQ, pending bytes) have their own synchronization so
 * carriers can allocate in parallel.
 */

use super::config::{CellConfig, UeCarrierConfig, UeConfig};
use super::harq::HarqEntity;
use crate::core::{CcIdx, Rnti};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};

/// Attach-ordered mapping from RNTI to user state
pub type UserList = IndexMap<Rnti, SchedUser, ahash::RandomState>;

/// One configured carrier of a user
#[derive(Debug)]
pub struct UeCarrier {
    cfg: UeCarrierConfig,
    ue_cc_idx: usize,
    harq: Mutex<HarqEntity>,
}

impl UeCarrier {
    fn new(cfg: UeCarrierConfig, ue_cc_idx: usize, cell: &CellConfig) -> Self {
        Self {
            cfg,
            ue_cc_idx,
            harq: Mutex::new(HarqEntity::new(cell.max_harq_retx)),
        }
    }

    #[inline(always)]
    pub fn cfg(&self) -> &UeCarrierConfig {
        &self.cfg
    }

    #[inline(always)]
    pub fn ue_cc_idx(&self) -> usize {
        self.ue_cc_idx
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.cfg.active
    }

    /// Lock this carrier's HARQ processes
    #[inline]
    pub fn harq(&self) -> MutexGuard<'_, HarqEntity> {
        self.harq.lock()
    }
}

/// Scheduling state of one attached user
#[derive(Debug)]
pub struct SchedUser {
    rnti: Rnti,
    carriers: Vec<UeCarrier>,
    dl_pending: AtomicU32,
    ul_pending: AtomicU32,
}

impl SchedUser {
    /// `cfg` must already be validated against `cells`
    pub fn new(rnti: Rnti, cfg: &UeConfig, cells: &[CellConfig]) -> Self {
        let carriers = cfg
            .carriers
            .iter()
            .enumerate()
            .filter_map(|(ue_cc_idx, cc_cfg)| {
                cells
                    .get(cc_cfg.enb_cc_idx)
                    .map(|cell| UeCarrier::new(*cc_cfg, ue_cc_idx, cell))
            })
            .collect();
        Self {
            rnti,
            carriers,
            dl_pending: AtomicU32::new(0),
            ul_pending: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    /// UE-side index of eNB carrier `enb_cc_idx`, if the user is configured on it
    #[inline]
    pub fn enb_to_ue_cc_idx(&self, enb_cc_idx: CcIdx) -> Option<usize> {
        self.carrier(enb_cc_idx).map(UeCarrier::ue_cc_idx)
    }

    #[inline]
    pub fn carrier(&self, enb_cc_idx: CcIdx) -> Option<&UeCarrier> {
        self.carriers
            .iter()
            .find(|c| c.cfg.enb_cc_idx == enb_cc_idx)
    }

    pub fn carriers(&self) -> &[UeCarrier] {
        &self.carriers
    }

    /// Apply a new configuration, keeping HARQ state of carriers that remain
    pub fn reconfigure(&mut self, cfg: &UeConfig, cells: &[CellConfig]) {
        let mut previous = std::mem::take(&mut self.carriers);
        self.carriers = cfg
            .carriers
            .iter()
            .enumerate()
            .filter_map(|(ue_cc_idx, cc_cfg)| {
                let cell = cells.get(cc_cfg.enb_cc_idx)?;
                let kept = previous
                    .iter()
                    .position(|c| c.cfg.enb_cc_idx == cc_cfg.enb_cc_idx)
                    .map(|pos| previous.swap_remove(pos));
                Some(match kept {
                    Some(mut carrier) => {
                        carrier.cfg = *cc_cfg;
                        carrier.ue_cc_idx = ue_cc_idx;
                        carrier.harq.get_mut().set_max_retx(cell.max_harq_retx);
                        carrier
                    }
                    None => UeCarrier::new(*cc_cfg, ue_cc_idx, cell),
                })
            })
            .collect();
    }

    pub fn dl_pending_bytes(&self) -> u32 {
        self.dl_pending.load(Ordering::Relaxed)
    }

    pub fn ul_pending_bytes(&self) -> u32 {
        self.ul_pending.load(Ordering::Relaxed)
    }

    pub fn set_dl_pending(&self, bytes: u32) {
        self.dl_pending.store(bytes, Ordering::Relaxed);
    }

    pub fn set_ul_pending(&self, bytes: u32) {
        self.ul_pending.store(bytes, Ordering::Relaxed);
    }

    /// Account `bytes` of DL data as scheduled
    pub fn consume_dl(&self, bytes: u32) {
        saturating_consume(&self.dl_pending, bytes);
    }

    /// Account `bytes` of UL data as granted
    pub fn consume_ul(&self, bytes: u32) {
        saturating_consume(&self.ul_pending, bytes);
    }
}

#[inline]
fn saturating_consume(counter: &AtomicU32, bytes: u32) {
    // Closure always returns Some, so the update cannot fail
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pending| {
        Some(pending.saturating_sub(bytes))
    });
}
