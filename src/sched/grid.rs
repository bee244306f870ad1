/*!
 * Slot Grid
 * Resources of one carrier for one slot: PRB masks, the PDCCH budget and
 * the grants committed so far
 *
 * Every commit is all-or-nothing. A rejected grant leaves the grid untouched.
 */

use super::config::CellConfig;
use super::prb::{PrbInterval, PrbMask};
use super::result::{CarrierSlotResult, DlGrant, UlGrant};
use super::types::{AllocError, AllocResult};
use crate::core::{CcIdx, Rnti, SlotContext};

pub struct SlotGrid {
    cc: CcIdx,
    ctx: SlotContext,
    nof_cce: u32,
    cce_used: u32,
    dl_enabled: bool,
    ul_enabled: bool,
    dl_mask: PrbMask,
    ul_mask: PrbMask,
    dl: Vec<DlGrant>,
    ul: Vec<UlGrant>,
    dl_start: Option<usize>,
    ul_start: Option<usize>,
}

impl SlotGrid {
    pub fn new(cc: CcIdx, ctx: SlotContext, cell: &CellConfig) -> Self {
        Self {
            cc,
            ctx,
            nof_cce: cell.nof_cce,
            cce_used: 0,
            dl_enabled: cell.duplex.is_dl(ctx.tti_tx_dl),
            ul_enabled: cell.duplex.is_ul(ctx.tti_tx_ul),
            dl_mask: PrbMask::new(cell.nof_prb),
            ul_mask: PrbMask::new(cell.nof_prb),
            dl: Vec::new(),
            ul: Vec::new(),
            dl_start: None,
            ul_start: None,
        }
    }

    #[inline(always)]
    pub fn cc(&self) -> CcIdx {
        self.cc
    }

    #[inline(always)]
    pub fn ctx(&self) -> &SlotContext {
        &self.ctx
    }

    /// Whether the DL transmission slot carries PDSCH
    #[inline(always)]
    pub fn is_dl_enabled(&self) -> bool {
        self.dl_enabled
    }

    /// Whether the UL transmission slot carries PUSCH
    #[inline(always)]
    pub fn is_ul_enabled(&self) -> bool {
        self.ul_enabled
    }

    pub fn dl_mask(&self) -> &PrbMask {
        &self.dl_mask
    }

    pub fn ul_mask(&self) -> &PrbMask {
        &self.ul_mask
    }

    pub fn nof_prb(&self) -> u32 {
        self.dl_mask.size()
    }

    pub fn cce_available(&self) -> u32 {
        self.nof_cce - self.cce_used
    }

    pub fn has_dl_dci(&self, rnti: Rnti) -> bool {
        self.dl.iter().any(|g| g.rnti == rnti)
    }

    pub fn has_ul_grant(&self, rnti: Rnti) -> bool {
        self.ul.iter().any(|g| g.rnti == rnti)
    }

    pub fn dl_grants(&self) -> &[DlGrant] {
        &self.dl
    }

    pub fn ul_grants(&self) -> &[UlGrant] {
        &self.ul
    }

    pub(crate) fn set_dl_start(&mut self, pos: usize) {
        self.dl_start = Some(pos);
    }

    pub(crate) fn set_ul_start(&mut self, pos: usize) {
        self.ul_start = Some(pos);
    }

    /// Commit a DL assignment
    pub fn alloc_dl(&mut self, grant: DlGrant) -> AllocResult<()> {
        if !self.dl_enabled {
            return Err(AllocError::NoSchSpace);
        }
        if self.has_dl_dci(grant.rnti) {
            return Err(AllocError::NoRntiOpportunity);
        }
        self.check_prbs(&self.dl_mask, grant.prbs)?;
        self.check_cce(grant.aggregation_level)?;

        self.dl_mask.fill(grant.prbs);
        self.cce_used += grant.aggregation_level;
        self.dl.push(grant);
        Ok(())
    }

    /// Commit a UL grant; `aggregation_level` is only charged when a DCI is needed
    pub fn alloc_ul(&mut self, grant: UlGrant, aggregation_level: u32) -> AllocResult<()> {
        if !self.ul_enabled {
            return Err(AllocError::NoSchSpace);
        }
        if self.has_ul_grant(grant.rnti) {
            return Err(AllocError::NoRntiOpportunity);
        }
        self.check_prbs(&self.ul_mask, grant.prbs)?;
        let cce = if grant.needs_pdcch { aggregation_level } else { 0 };
        self.check_cce(cce)?;

        self.ul_mask.fill(grant.prbs);
        self.cce_used += cce;
        self.ul.push(grant);
        Ok(())
    }

    fn check_prbs(&self, mask: &PrbMask, prbs: PrbInterval) -> AllocResult<()> {
        if prbs.is_empty() || prbs.stop() > mask.size() {
            return Err(AllocError::InvalidGrantParams);
        }
        if !mask.is_free(prbs) {
            return Err(AllocError::NoSchSpace);
        }
        Ok(())
    }

    fn check_cce(&self, cce: u32) -> AllocResult<()> {
        if cce > self.cce_available() {
            return Err(AllocError::NoCchSpace);
        }
        Ok(())
    }

    pub fn into_result(self) -> CarrierSlotResult {
        CarrierSlotResult {
            cc: self.cc,
            tti_rx: self.ctx.tti_rx,
            tti_tx_dl: self.ctx.tti_tx_dl,
            tti_tx_ul: self.ctx.tti_tx_ul,
            dl: self.dl,
            ul: self.ul,
            dl_start: self.dl_start,
            ul_start: self.ul_start,
            cce_used: self.cce_used,
        }
    }
}
