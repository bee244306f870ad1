/*!
 * Slot Results
 * Grants produced for one carrier, and the aggregate over all carriers
 */

use super::prb::PrbInterval;
use crate::core::{CcIdx, HarqPid, Rnti, SlotContext, TtiPoint};
use serde::{Deserialize, Serialize};

/// DL assignment: PDCCH DCI plus PDSCH allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlGrant {
    pub rnti: Rnti,
    pub pid: HarqPid,
    pub prbs: PrbInterval,
    pub mcs: u8,
    pub tbs: u32,
    /// CCEs consumed by the DCI
    pub aggregation_level: u32,
    pub ndi: bool,
    pub is_retx: bool,
}

/// UL grant: PUSCH allocation, with a DCI unless it is a non-adaptive retx
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlGrant {
    pub rnti: Rnti,
    pub pid: HarqPid,
    pub prbs: PrbInterval,
    pub mcs: u8,
    pub tbs: u32,
    pub needs_pdcch: bool,
    pub is_retx: bool,
}

/// Everything one carrier scheduled for one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierSlotResult {
    pub cc: CcIdx,
    pub tti_rx: TtiPoint,
    pub tti_tx_dl: TtiPoint,
    pub tti_tx_ul: TtiPoint,
    pub dl: Vec<DlGrant>,
    pub ul: Vec<UlGrant>,
    /// User position the DL pass started from
    pub dl_start: Option<usize>,
    /// User position the UL pass started from
    pub ul_start: Option<usize>,
    pub cce_used: u32,
}

impl CarrierSlotResult {
    /// A carrier slot without grants
    pub fn empty(cc: CcIdx, tti_rx: TtiPoint) -> Self {
        let ctx = SlotContext::new(tti_rx);
        Self {
            cc,
            tti_rx: ctx.tti_rx,
            tti_tx_dl: ctx.tti_tx_dl,
            tti_tx_ul: ctx.tti_tx_ul,
            dl: Vec::new(),
            ul: Vec::new(),
            dl_start: None,
            ul_start: None,
            cce_used: 0,
        }
    }

    pub fn nof_grants(&self) -> usize {
        self.dl.len() + self.ul.len()
    }

    pub fn dl_grant(&self, rnti: Rnti) -> Option<&DlGrant> {
        self.dl.iter().find(|g| g.rnti == rnti)
    }

    pub fn ul_grant(&self, rnti: Rnti) -> Option<&UlGrant> {
        self.ul.iter().find(|g| g.rnti == rnti)
    }
}

/// Slot result across every carrier, released once the last carrier finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotResult {
    pub tti_rx: TtiPoint,
    /// Ordered by carrier index
    pub carriers: Vec<CarrierSlotResult>,
}

impl SlotResult {
    pub fn nof_dl_grants(&self) -> usize {
        self.carriers.iter().map(|c| c.dl.len()).sum()
    }

    pub fn nof_ul_grants(&self) -> usize {
        self.carriers.iter().map(|c| c.ul.len()).sum()
    }

    pub fn carrier(&self, cc: CcIdx) -> Option<&CarrierSlotResult> {
        self.carriers.iter().find(|c| c.cc == cc)
    }
}
