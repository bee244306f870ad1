/*!
 * HARQ Entity
 * Per-carrier hybrid-ARQ process state for one user, both directions
 *
 * State machine per process:
 * `Empty -> PendingNewData` on a new transmission,
 * `PendingNewData -> Acked | AwaitingRetx` on feedback,
 * `AwaitingRetx -> PendingNewData` on retransmission.
 * A NACK after `max_retx` retransmissions flushes the process back to `Empty`.
 */

use super::prb::PrbInterval;
use crate::core::limits::NOF_HARQ_PROCESSES;
use crate::core::{Direction, HarqPid, TtiPoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarqState {
    #[default]
    Empty,
    /// Transport block transmitted, feedback outstanding
    PendingNewData,
    /// NACKed, waiting for a retransmission opportunity
    AwaitingRetx,
    Acked,
}

/// One hybrid-ARQ process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqProc {
    pid: HarqPid,
    state: HarqState,
    prbs: PrbInterval,
    mcs: u8,
    tbs: u32,
    nof_retx: u32,
    ndi: bool,
    tti_tx: Option<TtiPoint>,
}

impl HarqProc {
    fn new(pid: HarqPid) -> Self {
        Self {
            pid,
            state: HarqState::Empty,
            prbs: PrbInterval::default(),
            mcs: 0,
            tbs: 0,
            nof_retx: 0,
            ndi: false,
            tti_tx: None,
        }
    }

    #[inline(always)]
    pub fn pid(&self) -> HarqPid {
        self.pid
    }

    #[inline(always)]
    pub fn state(&self) -> HarqState {
        self.state
    }

    /// Free for a new transport block
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        matches!(self.state, HarqState::Empty | HarqState::Acked)
    }

    #[inline(always)]
    pub fn has_pending_retx(&self) -> bool {
        self.state == HarqState::AwaitingRetx
    }

    pub fn prbs(&self) -> PrbInterval {
        self.prbs
    }

    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    pub fn tbs(&self) -> u32 {
        self.tbs
    }

    pub fn nof_retx(&self) -> u32 {
        self.nof_retx
    }

    pub fn ndi(&self) -> bool {
        self.ndi
    }

    pub fn tti_tx(&self) -> Option<TtiPoint> {
        self.tti_tx
    }

    fn new_tx(&mut self, tti: TtiPoint, prbs: PrbInterval, mcs: u8, tbs: u32) {
        self.state = HarqState::PendingNewData;
        self.prbs = prbs;
        self.mcs = mcs;
        self.tbs = tbs;
        self.nof_retx = 0;
        self.ndi = !self.ndi;
        self.tti_tx = Some(tti);
    }

    fn new_retx(&mut self, tti: TtiPoint, prbs: PrbInterval) {
        self.state = HarqState::PendingNewData;
        self.prbs = prbs;
        self.nof_retx += 1;
        self.tti_tx = Some(tti);
    }

    fn flush(&mut self) {
        self.state = HarqState::Empty;
        self.prbs = PrbInterval::default();
        self.tbs = 0;
        self.nof_retx = 0;
        self.tti_tx = None;
    }
}

/// Result of applying feedback to a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Acked { tbs: u32 },
    /// NACK; the process waits for a retransmission
    Retx,
    /// NACK past the retransmission limit; the transport block was dropped
    Flushed { tbs: u32 },
    /// No transmission was outstanding on this process
    Ignored,
}

/// Hybrid-ARQ processes of one user on one carrier
#[derive(Debug, Clone)]
pub struct HarqEntity {
    dl: [HarqProc; NOF_HARQ_PROCESSES],
    ul: [HarqProc; NOF_HARQ_PROCESSES],
    max_retx: u32,
}

impl HarqEntity {
    pub fn new(max_retx: u32) -> Self {
        Self {
            dl: std::array::from_fn(|pid| HarqProc::new(pid as HarqPid)),
            ul: std::array::from_fn(|pid| HarqProc::new(pid as HarqPid)),
            max_retx,
        }
    }

    #[inline]
    fn procs(&self, dir: Direction) -> &[HarqProc; NOF_HARQ_PROCESSES] {
        match dir {
            Direction::Downlink => &self.dl,
            Direction::Uplink => &self.ul,
        }
    }

    #[inline]
    fn procs_mut(&mut self, dir: Direction) -> &mut [HarqProc; NOF_HARQ_PROCESSES] {
        match dir {
            Direction::Downlink => &mut self.dl,
            Direction::Uplink => &mut self.ul,
        }
    }

    pub fn get(&self, dir: Direction, pid: HarqPid) -> Option<&HarqProc> {
        self.procs(dir).get(pid as usize)
    }

    /// First process with a retransmission pending
    pub fn retx_pid(&self, dir: Direction) -> Option<HarqPid> {
        self.procs(dir)
            .iter()
            .find(|h| h.has_pending_retx())
            .map(HarqProc::pid)
    }

    /// First process free for a new transport block
    pub fn newtx_pid(&self, dir: Direction) -> Option<HarqPid> {
        self.procs(dir)
            .iter()
            .find(|h| h.is_empty())
            .map(HarqProc::pid)
    }

    /// Processes holding a transport block (in flight or awaiting retx)
    pub fn nof_active(&self, dir: Direction) -> usize {
        self.procs(dir).iter().filter(|h| !h.is_empty()).count()
    }

    pub(crate) fn new_tx(
        &mut self,
        dir: Direction,
        pid: HarqPid,
        tti: TtiPoint,
        prbs: PrbInterval,
        mcs: u8,
        tbs: u32,
    ) {
        if let Some(h) = self.procs_mut(dir).get_mut(pid as usize) {
            h.new_tx(tti, prbs, mcs, tbs);
        }
    }

    pub(crate) fn new_retx(&mut self, dir: Direction, pid: HarqPid, tti: TtiPoint, prbs: PrbInterval) {
        if let Some(h) = self.procs_mut(dir).get_mut(pid as usize) {
            h.new_retx(tti, prbs);
        }
    }

    /// Apply ACK/NACK (DL) or CRC (UL) feedback; `None` if `pid` is out of range
    pub fn feedback(&mut self, dir: Direction, pid: HarqPid, ok: bool) -> Option<FeedbackOutcome> {
        let max_retx = self.max_retx;
        let h = self.procs_mut(dir).get_mut(pid as usize)?;
        if h.state != HarqState::PendingNewData {
            return Some(FeedbackOutcome::Ignored);
        }

        let tbs = h.tbs;
        if ok {
            h.state = HarqState::Acked;
            Some(FeedbackOutcome::Acked { tbs })
        } else if h.nof_retx >= max_retx {
            h.flush();
            Some(FeedbackOutcome::Flushed { tbs })
        } else {
            h.state = HarqState::AwaitingRetx;
            Some(FeedbackOutcome::Retx)
        }
    }

    /// Drop every process in both directions
    pub fn reset(&mut self) {
        self.dl.iter_mut().chain(self.ul.iter_mut()).for_each(HarqProc::flush);
    }

    pub fn set_max_retx(&mut self, max_retx: u32) {
        self.max_retx = max_retx;
    }
}
