/*!
 * MAC Scheduler
 * Multi-carrier entry point: user management, buffer and HARQ feedback, and
 * per-carrier slot allocation
 *
 * # Concurrency
 * `run_slot` for different carriers may run in parallel. The user list is
 * held under a read lock for the whole allocation, so attach/detach wait for
 * in-flight slots. Each carrier's algorithm (and its feed) sits behind its
 * own mutex.
 */

use super::config::{SchedConfig, UeConfig};
use super::grid::SlotGrid;
use super::harq::FeedbackOutcome;
use super::policy::SlotAlgorithm;
use super::result::CarrierSlotResult;
use super::types::AlgorithmKind;
use super::ue::{SchedUser, UserList};
use crate::core::{
    CcIdx, Direction, HarqPid, Rnti, RntiFmt, SchedError, SchedResult, SlotContext, TtiPoint,
};
use crate::feed::{FeedStats, HintBroadcaster, PriorityReceiver};
use crate::monitoring::{AtomicSchedStats, SchedStats, SlotSpan};
use parking_lot::{Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};

pub struct MacScheduler {
    cfg: SchedConfig,
    users: RwLock<UserList>,
    carriers: Vec<Mutex<SlotAlgorithm>>,
    stats: AtomicSchedStats,
    deadline: Duration,
}

impl MacScheduler {
    /// Build a scheduler whose carriers each subscribe to `broadcaster`
    pub fn new(cfg: SchedConfig, broadcaster: &HintBroadcaster) -> SchedResult<Self> {
        let receivers = (0..cfg.cells.len())
            .map(|_| Box::new(broadcaster.subscribe()) as Box<dyn PriorityReceiver>)
            .collect();
        Self::with_receivers(cfg, receivers)
    }

    /// Build a scheduler with one explicit priority receiver per carrier
    pub fn with_receivers(
        cfg: SchedConfig,
        receivers: Vec<Box<dyn PriorityReceiver>>,
    ) -> SchedResult<Self> {
        cfg.validate()?;
        if receivers.len() != cfg.cells.len() {
            return Err(SchedError::InvalidConfig(format!(
                "{} priority receivers for {} cells",
                receivers.len(),
                cfg.cells.len()
            )));
        }

        let carriers = receivers
            .into_iter()
            .map(|receiver| Mutex::new(SlotAlgorithm::new(cfg.algorithm, receiver)))
            .collect();

        info!(
            algorithm = %cfg.algorithm,
            nof_cells = cfg.cells.len(),
            pipeline_depth = cfg.pipeline_depth,
            "MAC scheduler initialized"
        );

        Ok(Self {
            deadline: cfg.slot_deadline(),
            cfg,
            users: RwLock::new(UserList::default()),
            carriers,
            stats: AtomicSchedStats::new(),
        })
    }

    pub fn config(&self) -> &SchedConfig {
        &self.cfg
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.cfg.algorithm
    }

    pub fn nof_carriers(&self) -> usize {
        self.carriers.len()
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Attach a user; it joins the end of the round-robin order
    pub fn add_user(&self, rnti: Rnti, cfg: &UeConfig) -> SchedResult<()> {
        cfg.validate(self.cfg.cells.len())?;
        let mut users = self.users.write();
        if users.contains_key(&rnti) {
            return Err(SchedError::UserExists(rnti));
        }
        users.insert(rnti, SchedUser::new(rnti, cfg, &self.cfg.cells));
        info!(rnti = %RntiFmt(rnti), nof_carriers = cfg.carriers.len(), "user added");
        Ok(())
    }

    /// Detach a user, keeping the relative order of the others
    pub fn remove_user(&self, rnti: Rnti) -> SchedResult<()> {
        self.users
            .write()
            .shift_remove(&rnti)
            .ok_or(SchedError::UserNotFound(rnti))?;
        info!(rnti = %RntiFmt(rnti), "user removed");
        Ok(())
    }

    /// Reconfigure a user's carriers; HARQ state survives on kept carriers
    pub fn ue_cfg(&self, rnti: Rnti, cfg: &UeConfig) -> SchedResult<()> {
        cfg.validate(self.cfg.cells.len())?;
        let mut users = self.users.write();
        let user = users
            .get_mut(&rnti)
            .ok_or(SchedError::UserNotFound(rnti))?;
        user.reconfigure(cfg, &self.cfg.cells);
        info!(rnti = %RntiFmt(rnti), nof_carriers = cfg.carriers.len(), "user reconfigured");
        Ok(())
    }

    pub fn has_user(&self, rnti: Rnti) -> bool {
        self.users.read().contains_key(&rnti)
    }

    pub fn nof_users(&self) -> usize {
        self.users.read().len()
    }

    /// RNTIs in round-robin order
    pub fn rntis(&self) -> Vec<Rnti> {
        self.users.read().keys().copied().collect()
    }

    // =========================================================================
    // Buffers and feedback
    // =========================================================================

    /// Set the DL bytes waiting for `rnti`
    pub fn dl_buffer_state(&self, rnti: Rnti, bytes: u32) -> SchedResult<()> {
        self.with_user(rnti, |user| user.set_dl_pending(bytes))
    }

    /// Buffer status report: UL bytes the user has waiting
    pub fn ul_buffer_state(&self, rnti: Rnti, bytes: u32) -> SchedResult<()> {
        self.with_user(rnti, |user| user.set_ul_pending(bytes))
    }

    pub fn dl_buffer_pending(&self, rnti: Rnti) -> SchedResult<u32> {
        self.with_user(rnti, SchedUser::dl_pending_bytes)
    }

    pub fn ul_buffer_pending(&self, rnti: Rnti) -> SchedResult<u32> {
        self.with_user(rnti, SchedUser::ul_pending_bytes)
    }

    /// DL HARQ ACK/NACK for process `pid` on carrier `cc`
    pub fn dl_ack_info(
        &self,
        rnti: Rnti,
        cc: CcIdx,
        pid: HarqPid,
        ack: bool,
    ) -> SchedResult<FeedbackOutcome> {
        self.harq_feedback(rnti, cc, Direction::Downlink, pid, ack)
    }

    /// UL CRC result for process `pid` on carrier `cc`
    pub fn ul_crc_info(
        &self,
        rnti: Rnti,
        cc: CcIdx,
        pid: HarqPid,
        crc_ok: bool,
    ) -> SchedResult<FeedbackOutcome> {
        self.harq_feedback(rnti, cc, Direction::Uplink, pid, crc_ok)
    }

    /// Flush every HARQ process of the user on every carrier
    pub fn reset_harqs(&self, rnti: Rnti) -> SchedResult<()> {
        self.with_user(rnti, |user| {
            for carrier in user.carriers() {
                carrier.harq().reset();
            }
        })?;
        info!(rnti = %RntiFmt(rnti), "HARQ processes reset");
        Ok(())
    }

    fn harq_feedback(
        &self,
        rnti: Rnti,
        cc: CcIdx,
        dir: Direction,
        pid: HarqPid,
        ok: bool,
    ) -> SchedResult<FeedbackOutcome> {
        let users = self.users.read();
        let user = users.get(&rnti).ok_or(SchedError::UserNotFound(rnti))?;
        let carrier = user.carrier(cc).ok_or(SchedError::UnknownCarrier(cc))?;
        let outcome = carrier
            .harq()
            .feedback(dir, pid, ok)
            .ok_or(SchedError::InvalidHarq { rnti, cc, pid })?;

        match outcome {
            FeedbackOutcome::Flushed { tbs } => {
                self.stats.inc_harq_flushes();
                info!(rnti = %RntiFmt(rnti), cc, dir = %dir, pid, tbs, "HARQ process flushed after max retransmissions");
            }
            FeedbackOutcome::Ignored => {
                debug!(rnti = %RntiFmt(rnti), cc, dir = %dir, pid, "feedback for idle HARQ process ignored");
            }
            FeedbackOutcome::Acked { .. } | FeedbackOutcome::Retx => {}
        }
        Ok(outcome)
    }

    fn with_user<T>(&self, rnti: Rnti, f: impl FnOnce(&SchedUser) -> T) -> SchedResult<T> {
        let users = self.users.read();
        users
            .get(&rnti)
            .map(f)
            .ok_or(SchedError::UserNotFound(rnti))
    }

    // =========================================================================
    // Slot allocation
    // =========================================================================

    /// Allocate DL and UL for carrier `cc` in the slot received at `tti_rx`
    pub fn run_slot(&self, tti_rx: TtiPoint, cc: CcIdx) -> SchedResult<CarrierSlotResult> {
        let cell = self.cfg.cells.get(cc).ok_or(SchedError::UnknownCarrier(cc))?;
        let algorithm = self.carriers.get(cc).ok_or(SchedError::UnknownCarrier(cc))?;

        let span = SlotSpan::new(tti_rx, cc, self.deadline);
        let _entered = span.enter();

        let mut grid = SlotGrid::new(cc, SlotContext::new(tti_rx), cell);
        {
            let users = self.users.read();
            algorithm.lock().run(&users, &mut grid, &self.stats);
        }
        let result = grid.into_result();

        span.record_grants(result.dl.len(), result.ul.len());
        self.stats.inc_carrier_slots();
        for grant in &result.dl {
            self.stats.inc_dl(grant.is_retx);
        }
        for grant in &result.ul {
            self.stats.inc_ul(grant.is_retx);
        }
        if span.elapsed() > self.deadline {
            self.stats.inc_deadline_overruns();
        }
        Ok(result)
    }

    pub fn stats(&self) -> SchedStats {
        self.stats.snapshot()
    }

    /// Priority feed counters of carrier `cc`, if its algorithm follows the feed
    pub fn feed_stats(&self, cc: CcIdx) -> Option<FeedStats> {
        self.carriers.get(cc)?.lock().feed_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{encode_hint, SilentReceiver};
    use crate::sched::config::CellConfig;

    fn scheduler(algorithm: AlgorithmKind, nof_cells: usize) -> MacScheduler {
        let cfg = SchedConfig {
            algorithm,
            cells: vec![CellConfig::default(); nof_cells],
            ..Default::default()
        };
        let receivers = (0..nof_cells)
            .map(|_| Box::new(SilentReceiver) as Box<dyn PriorityReceiver>)
            .collect();
        MacScheduler::with_receivers(cfg, receivers).unwrap()
    }

    #[test]
    fn test_add_and_remove_users_keep_order() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        for rnti in [0x46, 0x47, 0x48] {
            sched.add_user(rnti, &UeConfig::single_carrier(0)).unwrap();
        }
        assert_eq!(
            sched.add_user(0x47, &UeConfig::single_carrier(0)),
            Err(SchedError::UserExists(0x47))
        );
        sched.remove_user(0x47).unwrap();
        assert_eq!(sched.rntis(), vec![0x46, 0x48]);
        assert_eq!(sched.remove_user(0x47), Err(SchedError::UserNotFound(0x47)));
    }

    #[test]
    fn test_unknown_carrier() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        assert_eq!(
            sched.run_slot(TtiPoint::new(0), 1).unwrap_err(),
            SchedError::UnknownCarrier(1)
        );
        assert!(sched.add_user(0x46, &UeConfig::single_carrier(1)).is_err());
    }

    #[test]
    fn test_dl_grant_then_ack() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        sched.add_user(0x46, &UeConfig::single_carrier(0)).unwrap();
        sched.dl_buffer_state(0x46, 300).unwrap();

        let result = sched.run_slot(TtiPoint::new(0), 0).unwrap();
        let grant = *result.dl_grant(0x46).unwrap();
        assert!(!grant.is_retx);
        assert_eq!(sched.dl_buffer_pending(0x46).unwrap(), 0);

        assert_eq!(
            sched.dl_ack_info(0x46, 0, grant.pid, true).unwrap(),
            FeedbackOutcome::Acked { tbs: grant.tbs }
        );
        let stats = sched.stats();
        assert_eq!(stats.dl_newtx, 1);
        assert_eq!(stats.carrier_slots, 1);
    }

    #[test]
    fn test_nack_leads_to_retx_next_slot() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        sched.add_user(0x46, &UeConfig::single_carrier(0)).unwrap();
        sched.dl_buffer_state(0x46, 300).unwrap();

        let first = sched.run_slot(TtiPoint::new(0), 0).unwrap();
        let pid = first.dl[0].pid;
        sched.dl_ack_info(0x46, 0, pid, false).unwrap();

        let second = sched.run_slot(TtiPoint::new(1), 0).unwrap();
        assert_eq!(second.dl.len(), 1);
        assert!(second.dl[0].is_retx);
        assert_eq!(second.dl[0].pid, pid);
        assert_eq!(sched.stats().dl_retx, 1);
    }

    #[test]
    fn test_harq_flush_counted() {
        let mut cfg = SchedConfig {
            algorithm: AlgorithmKind::RoundRobin,
            ..Default::default()
        };
        cfg.cells[0].max_harq_retx = 0;
        let sched = MacScheduler::with_receivers(cfg, vec![Box::new(SilentReceiver) as Box<dyn PriorityReceiver>])
            .unwrap();
        sched.add_user(0x46, &UeConfig::single_carrier(0)).unwrap();
        sched.dl_buffer_state(0x46, 100).unwrap();

        let result = sched.run_slot(TtiPoint::new(0), 0).unwrap();
        let outcome = sched.dl_ack_info(0x46, 0, result.dl[0].pid, false).unwrap();
        assert!(matches!(outcome, FeedbackOutcome::Flushed { .. }));
        assert_eq!(sched.stats().harq_flushes, 1);
    }

    #[test]
    fn test_invalid_harq_pid() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        sched.add_user(0x46, &UeConfig::single_carrier(0)).unwrap();
        assert!(matches!(
            sched.ul_crc_info(0x46, 0, 42, true),
            Err(SchedError::InvalidHarq { pid: 42, .. })
        ));
    }

    #[test]
    fn test_reset_harqs_drops_pending_retx() {
        let sched = scheduler(AlgorithmKind::RoundRobin, 1);
        sched.add_user(0x46, &UeConfig::single_carrier(0)).unwrap();
        sched.dl_buffer_state(0x46, 100).unwrap();
        let first = sched.run_slot(TtiPoint::new(0), 0).unwrap();
        sched.dl_ack_info(0x46, 0, first.dl[0].pid, false).unwrap();

        sched.reset_harqs(0x46).unwrap();
        let second = sched.run_slot(TtiPoint::new(1), 0).unwrap();
        assert!(second.dl.is_empty());
    }

    #[test]
    fn test_feed_driven_scheduler() {
        let broadcaster = HintBroadcaster::new();
        let cfg = SchedConfig {
            algorithm: AlgorithmKind::Absolute,
            ..Default::default()
        };
        let sched = MacScheduler::new(cfg, &broadcaster).unwrap();
        for rnti in [0x46, 0x47, 0x48] {
            sched.add_user(rnti, &UeConfig::single_carrier(0)).unwrap();
            sched.dl_buffer_state(rnti, 100).unwrap();
        }

        broadcaster.publish(encode_hint(0x48));
        let result = sched.run_slot(TtiPoint::new(0), 0).unwrap();
        assert_eq!(result.dl_start, Some(2));
        assert_eq!(result.dl[0].rnti, 0x48);
        assert_eq!(sched.feed_stats(0).unwrap().matched, 1);
    }
}
