/*!
 * MAC Scheduler Simulator - Main Entry Point
 *
 * Drives the slot scheduler against synthetic users:
 * - Every user has saturated DL traffic on every carrier
 * - HARQ feedback arrives as positive ACKs a few slots after transmission
 * - Priority hints optionally arrive over ZeroMQ
 */

use mac_slot_sched::core::limits::UL_HARQ_DELAY;
use mac_slot_sched::core::{Rnti, RntiFmt};
use mac_slot_sched::{
    init_tracing, HintBroadcaster, MacScheduler, RunMode, SchedConfig, SlotResult, SlotRunner,
    TaskScheduler, TtiPoint, UeConfig, ZmqHintBridge,
};
use miette::IntoDiagnostic;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// First RNTI handed out to simulated users
const FIRST_RNTI: Rnti = 0x46;
const SATURATED_DL_BYTES: u32 = 1_000_000;
const UL_BSR_BYTES: u32 = 2_000;

struct SimParams {
    nof_slots: u32,
    nof_users: u16,
    mode: RunMode,
    zmq: bool,
}

impl SimParams {
    fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false)
        };
        Self {
            nof_slots: env_number("MAC_SCHED_SLOTS").unwrap_or(1000),
            nof_users: env_number("MAC_SCHED_USERS").unwrap_or(4),
            mode: if flag("MAC_SCHED_PARALLEL") {
                RunMode::ParallelCarriers
            } else {
                RunMode::Serial
            },
            zmq: flag("MAC_SCHED_ZMQ"),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

fn main() -> miette::Result<()> {
    init_tracing();

    let cfg = SchedConfig::from_env()?;
    let params = SimParams::from_env();
    info!(
        algorithm = %cfg.algorithm,
        nof_cells = cfg.nof_carriers(),
        nof_users = params.nof_users,
        nof_slots = params.nof_slots,
        mode = ?params.mode,
        "MAC scheduler simulator starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("mac-feed")
        .enable_all()
        .build()
        .into_diagnostic()?;

    let broadcaster = HintBroadcaster::new();
    let bridge = if params.zmq {
        Some(runtime.block_on(ZmqHintBridge::connect(&cfg.feed, broadcaster.clone()))?)
    } else {
        None
    };

    let tasks_cfg = cfg.tasks;
    let nof_carriers = cfg.nof_carriers();
    let sched = Arc::new(MacScheduler::new(cfg, &broadcaster)?);
    for rnti in (0..params.nof_users).map(|i| FIRST_RNTI + i) {
        sched.add_user(rnti, &UeConfig::all_carriers(nof_carriers))?;
        sched.dl_buffer_state(rnti, SATURATED_DL_BYTES)?;
        sched.ul_buffer_state(rnti, UL_BSR_BYTES)?;
    }

    let runner = SlotRunner::new(Arc::clone(&sched), params.mode)?;
    let mut tasks = TaskScheduler::new(tasks_cfg)?;
    let handle = tasks.handle();

    let start = Instant::now();
    for slot in 0..params.nof_slots {
        tasks.tic();
        tasks.run_pending_tasks()?;

        for result in runner.run_slot(TtiPoint::new(slot))? {
            log_slot(&result);
            let sched = Arc::clone(&sched);
            handle.defer_callback(UL_HARQ_DELAY, move || ack_slot(&sched, &result))?;
        }
    }

    for result in runner.drain() {
        log_slot(&result);
        ack_slot(&sched, &result);
    }
    // Let outstanding feedback timers fire
    for _ in 0..=UL_HARQ_DELAY {
        tasks.tic();
        tasks.run_pending_tasks()?;
    }
    tasks.stop();

    let elapsed = start.elapsed();
    let stats = sched.stats();
    info!(
        carrier_slots = stats.carrier_slots,
        dl_newtx = stats.dl_newtx,
        dl_retx = stats.dl_retx,
        ul_newtx = stats.ul_newtx,
        ul_retx = stats.ul_retx,
        no_cch_space = stats.no_cch_space,
        deadline_overruns = stats.deadline_overruns,
        "simulation finished"
    );
    if params.nof_slots > 0 {
        info!(
            per_slot_us = elapsed.as_micros() as u64 / u64::from(params.nof_slots),
            "Total time taken per slot"
        );
    }

    if let Some(bridge) = bridge {
        let forwarded = runtime.block_on(bridge.shutdown());
        info!(forwarded, "priority hints forwarded");
    }
    Ok(())
}

fn log_slot(result: &SlotResult) {
    for carrier in &result.carriers {
        for grant in &carrier.dl {
            info!(
                tti = result.tti_rx.to_uint(),
                cc = carrier.cc,
                rnti = %RntiFmt(grant.rnti),
                pid = grant.pid,
                prbs = %grant.prbs,
                tbs = grant.tbs,
                retx = grant.is_retx,
                "DL grant"
            );
        }
    }
}

/// Positive feedback for every process transmitted in `result`, then top up
/// the saturated DL buffers
fn ack_slot(sched: &MacScheduler, result: &SlotResult) {
    for carrier in &result.carriers {
        for grant in &carrier.dl {
            if let Err(e) = sched.dl_ack_info(grant.rnti, carrier.cc, grant.pid, true) {
                warn!(rnti = %RntiFmt(grant.rnti), cc = carrier.cc, error = %e, "DL ACK rejected");
            }
            if let Err(e) = sched.dl_buffer_state(grant.rnti, SATURATED_DL_BYTES) {
                warn!(rnti = %RntiFmt(grant.rnti), error = %e, "DL buffer refill rejected");
            }
        }
        for grant in &carrier.ul {
            if let Err(e) = sched.ul_crc_info(grant.rnti, carrier.cc, grant.pid, true) {
                warn!(rnti = %RntiFmt(grant.rnti), cc = carrier.cc, error = %e, "UL CRC rejected");
            }
            if let Err(e) = sched.ul_buffer_state(grant.rnti, UL_BSR_BYTES) {
                warn!(rnti = %RntiFmt(grant.rnti), error = %e, "UL BSR rejected");
            }
        }
    }
}
