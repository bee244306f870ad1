/*!
 * Slot Allocation Benchmarks
 *
 * Time taken per slot across carriers, per algorithm and run mode
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mac_slot_sched::core::{Rnti, TtiPoint};
use mac_slot_sched::feed::{PriorityReceiver, SilentReceiver};
use mac_slot_sched::pipeline::{RunMode, SlotRunner};
use mac_slot_sched::sched::{
    AlgorithmKind, CellConfig, MacScheduler, SchedConfig, SlotResult, UeConfig,
};
use std::sync::Arc;

const NOF_CARRIERS: usize = 2;
const SATURATED: u32 = 1_000_000;

fn loaded_scheduler(algorithm: AlgorithmKind, nof_users: u16) -> Arc<MacScheduler> {
    let cfg = SchedConfig {
        algorithm,
        cells: vec![CellConfig::default(); NOF_CARRIERS],
        ..Default::default()
    };
    let receivers = (0..NOF_CARRIERS)
        .map(|_| Box::new(SilentReceiver) as Box<dyn PriorityReceiver>)
        .collect();
    let sched = Arc::new(MacScheduler::with_receivers(cfg, receivers).unwrap());
    for rnti in (0..nof_users).map(|i| 0x46 as Rnti + i) {
        sched.add_user(rnti, &UeConfig::all_carriers(NOF_CARRIERS)).unwrap();
    }
    sched
}

/// Acknowledge everything and refill buffers so every slot sees full load
fn refill(sched: &MacScheduler, completed: Vec<SlotResult>) {
    for result in completed {
        for carrier in &result.carriers {
            for grant in &carrier.dl {
                let _ = sched.dl_ack_info(grant.rnti, carrier.cc, grant.pid, true);
                let _ = sched.dl_buffer_state(grant.rnti, SATURATED);
            }
        }
    }
}

fn bench_carrier_slot(c: &mut Criterion) {
    let mut group = c.benchmark_group("carrier_slot");

    for algorithm in [
        AlgorithmKind::Absolute,
        AlgorithmKind::Tiered,
        AlgorithmKind::RoundRobin,
    ] {
        for nof_users in [1u16, 8, 32] {
            let sched = loaded_scheduler(algorithm, nof_users);
            for rnti in sched.rntis() {
                sched.dl_buffer_state(rnti, SATURATED).unwrap();
            }

            group.bench_with_input(
                BenchmarkId::new(algorithm.as_str(), nof_users),
                &sched,
                |b, sched| {
                    let mut tti = 0u32;
                    b.iter(|| {
                        let result = sched.run_slot(TtiPoint::new(tti), 0).unwrap();
                        for grant in &result.dl {
                            let _ = sched.dl_ack_info(grant.rnti, 0, grant.pid, true);
                            let _ = sched.dl_buffer_state(grant.rnti, SATURATED);
                        }
                        tti = tti.wrapping_add(1);
                        black_box(result)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_pipelined_slot(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipelined_slot");

    for mode in [RunMode::Serial, RunMode::ParallelCarriers] {
        let sched = loaded_scheduler(AlgorithmKind::Absolute, 8);
        for rnti in sched.rntis() {
            sched.dl_buffer_state(rnti, SATURATED).unwrap();
        }
        let runner = SlotRunner::new(Arc::clone(&sched), mode).unwrap();

        group.bench_function(BenchmarkId::from_parameter(format!("{:?}", mode)), |b| {
            let mut tti = 0u32;
            b.iter(|| {
                let mut completed = runner.run_slot(TtiPoint::new(tti)).unwrap();
                completed.extend(runner.drain());
                refill(&sched, completed);
                tti = tti.wrapping_add(1);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_carrier_slot, bench_pipelined_slot);
criterion_main!(benches);
