/*!
 * Scheduler Module
 * Per-slot radio resource allocation for DL and UL across carriers
 */

mod alloc;
mod config;
mod grid;
mod harq;
mod link;
mod policy;
mod prb;
mod result;
mod scheduler;
mod types;
mod ue;

// Re-export public API
pub use alloc::{
    get_dl_newtx_harq, get_dl_retx_harq, get_ul_newtx_harq, get_ul_retx_harq,
    try_dl_newtx_alloc_greedy, try_dl_retx_alloc, try_ul_newtx_alloc, try_ul_retx_alloc,
};
pub use config::{CellConfig, SchedConfig, UeCarrierConfig, UeConfig, CONFIG_ENV_VAR};
pub use grid::SlotGrid;
pub use harq::{FeedbackOutcome, HarqEntity, HarqProc, HarqState};
pub use link::{required_prbs, tbs_bytes};
pub use policy::{CarrierFeed, SlotAlgorithm, WrapAround};
pub use prb::{
    find_contiguous_ul_prbs, find_first_free_run, find_free_run_of, is_dft_valid_width,
    PrbInterval, PrbMask,
};
pub use result::{CarrierSlotResult, DlGrant, SlotResult, UlGrant};
pub use scheduler::MacScheduler;
pub use types::{AlgorithmKind, AllocError, AllocResult, Duplex};
pub use ue::{SchedUser, UeCarrier, UserList};
