/*!
 * System Limits and Constants
 *
 * Centralized location for scheduler-wide limits, timing offsets, and pool sizes.
 * Organized by domain for maintainability and discoverability.
 */

use std::time::Duration;

// =============================================================================
// SLOT TIMING
// =============================================================================

/// TTI counter modulus (1024 frames x 10 subframes)
pub const TTI_MODULUS: u32 = 10240;

/// Processing delay between reception and DL transmission, in slots
pub const TX_ENB_DELAY: u32 = 4;

/// Offset between the DL grant slot and the UL transmission slot
pub const UL_HARQ_DELAY: u32 = 4;

/// Default per-slot allocation deadline
pub const DEFAULT_SLOT_DEADLINE: Duration = Duration::from_micros(1000);

// =============================================================================
// PIPELINE
// =============================================================================

/// Maximum concurrently in-flight slots
pub const MAX_PIPELINE_DEPTH: usize = 10;

/// Default concurrently in-flight slots
pub const DEFAULT_PIPELINE_DEPTH: usize = 4;

/// Default worker threads for parallel carrier execution
pub const DEFAULT_NOF_WORKERS: usize = 4;

/// Maximum carrier components per cell group
pub const MAX_CARRIERS: usize = 5;

// =============================================================================
// TASK SCHEDULER
// =============================================================================

/// Default capacity of each external task queue
pub const DEFAULT_EXTERN_QUEUE_CAPACITY: usize = 512;

/// Default number of pre-allocated timers
pub const DEFAULT_TIMER_POOL_SIZE: usize = 100;

// =============================================================================
// RADIO RESOURCES
// =============================================================================

/// HARQ processes per direction per carrier
pub const NOF_HARQ_PROCESSES: usize = 8;

/// Default retransmission limit before a HARQ process is flushed
pub const DEFAULT_MAX_HARQ_RETX: u32 = 4;

/// Largest carrier bandwidth in PRBs
pub const MAX_PRB: u32 = 275;

/// Largest PDCCH size in CCEs
pub const MAX_CCE: u32 = 128;

/// Highest MCS index in the link table
pub const MAX_MCS: u8 = 28;

// =============================================================================
// PRIORITY FEED
// =============================================================================

/// Well-known endpoint of the external priority publisher
pub const DEFAULT_PRIORITY_ENDPOINT: &str = "ipc:///dev/shm/priorities";

/// Size of an encoded priority hint in bytes
pub const PRIORITY_HINT_LEN: usize = 4;
