/*!
 * Core Types
 * Common types used across the scheduler
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Radio network temporary identifier
pub type Rnti = u16;

/// eNB-side carrier component index
pub type CcIdx = usize;

/// HARQ process identifier
pub type HarqPid = u32;

/// Link direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Downlink,
    Uplink,
}

impl Direction {
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Downlink => "DL",
            Self::Uplink => "UL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex formatting wrapper used in structured log fields
#[derive(Clone, Copy)]
pub struct RntiFmt(pub Rnti);

impl fmt::Display for RntiFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Debug for RntiFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
