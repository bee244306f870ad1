/*!
 * Scheduler Types
 * Algorithm selection, duplex patterns and allocation outcomes
 */

use crate::core::TtiPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Why a single grant could not be placed
///
/// Transient: the grant is skipped for this slot and the user is tried again
/// next slot. Never propagated past the per-user loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocError {
    #[error("no PDCCH space")]
    NoCchSpace,
    #[error("no contiguous PRB space")]
    NoSchSpace,
    #[error("user already scheduled in this slot")]
    NoRntiOpportunity,
    #[error("no pending data")]
    NoData,
    #[error("invalid grant parameters")]
    InvalidGrantParams,
}

pub type AllocResult<T> = Result<T, AllocError>;

/// Per-slot allocation algorithm, chosen once at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlgorithmKind {
    /// External priority decides where the DL pass starts; one interleaved
    /// retx/newtx pass per user
    #[default]
    Absolute,
    /// External priority decides where both passes start; all retransmissions
    /// first, then all new transmissions
    Tiered,
    /// Time round-robin; the external feed is ignored
    RoundRobin,
    /// Pass-through: no grants are produced
    Disabled,
}

impl AlgorithmKind {
    /// Parse from string representation
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "absolute" | "ext_prio" | "priority" | "prio" => Ok(Self::Absolute),
            "tiered" | "ext_prio_tiered" | "tiered_priority" => Ok(Self::Tiered),
            "round_robin" | "roundrobin" | "time_rr" | "rr" => Ok(Self::RoundRobin),
            "disabled" | "none" | "passthrough" => Ok(Self::Disabled),
            _ => Err(format!(
                "Invalid algorithm '{}'. Valid: absolute, tiered, round_robin, disabled",
                s
            )),
        }
    }

    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Tiered => "tiered",
            Self::RoundRobin => "round_robin",
            Self::Disabled => "disabled",
        }
    }

    /// Whether this algorithm consumes the external priority feed
    #[inline(always)]
    pub const fn uses_feed(&self) -> bool {
        matches!(self, Self::Absolute | Self::Tiered)
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlgorithmKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlgorithmKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Carrier duplex mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Duplex {
    /// Every slot carries both DL and UL
    #[default]
    Fdd,
    /// Repeating pattern: the first `dl_slots` of each period are DL, the
    /// last `ul_slots` are UL
    Tdd {
        period: u32,
        dl_slots: u32,
        ul_slots: u32,
    },
}

impl Duplex {
    /// Ten-slot pattern with six DL and four UL slots
    pub const fn tdd_reference() -> Self {
        Self::Tdd {
            period: 10,
            dl_slots: 6,
            ul_slots: 4,
        }
    }

    #[inline]
    pub fn is_dl(&self, tti: TtiPoint) -> bool {
        match *self {
            Self::Fdd => true,
            Self::Tdd {
                period, dl_slots, ..
            } => period > 0 && tti.to_uint() % period < dl_slots,
        }
    }

    #[inline]
    pub fn is_ul(&self, tti: TtiPoint) -> bool {
        match *self {
            Self::Fdd => true,
            Self::Tdd {
                period, ul_slots, ..
            } => period > 0 && tti.to_uint() % period >= period.saturating_sub(ul_slots),
        }
    }
}
