/*!
 * TTI Arithmetic
 * Wrapping slot counter and the reception/transmission slot mapping
 */

use super::limits::{TTI_MODULUS, TX_ENB_DELAY, UL_HARQ_DELAY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Slot counter wrapping at [`TTI_MODULUS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TtiPoint(u32);

impl TtiPoint {
    /// Create from a raw counter, wrapping into range
    #[inline]
    pub const fn new(tti: u32) -> Self {
        Self(tti % TTI_MODULUS)
    }

    #[inline(always)]
    pub const fn to_uint(self) -> u32 {
        self.0
    }

    /// Subframe index within the radio frame
    #[inline(always)]
    pub const fn sf_idx(self) -> u32 {
        self.0 % 10
    }

    /// System frame number
    #[inline(always)]
    pub const fn sfn(self) -> u32 {
        self.0 / 10
    }

    /// Forward distance from `earlier` to `self`, modulo the wrap
    #[inline]
    pub const fn distance_from(self, earlier: TtiPoint) -> u32 {
        (self.0 + TTI_MODULUS - earlier.0) % TTI_MODULUS
    }
}

impl Add<u32> for TtiPoint {
    type Output = TtiPoint;

    fn add(self, rhs: u32) -> TtiPoint {
        TtiPoint::new(self.0 + rhs % TTI_MODULUS)
    }
}

impl Sub<u32> for TtiPoint {
    type Output = TtiPoint;

    fn sub(self, rhs: u32) -> TtiPoint {
        TtiPoint::new(self.0 + TTI_MODULUS - rhs % TTI_MODULUS)
    }
}

impl From<u32> for TtiPoint {
    fn from(tti: u32) -> Self {
        TtiPoint::new(tti)
    }
}

impl fmt::Display for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing context of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotContext {
    pub tti_rx: TtiPoint,
    pub tti_tx_dl: TtiPoint,
    pub tti_tx_ul: TtiPoint,
}

impl SlotContext {
    pub fn new(tti_rx: TtiPoint) -> Self {
        let tti_tx_dl = tti_rx + TX_ENB_DELAY;
        Self {
            tti_rx,
            tti_tx_dl,
            tti_tx_ul: tti_tx_dl + UL_HARQ_DELAY,
        }
    }
}
