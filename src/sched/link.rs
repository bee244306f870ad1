/*!
 * Link Model
 * MCS to transport block size mapping used to size allocations
 */

use crate::core::limits::MAX_MCS;

/// Resource elements per PRB per slot available to the data channel
const DATA_RE_PER_PRB: u32 = 120;

/// Spectral efficiency per MCS index, in millibits per resource element
const MCS_EFFICIENCY_MILLI: [u32; MAX_MCS as usize + 1] = [
    230, 310, 380, 490, 600, 740, 880, 1030, 1180, 1330, // 0-9 QPSK
    1330, 1480, 1700, 1910, 2160, 2410, 2570, // 10-16 16QAM
    2570, 2730, 3030, 3320, 3610, 3900, 4210, 4520, 4820, 5120, 5330, 5550, // 17-28 64QAM
];

#[inline]
fn efficiency(mcs: u8) -> u32 {
    MCS_EFFICIENCY_MILLI[mcs.min(MAX_MCS) as usize]
}

/// Transport block size in bytes carried by `nof_prb` PRBs at `mcs`
#[inline]
pub fn tbs_bytes(mcs: u8, nof_prb: u32) -> u32 {
    let bits_milli = u64::from(nof_prb) * u64::from(DATA_RE_PER_PRB) * u64::from(efficiency(mcs));
    (bits_milli / 8000) as u32
}

/// Smallest PRB count whose transport block holds `bytes`, capped at `max_prb`
#[inline]
pub fn required_prbs(mcs: u8, bytes: u32, max_prb: u32) -> u32 {
    if bytes == 0 {
        return 0;
    }
    let per_prb_milli = u64::from(DATA_RE_PER_PRB) * u64::from(efficiency(mcs));
    let needed = (u64::from(bytes) * 8000).div_ceil(per_prb_milli);
    (needed as u32).clamp(1, max_prb.max(1))
}
