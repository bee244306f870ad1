/*!
 * Feed Types
 * Hint wire format, feed configuration and counters
 */

use crate::core::limits::{DEFAULT_PRIORITY_ENDPOINT, PRIORITY_HINT_LEN};
use crate::core::{Rnti, SchedError, SchedResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// External priority feed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Publisher endpoint the SUB socket connects to
    pub endpoint: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PRIORITY_ENDPOINT.to_string(),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> SchedResult<()> {
        let known = ["ipc://", "tcp://", "inproc://"];
        if !known.iter().any(|scheme| self.endpoint.starts_with(scheme)) {
            return Err(SchedError::InvalidConfig(format!(
                "feed endpoint '{}' has no supported transport scheme",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// Decode a priority hint payload
///
/// Hints are a single little-endian `i32`. Trailing bytes are ignored;
/// shorter payloads yield `None`.
#[inline]
pub fn decode_hint(payload: &[u8]) -> Option<i32> {
    let raw: [u8; PRIORITY_HINT_LEN] = payload.get(..PRIORITY_HINT_LEN)?.try_into().ok()?;
    Some(i32::from_le_bytes(raw))
}

/// Encode a hint naming `rnti`
#[inline]
pub fn encode_hint(rnti: Rnti) -> Bytes {
    Bytes::copy_from_slice(&i32::from(rnti).to_le_bytes())
}

/// Priority feed counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    /// Resolutions performed
    pub resolutions: u64,
    /// Messages taken from the channel
    pub received: u64,
    /// Messages naming a live user
    pub matched: u64,
    /// Well-formed messages naming no live user
    pub unmatched: u64,
    /// Payloads too short to decode
    pub malformed: u64,
    /// Receive attempts that failed in the transport
    pub transport_errors: u64,
}
