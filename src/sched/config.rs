/*!
 * Scheduler Configuration
 * Serde-backed configuration for cells, users and the slot pipeline
 */

use super::types::{AlgorithmKind, Duplex};
use crate::core::limits::{
    DEFAULT_MAX_HARQ_RETX, DEFAULT_NOF_WORKERS, DEFAULT_PIPELINE_DEPTH, DEFAULT_SLOT_DEADLINE,
    MAX_CARRIERS, MAX_CCE, MAX_MCS, MAX_PIPELINE_DEPTH, MAX_PRB, TTI_MODULUS,
};
use crate::core::{CcIdx, SchedError, SchedResult};
use crate::feed::FeedConfig;
use crate::tasks::TaskSchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a JSON configuration file
pub const CONFIG_ENV_VAR: &str = "MAC_SCHED_CONFIG";

/// Valid PDCCH aggregation levels, in CCEs
const AGGREGATION_LEVELS: [u32; 5] = [1, 2, 4, 8, 16];

/// Per-cell (carrier component) parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    pub nof_prb: u32,
    /// PDCCH capacity shared by DL and UL DCIs
    pub nof_cce: u32,
    pub duplex: Duplex,
    /// Retransmissions before a HARQ process is flushed
    pub max_harq_retx: u32,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            nof_prb: 50,
            nof_cce: 40,
            duplex: Duplex::Fdd,
            max_harq_retx: DEFAULT_MAX_HARQ_RETX,
        }
    }
}

impl CellConfig {
    pub fn validate(&self, cc: CcIdx) -> SchedResult<()> {
        if self.nof_prb == 0 || self.nof_prb > MAX_PRB {
            return Err(SchedError::InvalidConfig(format!(
                "cell {}: nof_prb {} must be in 1..={}",
                cc, self.nof_prb, MAX_PRB
            )));
        }
        if self.nof_cce == 0 || self.nof_cce > MAX_CCE {
            return Err(SchedError::InvalidConfig(format!(
                "cell {}: nof_cce {} must be in 1..={}",
                cc, self.nof_cce, MAX_CCE
            )));
        }
        if let Duplex::Tdd {
            period,
            dl_slots,
            ul_slots,
        } = self.duplex
        {
            let oversized = dl_slots
                .checked_add(ul_slots)
                .map_or(true, |used| used > period);
            if period == 0 || oversized {
                return Err(SchedError::InvalidConfig(format!(
                    "cell {}: TDD pattern {}DL/{}UL does not fit period {}",
                    cc, dl_slots, ul_slots, period
                )));
            }
        }
        Ok(())
    }
}

/// One carrier of a user's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UeCarrierConfig {
    pub enb_cc_idx: CcIdx,
    pub active: bool,
    pub dl_mcs: u8,
    pub ul_mcs: u8,
    /// PDCCH aggregation level in CCEs
    pub aggregation_level: u32,
}

impl Default for UeCarrierConfig {
    fn default() -> Self {
        Self {
            enb_cc_idx: 0,
            active: true,
            dl_mcs: 20,
            ul_mcs: 16,
            aggregation_level: 4,
        }
    }
}

/// User configuration; carrier order defines the UE-side carrier index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UeConfig {
    pub carriers: Vec<UeCarrierConfig>,
}

impl UeConfig {
    /// User served on a single carrier with default link parameters
    pub fn single_carrier(enb_cc_idx: CcIdx) -> Self {
        Self {
            carriers: vec![UeCarrierConfig {
                enb_cc_idx,
                ..Default::default()
            }],
        }
    }

    /// User served on carriers `0..nof_carriers`
    pub fn all_carriers(nof_carriers: usize) -> Self {
        Self {
            carriers: (0..nof_carriers)
                .map(|enb_cc_idx| UeCarrierConfig {
                    enb_cc_idx,
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn validate(&self, nof_cells: usize) -> SchedResult<()> {
        if self.carriers.is_empty() {
            return Err(SchedError::InvalidConfig("user has no carriers".into()));
        }
        for (i, carrier) in self.carriers.iter().enumerate() {
            if carrier.enb_cc_idx >= nof_cells {
                return Err(SchedError::UnknownCarrier(carrier.enb_cc_idx));
            }
            if self.carriers[..i]
                .iter()
                .any(|c| c.enb_cc_idx == carrier.enb_cc_idx)
            {
                return Err(SchedError::InvalidConfig(format!(
                    "carrier {} listed twice",
                    carrier.enb_cc_idx
                )));
            }
            if carrier.dl_mcs > MAX_MCS || carrier.ul_mcs > MAX_MCS {
                return Err(SchedError::InvalidConfig(format!(
                    "carrier {}: MCS must be at most {}",
                    carrier.enb_cc_idx, MAX_MCS
                )));
            }
            if !AGGREGATION_LEVELS.contains(&carrier.aggregation_level) {
                return Err(SchedError::InvalidConfig(format!(
                    "carrier {}: aggregation level {} not in {:?}",
                    carrier.enb_cc_idx, carrier.aggregation_level, AGGREGATION_LEVELS
                )));
            }
        }
        Ok(())
    }
}

/// Top-level scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    /// Slots allowed in flight before `start_slot` applies backpressure
    pub pipeline_depth: usize,
    /// Worker threads for parallel carrier execution
    pub nof_workers: usize,
    pub algorithm: AlgorithmKind,
    pub cells: Vec<CellConfig>,
    pub tasks: TaskSchedulerConfig,
    pub feed: FeedConfig,
    /// Per-carrier allocation deadline in microseconds
    pub slot_deadline_us: u64,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            pipeline_depth: DEFAULT_PIPELINE_DEPTH,
            nof_workers: DEFAULT_NOF_WORKERS,
            algorithm: AlgorithmKind::default(),
            cells: vec![CellConfig::default()],
            tasks: TaskSchedulerConfig::default(),
            feed: FeedConfig::default(),
            slot_deadline_us: DEFAULT_SLOT_DEADLINE.as_micros() as u64,
        }
    }
}

impl SchedConfig {
    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> SchedResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            SchedError::ConfigLoad(format!("{}: {}", path.display(), err))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> SchedResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `MAC_SCHED_CONFIG`, or fall back to defaults
    pub fn from_env() -> SchedResult<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::from_json_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> SchedResult<()> {
        if self.pipeline_depth == 0 || self.pipeline_depth > MAX_PIPELINE_DEPTH {
            return Err(SchedError::InvalidConfig(format!(
                "pipeline_depth {} must be in 1..={}",
                self.pipeline_depth, MAX_PIPELINE_DEPTH
            )));
        }
        // Buckets are indexed by TTI modulo depth; wrap must land on bucket 0
        if TTI_MODULUS as usize % self.pipeline_depth != 0 {
            return Err(SchedError::InvalidConfig(format!(
                "pipeline_depth {} must divide the TTI range {}",
                self.pipeline_depth, TTI_MODULUS
            )));
        }
        if self.nof_workers == 0 {
            return Err(SchedError::InvalidConfig(
                "nof_workers must be non-zero".into(),
            ));
        }
        if self.cells.is_empty() || self.cells.len() > MAX_CARRIERS {
            return Err(SchedError::InvalidConfig(format!(
                "{} cells configured, expected 1..={}",
                self.cells.len(),
                MAX_CARRIERS
            )));
        }
        for (cc, cell) in self.cells.iter().enumerate() {
            cell.validate(cc)?;
        }
        if self.slot_deadline_us == 0 {
            return Err(SchedError::InvalidConfig(
                "slot_deadline_us must be non-zero".into(),
            ));
        }
        self.tasks.validate()?;
        if self.algorithm.uses_feed() {
            self.feed.validate()?;
        }
        Ok(())
    }

    pub fn nof_carriers(&self) -> usize {
        self.cells.len()
    }

    pub fn slot_deadline(&self) -> Duration {
        Duration::from_micros(self.slot_deadline_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(SchedConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_pipeline_depth() {
        let mut config = SchedConfig::default();
        config.pipeline_depth = 0;
        assert!(config.validate().is_err());
        config.pipeline_depth = MAX_PIPELINE_DEPTH + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_tdd_pattern() {
        let mut config = SchedConfig::default();
        config.cells[0].duplex = Duplex::Tdd {
            period: 5,
            dl_slots: 4,
            ul_slots: 2,
        };
        assert!(matches!(config.validate(), Err(SchedError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_tdd_pattern_overflowing_u32() {
        let mut config = SchedConfig::default();
        config.cells[0].duplex = Duplex::Tdd {
            period: 10,
            dl_slots: u32::MAX,
            ul_slots: 2,
        };
        assert!(matches!(config.validate(), Err(SchedError::InvalidConfig(_))));

        let loaded = SchedConfig::from_json_str(
            r#"{"cells":[{"duplex":{"mode":"tdd","period":10,"dl_slots":4294967295,"ul_slots":2}}]}"#,
        );
        assert!(matches!(loaded, Err(SchedError::InvalidConfig(_))));
    }

    #[test]
    fn test_pipeline_depth_must_divide_tti_range() {
        let mut config = SchedConfig::default();
        for depth in [3, 6, 7, 9] {
            config.pipeline_depth = depth;
            assert!(
                matches!(config.validate(), Err(SchedError::InvalidConfig(_))),
                "depth {depth} accepted"
            );
        }
        for depth in [1, 2, 4, 5, 8, 10] {
            config.pipeline_depth = depth;
            assert!(config.validate().is_ok(), "depth {depth} rejected");
        }
    }

    #[test]
    fn test_from_json_str_with_defaults() {
        let config = SchedConfig::from_json_str(
            r#"{
                "pipeline_depth": 2,
                "algorithm": "Tiered",
                "cells": [
                    {"nof_prb": 25, "duplex": {"mode": "tdd", "period": 10, "dl_slots": 6, "ul_slots": 4}},
                    {"nof_prb": 100}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.pipeline_depth, 2);
        assert_eq!(config.algorithm, AlgorithmKind::Tiered);
        assert_eq!(config.cells[0].duplex, Duplex::tdd_reference());
        assert_eq!(config.cells[1].nof_cce, CellConfig::default().nof_cce);
        assert_eq!(config.nof_workers, DEFAULT_NOF_WORKERS);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"algorithm": "disabled", "slot_deadline_us": 500}}"#).unwrap();

        let config = SchedConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::Disabled);
        assert_eq!(config.slot_deadline(), Duration::from_micros(500));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = SchedConfig::from_json_file("/nonexistent/mac-sched.json").unwrap_err();
        assert!(matches!(err, SchedError::ConfigLoad(_)));
    }

    #[test]
    fn test_ue_config_validation() {
        assert!(UeConfig::single_carrier(0).validate(1).is_ok());
        assert!(matches!(
            UeConfig::single_carrier(2).validate(2),
            Err(SchedError::UnknownCarrier(2))
        ));

        let mut ue = UeConfig::all_carriers(2);
        ue.carriers[1].aggregation_level = 3;
        assert!(ue.validate(2).is_err());

        let mut dup = UeConfig::all_carriers(2);
        dup.carriers[1].enb_cc_idx = 0;
        assert!(dup.validate(2).is_err());
    }
}
