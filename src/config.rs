//! Run configuration.
//!
//! [`ReplayConfig`] gathers the per-component configs so that one file can
//! describe a whole replay:
//!
//! ```json
//! {
//!   "sequencer": { "gap_threshold": "60" },
//!   "reconstructor": { "checkpoint_interval": 64, "log_warnings": true },
//!   "correlator": { "tier": "10", "context_levels": 5 },
//!   "anomalies": { "max_stored": 1000000, "log_anomalies": true, "min_log_severity": 2 }
//! }
//! ```
//!
//! Every section and field is optional; missing ones take their defaults.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyReporterConfig;
use crate::correlator::CorrelatorConfig;
use crate::error::Result;
use crate::lob::ReconstructorConfig;
use crate::sequencer::SequencerConfig;
use crate::types::DepthTier;

/// Configuration for a full replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub sequencer: SequencerConfig,
    pub reconstructor: ReconstructorConfig,
    pub correlator: CorrelatorConfig,
    pub anomalies: AnomalyReporterConfig,

    /// Replay symbols on the rayon pool when the `parallel` feature is on
    pub parallel: bool,
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book tier trades are joined against.
    pub fn with_tier(mut self, tier: DepthTier) -> Self {
        self.correlator.tier = tier;
        self
    }

    /// Top levels per side copied into each enriched trade.
    pub fn with_context_levels(mut self, levels: usize) -> Self {
        self.correlator.context_levels = levels;
        self
    }

    /// Report same-stream silences longer than `threshold`.
    pub fn with_gap_threshold(mut self, threshold: Decimal) -> Self {
        self.sequencer = self.sequencer.with_gap_threshold(threshold);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.reconstructor = self.reconstructor.with_checkpoint_interval(interval);
        self
    }

    pub fn with_anomalies(mut self, config: AnomalyReporterConfig) -> Self {
        self.anomalies = config;
        self
    }

    /// Turn off warning logs from books and anomaly recording.
    pub fn quiet(mut self) -> Self {
        self.reconstructor = self.reconstructor.with_logging(false);
        self.anomalies = self.anomalies.with_logging(false);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Save to JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
