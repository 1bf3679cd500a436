// ⚙️ Engine Configuration - Thresholds, tax tables and rates in one JSON file
// Every field has a built-in default, so a config file only names what it changes.

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::discrepancy::{AnalyzerThresholds, DiscrepancyAnalyzer, UnfiledLiabilityMode};
use crate::projection::{PenaltyRates, TaxProjectionEngine, TaxTable};
use crate::text_recovery::ReadabilityGate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate: ReadabilityGate,
    /// Brackets for substitute-for-return projections
    pub sfr_table: TaxTable,
    /// Brackets for estimating what an unfiled year would owe
    pub unfiled_table: TaxTable,
    pub rates: PenaltyRates,
    pub thresholds: AnalyzerThresholds,
    pub unfiled_mode: UnfiledLiabilityMode,
    /// Year interest accrues to; the current year when absent
    pub as_of_year: Option<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            gate: ReadabilityGate::default(),
            sfr_table: TaxTable::sfr_2023(),
            unfiled_table: TaxTable::unfiled_2024(),
            rates: PenaltyRates::default(),
            thresholds: AnalyzerThresholds::default(),
            unfiled_mode: UnfiledLiabilityMode::default(),
            as_of_year: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;

        tracing::info!(path = ?path, as_of_year = ?config.as_of_year, "Loaded engine config");
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize engine config")
    }

    pub fn resolved_as_of_year(&self) -> i32 {
        self.as_of_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }

    pub fn projection_engine(&self) -> TaxProjectionEngine {
        TaxProjectionEngine::new(self.sfr_table.clone(), self.rates, self.resolved_as_of_year())
    }

    pub fn discrepancy_analyzer(&self) -> DiscrepancyAnalyzer {
        DiscrepancyAnalyzer::new()
            .with_table(self.unfiled_table.clone())
            .with_thresholds(self.thresholds)
            .with_mode(self.unfiled_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filing::FilingStatus;
    use std::io::Write;

    #[test]
    fn test_defaults_round_trip_through_json() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "as_of_year": 2025, "unfiled_mode": "Signed", "thresholds": {{ "amendment": 500.0 }} }}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resolved_as_of_year(), 2025);
        assert_eq!(config.unfiled_mode, UnfiledLiabilityMode::Signed);
        assert_eq!(config.thresholds.amendment, 500.0);
        assert_eq!(config.thresholds.urgent, 10_000.0);
        assert_eq!(config.gate, ReadabilityGate::default());
        assert_eq!(
            config
                .sfr_table
                .schedule(FilingStatus::HeadOfHousehold)
                .unwrap()
                .standard_deduction,
            20_800.0
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = EngineConfig::from_file("/nonexistent/engine.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
