// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HelioFleet.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use serde::{Deserialize, Serialize};

// ============= Engine Configuration =============

/// Full configuration for one consolidation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub registry: RegistryColumns,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Day/month resolution policy for ambiguous slash-separated dates.
///
/// Applied uniformly to every row of a run; ambiguity is never guessed
/// per row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

/// Column resolution settings for monitoring exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Header cell matched by trimmed, case-insensitive equality.
    pub site_id_column: String,
    /// Header cell matched by trimmed, case-insensitive equality.
    pub date_column: String,
    /// Header cell matched when every alphanumeric token of this name
    /// appears in the cell ("solar supply (kwh)" matches
    /// "Solar Supply (kWh)" wherever the vendor put its unit suffix).
    pub energy_column: String,
    /// How many leading rows to scan for the header. Vendor exports bury it
    /// under banner and summary rows; 30 covers every export seen so far.
    pub header_search_rows: usize,
    /// Cell contents (trimmed, case-insensitive) normalized to a missing
    /// reading.
    pub missing_value_tokens: Vec<String>,
    pub date_order: DateOrder,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            site_id_column: "site".to_owned(),
            date_column: "date".to_owned(),
            energy_column: "solar supply (kwh)".to_owned(),
            header_search_rows: default_header_search_rows(),
            missing_value_tokens: default_missing_tokens(),
            date_order: DateOrder::default(),
        }
    }
}

fn default_header_search_rows() -> usize {
    30
}

fn default_missing_tokens() -> Vec<String> {
    ["", "na", "n/a", "null", "-"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Column resolution settings for the installation registry source.
///
/// Only `site_id_column` is required to exist; every other column is
/// optional and its attribute stays `None` when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryColumns {
    pub site_id_column: String,
    pub name_column: String,
    /// Direct nameplate capacity, preferred when present.
    pub capacity_column: String,
    /// Fallback capacity derivation: panel count x per-panel watts.
    pub panel_count_column: String,
    pub panel_watts_column: String,
    pub panel_model_column: String,
    pub vendor_column: String,
    pub province_column: String,
    pub project_column: String,
    pub commission_column: String,
    pub header_search_rows: usize,
}

impl Default for RegistryColumns {
    fn default() -> Self {
        Self {
            site_id_column: "split".to_owned(),
            name_column: "site".to_owned(),
            capacity_column: "capacity (kwp)".to_owned(),
            panel_count_column: "panels".to_owned(),
            panel_watts_column: "panel size".to_owned(),
            panel_model_column: "panel model".to_owned(),
            vendor_column: "panel vendor".to_owned(),
            province_column: "province".to_owned(),
            project_column: "project".to_owned(),
            commission_column: "commissioned date".to_owned(),
            header_search_rows: default_header_search_rows(),
        }
    }
}

// ============= Metrics Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Minimum fraction of a window that must carry present readings before
    /// a numeric yield is reported. Below this the window is
    /// insufficient-data; missing days are never averaged as zero.
    pub min_coverage_ratio: f64,
    /// Consecutive trailing days of zero/missing production that flag a
    /// previously-reporting site as offline.
    pub offline_threshold_days: u32,
    pub degradation: DegradationConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_coverage_ratio: default_min_coverage_ratio(),
            offline_threshold_days: default_offline_threshold_days(),
            degradation: DegradationConfig::default(),
        }
    }
}

fn default_min_coverage_ratio() -> f64 {
    0.5
}

fn default_offline_threshold_days() -> u32 {
    3
}

/// Expected lifecycle decay curve and classification tolerance.
///
/// The curve is piecewise linear: `age * first_year_pct` within the first
/// year, then `first_year_pct + (age - 1) * subsequent_pct_per_year`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    pub first_year_pct: f64,
    pub subsequent_pct_per_year: f64,
    /// Observed degradation may exceed the expected curve by this many
    /// percentage points before a site is classified as degrading.
    pub tolerance_pct: f64,
    /// Sites younger than this have no meaningful baseline yet.
    pub min_age_years: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            first_year_pct: 1.5,
            subsequent_pct_per_year: 0.4,
            tolerance_pct: 10.0,
            min_age_years: 0.25,
        }
    }
}

impl DegradationConfig {
    /// Expected cumulative degradation (percent) at a given age.
    #[must_use]
    pub fn expected_pct(&self, age_years: f64) -> f64 {
        if age_years <= 1.0 {
            age_years * self.first_year_pct
        } else {
            self.first_year_pct + (age_years - 1.0) * self.subsequent_pct_per_year
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.schema.header_search_rows, 30);
        assert_eq!(config.schema.date_order, DateOrder::DayFirst);
        assert!(config.schema.missing_value_tokens.contains(&"n/a".to_owned()));
        assert!((config.metrics.min_coverage_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.metrics.offline_threshold_days, 3);
    }

    #[test]
    fn test_expected_degradation_curve() {
        let curve = DegradationConfig::default();
        assert!((curve.expected_pct(0.5) - 0.75).abs() < 1e-9);
        assert!((curve.expected_pct(1.0) - 1.5).abs() < 1e-9);
        // After year one the slope flattens to 0.4 %/year.
        assert!((curve.expected_pct(3.0) - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "metrics": { "offline_threshold_days": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.metrics.offline_threshold_days, 5);
        assert_eq!(config.schema.site_id_column, "site");
    }
}
