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

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use heliofleet_types::EngineConfig;

/// Application configuration: filesystem layout plus the engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Engine sections ([schema], [registry], [metrics]) pass through to
    /// the core unchanged.
    #[serde(flatten)]
    pub engine: EngineConfig,
}

/// Locations relative to the data directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Incoming monitoring exports, one file per upload.
    pub monitoring_dir: PathBuf,
    /// Installation registry source (XLSX or CSV).
    pub registry_file: PathBuf,
    /// Historical store snapshot.
    pub snapshot_file: PathBuf,
    /// Report artifacts.
    pub output_dir: PathBuf,
    /// Consumed monitoring files are moved here after a successful run.
    pub archive_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            monitoring_dir: PathBuf::from("monitoring"),
            registry_file: PathBuf::from("sites_metadata.xlsx"),
            snapshot_file: PathBuf::from("history.json"),
            output_dir: PathBuf::from("reports"),
            archive_dir: PathBuf::from("archive"),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicitly passed file must parse; otherwise `heliofleet.toml` in
    /// the data directory is tried before falling back to defaults.
    pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            info!("loaded configuration from {}", path.display());
            config.validate()?;
            return Ok(config);
        }

        let default_path = data_dir.join("heliofleet.toml");
        if default_path.exists() {
            let config = Self::from_file(&default_path)?;
            info!("loaded configuration from {}", default_path.display());
            config.validate()?;
            return Ok(config);
        }

        warn!("no configuration file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))
        } else {
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))
        }
    }

    /// Resolve a configured path against the data directory.
    #[must_use]
    pub fn resolve(&self, data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.schema.header_search_rows == 0 {
            anyhow::bail!("schema.header_search_rows must be at least 1");
        }
        if self.engine.schema.site_id_column.trim().is_empty()
            || self.engine.schema.date_column.trim().is_empty()
            || self.engine.schema.energy_column.trim().is_empty()
        {
            anyhow::bail!("schema column names cannot be empty");
        }

        let metrics = &self.engine.metrics;
        if !(0.0..=1.0).contains(&metrics.min_coverage_ratio) {
            anyhow::bail!("metrics.min_coverage_ratio must be between 0.0 and 1.0");
        }
        if metrics.offline_threshold_days == 0 {
            anyhow::bail!("metrics.offline_threshold_days must be at least 1");
        }
        if metrics.degradation.first_year_pct < 0.0
            || metrics.degradation.subsequent_pct_per_year < 0.0
        {
            anyhow::bail!("degradation curve percentages must be non-negative");
        }
        if metrics.degradation.tolerance_pct < 0.0 {
            anyhow::bail!("degradation.tolerance_pct must be non-negative");
        }

        Ok(())
    }
}
