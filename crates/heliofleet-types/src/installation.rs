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

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Static metadata for one installation, loaded once per run from the
/// registry source and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub site_id: String,
    /// Human-readable site name; falls back to `site_id` in reports.
    pub site_name: Option<String>,
    /// Nameplate capacity. `None` when the registry row carried no usable
    /// capacity; such sites keep their attributes in reports but get no
    /// per-kWp metrics.
    pub capacity_kwp: Option<f64>,
    pub province: Option<String>,
    pub project: Option<String>,
    /// Composed panel description ("550 LONGi LR5-72HPH" style) when the
    /// registry has no dedicated panel-type column.
    pub panel_type: Option<String>,
    pub vendor: Option<String>,
    /// Degradation baseline origin. When absent, the site's first producing
    /// reading governs.
    pub commission_date: Option<NaiveDate>,
}

impl Installation {
    #[must_use]
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            site_name: None,
            capacity_kwp: None,
            province: None,
            project: None,
            panel_type: None,
            vendor: None,
            commission_date: None,
        }
    }

    #[must_use]
    pub fn with_capacity(site_id: impl Into<String>, capacity_kwp: f64) -> Self {
        Self {
            capacity_kwp: Some(capacity_kwp),
            ..Self::new(site_id)
        }
    }

    /// Derive nameplate capacity from panel count and per-panel wattage.
    /// Returns `None` unless both inputs are positive.
    #[must_use]
    pub fn derive_capacity_kwp(panel_count: Option<f64>, panel_watts: Option<f64>) -> Option<f64> {
        match (panel_count, panel_watts) {
            (Some(count), Some(watts)) if count > 0.0 && watts > 0.0 => {
                Some(count * watts / 1000.0)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.site_name.as_deref().unwrap_or(&self.site_id)
    }
}
