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

/// A daily energy value for one installation.
///
/// `Missing` means the monitoring export had no usable number for that day.
/// It is distinct from `Kwh(0.0)`, which is a genuine zero-production
/// reading (snowed-over panels, tripped breaker) and participates in window
/// coverage like any other sample.
///
/// Serializes as a plain number or `null`, matching the snapshot row schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnergyValue {
    Kwh(f64),
    Missing,
}

impl EnergyValue {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, EnergyValue::Missing)
    }

    /// The energy in kWh, if a reading is present.
    #[must_use]
    pub fn as_kwh(&self) -> Option<f64> {
        match self {
            EnergyValue::Kwh(v) => Some(*v),
            EnergyValue::Missing => None,
        }
    }

    /// True when the day shows actual production (present and above zero).
    #[must_use]
    pub fn is_producing(&self) -> bool {
        matches!(self, EnergyValue::Kwh(v) if *v > 0.0)
    }
}

/// One canonical reading as emitted by the schema normalizer.
///
/// The historical store holds at most one reading per `(site_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub site_id: String,
    pub date: NaiveDate,
    pub energy: EnergyValue,
}

impl Reading {
    #[must_use]
    pub fn new(site_id: impl Into<String>, date: NaiveDate, energy: EnergyValue) -> Self {
        Self {
            site_id: site_id.into(),
            date,
            energy,
        }
    }
}

/// Metric windows computed for every installation each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLabel {
    Days7,
    Days30,
    Days90,
    AllTime,
}

impl WindowLabel {
    pub const ALL: [WindowLabel; 4] = [
        WindowLabel::Days7,
        WindowLabel::Days30,
        WindowLabel::Days90,
        WindowLabel::AllTime,
    ];

    /// Fixed window length in days; `None` for the all-time window, whose
    /// span depends on the site's first reading.
    #[must_use]
    pub fn days(&self) -> Option<u32> {
        match self {
            WindowLabel::Days7 => Some(7),
            WindowLabel::Days30 => Some(30),
            WindowLabel::Days90 => Some(90),
            WindowLabel::AllTime => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::Days7 => "7d",
            WindowLabel::Days30 => "30d",
            WindowLabel::Days90 => "90d",
            WindowLabel::AllTime => "all_time",
        }
    }
}

impl std::fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
