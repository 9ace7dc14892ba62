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

//! Lifecycle assessment: offline detection and degradation against the
//! expected decay curve.
//!
//! Observed degradation compares the 95th-percentile daily specific yield
//! of the commissioning month against the trailing 30 days. The percentile
//! damps single-day spikes (cleaning days, meter glitches) that a plain
//! mean would let dominate a one-month sample.

use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;

use heliofleet_types::{EnergyValue, MetricsConfig};

use crate::metrics::windows::first_present_date;
use crate::store::SiteHistory;

/// Operational classification of one installation.
///
/// Precedence: offline and insufficient-data outrank the degradation
/// verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Nominal,
    Degrading,
    /// Stopped reporting: has history, but the trailing days are all
    /// zero or missing.
    Offline,
    /// Never reported, too young, or not enough baseline samples.
    InsufficientData,
}

impl SiteStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Nominal => "nominal",
            SiteStatus::Degrading => "degrading",
            SiteStatus::Offline => "offline",
            SiteStatus::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degradation assessment for one site as of the run date.
#[derive(Debug, Clone, Serialize)]
pub struct DegradationRecord {
    pub status: SiteStatus,
    pub age_years: Option<f64>,
    /// Cumulative expected degradation (percent) at the site's age.
    pub expected_pct: Option<f64>,
    /// Observed cumulative degradation (percent); negative means the site
    /// outperforms its commissioning baseline.
    pub observed_pct: Option<f64>,
    pub rate_pct_per_year: Option<f64>,
}

impl DegradationRecord {
    fn insufficient(age_years: Option<f64>) -> Self {
        Self {
            status: SiteStatus::InsufficientData,
            age_years,
            expected_pct: None,
            observed_pct: None,
            rate_pct_per_year: None,
        }
    }
}

/// Assess one site. Pure over the history snapshot.
#[must_use]
pub fn assess_site(
    history: Option<&SiteHistory>,
    capacity_kwp: Option<f64>,
    commission_date: Option<NaiveDate>,
    as_of: NaiveDate,
    config: &MetricsConfig,
) -> DegradationRecord {
    let Some(history) = history else {
        return DegradationRecord::insufficient(None);
    };
    let Some(first_present) = first_present_date(history, as_of) else {
        // Never reported at all: not offline, there is nothing to have
        // stopped.
        return DegradationRecord::insufficient(None);
    };

    if is_offline(history, as_of, config.offline_threshold_days) {
        return DegradationRecord {
            status: SiteStatus::Offline,
            age_years: age_years(commission_date, history, first_present, as_of),
            expected_pct: None,
            observed_pct: None,
            rate_pct_per_year: None,
        };
    }

    let age = age_years(commission_date, history, first_present, as_of);
    let Some(age) = age else {
        return DegradationRecord::insufficient(None);
    };
    if age < config.degradation.min_age_years {
        return DegradationRecord::insufficient(Some(age));
    }
    let Some(capacity) = capacity_kwp.filter(|c| *c > 0.0) else {
        return DegradationRecord::insufficient(Some(age));
    };

    let origin = commission_date.unwrap_or(first_present);
    let baseline_end = origin
        .checked_add_months(Months::new(1))
        .unwrap_or(origin + Duration::days(30));
    let recent_start = as_of - Duration::days(29);

    let baseline = producing_yields(history, capacity, origin, baseline_end - Duration::days(1));
    let recent = producing_yields(history, capacity, recent_start, as_of);
    let (Some(initial_p95), Some(recent_p95)) =
        (percentile_95(&baseline), percentile_95(&recent))
    else {
        return DegradationRecord::insufficient(Some(age));
    };
    if initial_p95 <= 0.0 {
        return DegradationRecord::insufficient(Some(age));
    }

    let observed_pct = (initial_p95 - recent_p95) / initial_p95 * 100.0;
    let expected_pct = config.degradation.expected_pct(age);
    let status = if observed_pct > expected_pct + config.degradation.tolerance_pct {
        SiteStatus::Degrading
    } else {
        SiteStatus::Nominal
    };

    DegradationRecord {
        status,
        age_years: Some(age),
        expected_pct: Some(expected_pct),
        observed_pct: Some(observed_pct),
        rate_pct_per_year: Some(observed_pct / age),
    }
}

/// Trailing `threshold_days` calendar days ending at `as_of` all show zero
/// or missing production.
fn is_offline(history: &SiteHistory, as_of: NaiveDate, threshold_days: u32) -> bool {
    if threshold_days == 0 {
        return false;
    }
    let start = as_of - Duration::days(i64::from(threshold_days) - 1);
    let mut day = start;
    while day <= as_of {
        match history.get(&day) {
            Some(EnergyValue::Kwh(v)) if *v > 0.0 => return false,
            Some(EnergyValue::Kwh(_) | EnergyValue::Missing) | None => {}
        }
        day += Duration::days(1);
    }
    true
}

fn age_years(
    commission_date: Option<NaiveDate>,
    history: &SiteHistory,
    first_present: NaiveDate,
    as_of: NaiveDate,
) -> Option<f64> {
    // Prefer the registry's commissioning date; fall back to the first
    // producing reading, then the first present one.
    let origin = commission_date
        .or_else(|| {
            history
                .range(..=as_of)
                .find(|(_, v)| v.is_producing())
                .map(|(d, _)| *d)
        })
        .unwrap_or(first_present);
    let days = (as_of - origin).num_days();
    if days < 0 {
        return None;
    }
    Some(days as f64 / 365.25)
}

/// Daily specific yields for producing days within an inclusive date range.
fn producing_yields(
    history: &SiteHistory,
    capacity_kwp: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<f64> {
    if end < start {
        return Vec::new();
    }
    history
        .range(start..=end)
        .filter_map(|(_, v)| v.as_kwh())
        .filter(|kwh| *kwh > 0.0)
        .map(|kwh| kwh / capacity_kwp)
        .collect()
}

/// 95th percentile with linear interpolation; `None` on an empty sample.
fn percentile_95(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = 0.95 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}
