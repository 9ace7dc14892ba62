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

//! Rolling-window specific yield.
//!
//! The yield denominator is the number of days with a present reading, not
//! the window length: missing days are never averaged as zero. A window
//! whose coverage falls below the configured minimum reports
//! insufficient-data instead of extrapolating from a sparse sample.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use heliofleet_types::{MetricsConfig, WindowLabel};

use crate::store::SiteHistory;

/// Yield metrics for one site over one window ending at the as-of date.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMetrics {
    pub window: WindowLabel,
    /// Sum of present readings inside the window.
    pub energy_kwh: f64,
    /// Days with a present (possibly zero) reading.
    pub sample_days: u32,
    /// Window length in days; for all-time, the span from the first present
    /// reading through the as-of date.
    pub window_days: u32,
    pub coverage_ratio: f64,
    /// kWh/kWp/day. `None` when coverage is insufficient or the site has no
    /// usable capacity.
    pub specific_yield: Option<f64>,
    /// Coverage below the configured minimum; no numeric yield is claimed.
    pub insufficient: bool,
}

/// Compute all four windows for one site.
#[must_use]
pub fn compute_windows(
    history: &SiteHistory,
    capacity_kwp: Option<f64>,
    as_of: NaiveDate,
    config: &MetricsConfig,
) -> Vec<WindowMetrics> {
    WindowLabel::ALL
        .iter()
        .map(|window| compute_window(history, capacity_kwp, as_of, *window, config))
        .collect()
}

fn compute_window(
    history: &SiteHistory,
    capacity_kwp: Option<f64>,
    as_of: NaiveDate,
    window: WindowLabel,
    config: &MetricsConfig,
) -> WindowMetrics {
    let start = match window.days() {
        Some(days) => as_of - Duration::days(i64::from(days) - 1),
        // All-time spans from the first present reading.
        None => match first_present_date(history, as_of) {
            Some(first) => first,
            None => {
                return WindowMetrics {
                    window,
                    energy_kwh: 0.0,
                    sample_days: 0,
                    window_days: 0,
                    coverage_ratio: 0.0,
                    specific_yield: None,
                    insufficient: true,
                };
            }
        },
    };
    let window_days = u32::try_from((as_of - start).num_days() + 1).unwrap_or(0);

    let mut energy_kwh = 0.0;
    let mut sample_days = 0u32;
    for (_, value) in history.range(start..=as_of) {
        if let Some(kwh) = value.as_kwh() {
            energy_kwh += kwh;
            sample_days += 1;
        }
    }

    let coverage_ratio = if window_days == 0 {
        0.0
    } else {
        f64::from(sample_days) / f64::from(window_days)
    };
    let insufficient = sample_days == 0 || coverage_ratio < config.min_coverage_ratio;

    let specific_yield = match capacity_kwp {
        Some(capacity) if capacity > 0.0 && !insufficient => {
            Some(energy_kwh / capacity / f64::from(sample_days))
        }
        _ => None,
    };

    WindowMetrics {
        window,
        energy_kwh,
        sample_days,
        window_days,
        coverage_ratio,
        specific_yield,
        insufficient,
    }
}

/// First date on or before `as_of` with a present reading.
pub(crate) fn first_present_date(history: &SiteHistory, as_of: NaiveDate) -> Option<NaiveDate> {
    history
        .range(..=as_of)
        .find(|(_, value)| !value.is_missing())
        .map(|(date, _)| *date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heliofleet_types::EnergyValue;
    use std::collections::BTreeMap;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn history(values: &[(u32, Option<f64>)]) -> SiteHistory {
        values
            .iter()
            .map(|(d, v)| {
                (
                    date(*d),
                    v.map_or(EnergyValue::Missing, EnergyValue::Kwh),
                )
            })
            .collect::<BTreeMap<_, _>>()
    }

    fn window(metrics: &[WindowMetrics], label: WindowLabel) -> &WindowMetrics {
        metrics.iter().find(|m| m.window == label).unwrap()
    }

    #[test]
    fn test_seven_day_yield_counts_zero_as_present() {
        // 400+420+410+0+430+415+405 = 2880 kWh over 7 present days at 100 kWp.
        let history = history(&[
            (1, Some(400.0)),
            (2, Some(420.0)),
            (3, Some(410.0)),
            (4, Some(0.0)),
            (5, Some(430.0)),
            (6, Some(415.0)),
            (7, Some(405.0)),
        ]);
        let metrics = compute_windows(&history, Some(100.0), date(7), &MetricsConfig::default());
        let w7 = window(&metrics, WindowLabel::Days7);

        assert_eq!(w7.sample_days, 7);
        assert!((w7.coverage_ratio - 1.0).abs() < 1e-9);
        let yield_7d = w7.specific_yield.unwrap();
        assert!((yield_7d - 2880.0 / 100.0 / 7.0).abs() < 1e-9);
        assert!((yield_7d - 4.114).abs() < 0.001);
        assert!(!w7.insufficient);
    }

    #[test]
    fn test_sparse_window_reports_insufficient_data() {
        // 10 of 30 days present: coverage 33% is below the 50% default.
        let values: Vec<(u32, Option<f64>)> = (1..=10).map(|d| (d, Some(20.0))).collect();
        let history = history(&values);
        let metrics = compute_windows(&history, Some(10.0), date(30), &MetricsConfig::default());
        let w30 = window(&metrics, WindowLabel::Days30);

        assert_eq!(w30.sample_days, 10);
        assert!(w30.insufficient);
        assert_eq!(w30.specific_yield, None);
        // The raw energy sum is still reported for diagnostics.
        assert!((w30.energy_kwh - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_days_are_not_zeroed() {
        // 4 of 7 days present at a steady 10 kWh: the yield must divide by
        // 4 present days, not 7.
        let history = history(&[
            (1, Some(10.0)),
            (2, None),
            (3, Some(10.0)),
            (4, None),
            (5, Some(10.0)),
            (7, Some(10.0)),
        ]);
        let metrics = compute_windows(&history, Some(1.0), date(7), &MetricsConfig::default());
        let w7 = window(&metrics, WindowLabel::Days7);

        assert_eq!(w7.sample_days, 4);
        assert!((w7.specific_yield.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_time_spans_from_first_present_reading() {
        let history = history(&[(2, None), (5, Some(10.0)), (10, Some(12.0)), (15, Some(14.0))]);
        let config = MetricsConfig {
            min_coverage_ratio: 0.2,
            ..MetricsConfig::default()
        };
        let metrics = compute_windows(&history, Some(1.0), date(15), &config);
        let all = window(&metrics, WindowLabel::AllTime);

        // Span is 5th..=15th: 11 days, 3 samples.
        assert_eq!(all.window_days, 11);
        assert_eq!(all.sample_days, 3);
        assert!((all.energy_kwh - 36.0).abs() < 1e-9);
        assert!((all.specific_yield.unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_capacity_means_no_yield() {
        let history = history(&[(1, Some(10.0)), (2, Some(10.0)), (3, Some(10.0))]);
        let metrics = compute_windows(&history, None, date(3), &MetricsConfig::default());
        for m in &metrics {
            assert_eq!(m.specific_yield, None);
        }
        // Coverage itself is still measured.
        assert!(!window(&metrics, WindowLabel::AllTime).insufficient);
    }

    #[test]
    fn test_empty_history_is_insufficient_everywhere() {
        let metrics = compute_windows(
            &SiteHistory::new(),
            Some(10.0),
            date(30),
            &MetricsConfig::default(),
        );
        assert!(metrics.iter().all(|m| m.insufficient));
        assert!(metrics.iter().all(|m| m.specific_yield.is_none()));
    }

    #[test]
    fn test_readings_after_as_of_are_ignored() {
        let history = history(&[(1, Some(10.0)), (2, Some(10.0)), (20, Some(99.0))]);
        let config = MetricsConfig {
            min_coverage_ratio: 0.5,
            ..MetricsConfig::default()
        };
        let metrics = compute_windows(&history, Some(1.0), date(2), &config);
        let all = window(&metrics, WindowLabel::AllTime);
        assert_eq!(all.sample_days, 2);
        assert!((all.energy_kwh - 20.0).abs() < 1e-9);
    }
}
