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

//! Report assembly: join per-site metrics with registry attributes into one
//! wide record per installation, plus fleet- and group-level aggregates.
//!
//! An incomplete join (metrics without registry attributes, or registry
//! entry without readings) is emitted with explicit `None` markers for the
//! absent side and counted in diagnostics — partial information still
//! renders a useful dashboard row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use heliofleet_types::{Installation, WindowLabel};

use crate::metrics::{DegradationRecord, SiteStatus, WindowMetrics};
use crate::registry::InstallationRegistry;

/// 30-day yield thresholds (kWh/kWp/day) for the performance bands.
const EXCELLENT_YIELD: f64 = 4.5;
const GOOD_YIELD: f64 = 3.5;
const FAIR_YIELD: f64 = 2.5;

/// How many top producers to surface in diagnostics.
const TOP_PRODUCERS: usize = 5;

/// Per-site metric bundle handed to the assembler by the metrics phase.
#[derive(Debug, Clone, Serialize)]
pub struct SiteMetrics {
    pub site_id: String,
    pub windows: Vec<WindowMetrics>,
    pub degradation: DegradationRecord,
    /// Lifetime stats through the as-of date.
    pub days_with_data: u32,
    pub total_energy_kwh: f64,
    pub first_production_date: Option<NaiveDate>,
}

/// One wide report row per installation.
#[derive(Debug, Clone, Serialize)]
pub struct SiteReportRow {
    pub site_id: String,
    /// False when readings exist but the registry has no entry; attribute
    /// fields below are then `None` markers.
    pub registered: bool,
    /// False when the registry lists the site but no readings exist yet.
    pub has_readings: bool,
    pub site_name: Option<String>,
    pub province: Option<String>,
    pub project: Option<String>,
    pub panel_type: Option<String>,
    pub vendor: Option<String>,
    pub capacity_kwp: Option<f64>,
    pub commission_date: Option<NaiveDate>,
    pub first_production_date: Option<NaiveDate>,
    pub days_with_data: u32,
    pub total_energy_kwh: f64,
    pub windows: Vec<WindowMetrics>,
    pub degradation: DegradationRecord,
}

impl SiteReportRow {
    #[must_use]
    pub fn window(&self, label: WindowLabel) -> Option<&WindowMetrics> {
        self.windows.iter().find(|w| w.window == label)
    }

    #[must_use]
    pub fn yield_30d(&self) -> Option<f64> {
        self.window(WindowLabel::Days30).and_then(|w| w.specific_yield)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSummary {
    pub total_sites: usize,
    pub registered_sites: usize,
    pub sites_with_data: usize,
    /// Sites with readings but no registry entry.
    pub unresolved_sites: usize,
    /// Registered sites with no readings yet.
    pub silent_sites: usize,
    pub total_capacity_kwp: f64,
    pub total_energy_kwh: f64,
    /// Capacity-weighted mean specific yields across sites with a numeric
    /// window yield; unweighted mean when no capacity is known.
    pub mean_yield_7d: Option<f64>,
    pub mean_yield_30d: Option<f64>,
    pub mean_yield_90d: Option<f64>,
    pub nominal: usize,
    pub degrading: usize,
    pub offline: usize,
    pub insufficient_data: usize,
}

/// Aggregate over one grouping attribute value.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStat {
    pub key: String,
    pub site_count: usize,
    pub total_capacity_kwp: f64,
    pub mean_yield_30d: Option<f64>,
}

/// Site ids bucketed by 30-day yield, each bucket in site-id order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceBands {
    pub excellent: Vec<String>,
    pub good: Vec<String>,
    pub fair: Vec<String>,
    pub poor: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopProducer {
    pub site_id: String,
    pub total_energy_kwh: f64,
    pub days_with_data: u32,
}

/// Cumulative count of sites by first production date.
#[derive(Debug, Clone, Serialize)]
pub struct CommissioningPoint {
    pub date: NaiveDate,
    pub cumulative_sites: usize,
}

/// The full per-run report artifact.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub as_of: NaiveDate,
    pub rows: Vec<SiteReportRow>,
    pub summary: FleetSummary,
    pub by_province: Vec<GroupStat>,
    pub by_project: Vec<GroupStat>,
    pub by_panel_type: Vec<GroupStat>,
    pub bands: PerformanceBands,
    pub top_producers: Vec<TopProducer>,
    pub commissioning_timeline: Vec<CommissioningPoint>,
}

/// Join site metrics with registry attributes.
///
/// `metrics` must cover the union of store and registry sites (the metrics
/// phase guarantees this); rows come out in `site_id` order.
#[must_use]
pub fn assemble(
    metrics: Vec<SiteMetrics>,
    registry: &InstallationRegistry,
    as_of: NaiveDate,
) -> FleetReport {
    let mut rows: Vec<SiteReportRow> = metrics
        .into_iter()
        .map(|m| {
            let installation = registry.lookup(&m.site_id);
            join_row(m, installation)
        })
        .collect();
    rows.sort_by(|a, b| a.site_id.cmp(&b.site_id));

    let summary = summarize(&rows);
    let bands = band_rows(&rows);
    let by_province = group_stats(&rows, |row| row.province.clone());
    let by_project = group_stats(&rows, |row| row.project.clone());
    let by_panel_type = group_stats(&rows, |row| row.panel_type.clone());
    let top_producers = top_producers(&rows);
    let commissioning_timeline = commissioning_timeline(&rows);

    FleetReport {
        as_of,
        rows,
        summary,
        by_province,
        by_project,
        by_panel_type,
        bands,
        top_producers,
        commissioning_timeline,
    }
}

fn join_row(metrics: SiteMetrics, installation: Option<&Installation>) -> SiteReportRow {
    let has_readings = metrics.days_with_data > 0;
    match installation {
        Some(site) => SiteReportRow {
            site_id: metrics.site_id,
            registered: true,
            has_readings,
            site_name: site.site_name.clone(),
            province: site.province.clone(),
            project: site.project.clone(),
            panel_type: site.panel_type.clone(),
            vendor: site.vendor.clone(),
            capacity_kwp: site.capacity_kwp,
            commission_date: site.commission_date,
            first_production_date: metrics.first_production_date,
            days_with_data: metrics.days_with_data,
            total_energy_kwh: metrics.total_energy_kwh,
            windows: metrics.windows,
            degradation: metrics.degradation,
        },
        None => SiteReportRow {
            site_id: metrics.site_id,
            registered: false,
            has_readings,
            site_name: None,
            province: None,
            project: None,
            panel_type: None,
            vendor: None,
            capacity_kwp: None,
            commission_date: None,
            first_production_date: metrics.first_production_date,
            days_with_data: metrics.days_with_data,
            total_energy_kwh: metrics.total_energy_kwh,
            windows: metrics.windows,
            degradation: metrics.degradation,
        },
    }
}

fn summarize(rows: &[SiteReportRow]) -> FleetSummary {
    let mut summary = FleetSummary {
        total_sites: rows.len(),
        ..FleetSummary::default()
    };

    for row in rows {
        if row.registered {
            summary.registered_sites += 1;
            if !row.has_readings {
                summary.silent_sites += 1;
            }
        } else {
            summary.unresolved_sites += 1;
        }
        if row.has_readings {
            summary.sites_with_data += 1;
        }
        summary.total_capacity_kwp += row.capacity_kwp.unwrap_or(0.0);
        summary.total_energy_kwh += row.total_energy_kwh;

        match row.degradation.status {
            SiteStatus::Nominal => summary.nominal += 1,
            SiteStatus::Degrading => summary.degrading += 1,
            SiteStatus::Offline => summary.offline += 1,
            SiteStatus::InsufficientData => summary.insufficient_data += 1,
        }
    }

    summary.mean_yield_7d = weighted_mean_yield(rows, WindowLabel::Days7);
    summary.mean_yield_30d = weighted_mean_yield(rows, WindowLabel::Days30);
    summary.mean_yield_90d = weighted_mean_yield(rows, WindowLabel::Days90);
    summary
}

/// Capacity-weighted mean over sites reporting a numeric yield for the
/// window; falls back to the unweighted mean when no weights exist.
fn weighted_mean_yield(rows: &[SiteReportRow], label: WindowLabel) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight = 0.0;
    let mut plain_sum = 0.0;
    let mut count = 0usize;

    for row in rows {
        let Some(site_yield) = row.window(label).and_then(|w| w.specific_yield) else {
            continue;
        };
        plain_sum += site_yield;
        count += 1;
        if let Some(capacity) = row.capacity_kwp.filter(|c| *c > 0.0) {
            weighted_sum += site_yield * capacity;
            weight += capacity;
        }
    }

    if weight > 0.0 {
        Some(weighted_sum / weight)
    } else if count > 0 {
        Some(plain_sum / count as f64)
    } else {
        None
    }
}

fn band_rows(rows: &[SiteReportRow]) -> PerformanceBands {
    let mut bands = PerformanceBands::default();
    for row in rows {
        let Some(y) = row.yield_30d() else { continue };
        let bucket = if y > EXCELLENT_YIELD {
            &mut bands.excellent
        } else if y >= GOOD_YIELD {
            &mut bands.good
        } else if y >= FAIR_YIELD {
            &mut bands.fair
        } else {
            &mut bands.poor
        };
        bucket.push(row.site_id.clone());
    }
    bands
}

fn group_stats(
    rows: &[SiteReportRow],
    key: impl Fn(&SiteReportRow) -> Option<String>,
) -> Vec<GroupStat> {
    let mut groups: BTreeMap<String, (usize, f64, f64, usize)> = BTreeMap::new();
    for row in rows {
        // Unregistered rows carry no grouping attributes; they are excluded
        // rather than lumped into a fake bucket.
        let Some(group) = key(row) else { continue };
        let entry = groups.entry(group).or_insert((0, 0.0, 0.0, 0));
        entry.0 += 1;
        entry.1 += row.capacity_kwp.unwrap_or(0.0);
        if let Some(y) = row.yield_30d() {
            entry.2 += y;
            entry.3 += 1;
        }
    }

    let mut stats: Vec<GroupStat> = groups
        .into_iter()
        .map(|(key, (site_count, total_capacity_kwp, yield_sum, yield_count))| GroupStat {
            key,
            site_count,
            total_capacity_kwp,
            mean_yield_30d: (yield_count > 0).then(|| yield_sum / yield_count as f64),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.mean_yield_30d
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&a.mean_yield_30d.unwrap_or(f64::NEG_INFINITY))
            .then_with(|| a.key.cmp(&b.key))
    });
    stats
}

fn top_producers(rows: &[SiteReportRow]) -> Vec<TopProducer> {
    let mut producers: Vec<TopProducer> = rows
        .iter()
        .filter(|row| row.total_energy_kwh > 0.0)
        .map(|row| TopProducer {
            site_id: row.site_id.clone(),
            total_energy_kwh: row.total_energy_kwh,
            days_with_data: row.days_with_data,
        })
        .collect();
    producers.sort_by(|a, b| {
        b.total_energy_kwh
            .total_cmp(&a.total_energy_kwh)
            .then_with(|| a.site_id.cmp(&b.site_id))
    });
    producers.truncate(TOP_PRODUCERS);
    producers
}

fn commissioning_timeline(rows: &[SiteReportRow]) -> Vec<CommissioningPoint> {
    let mut per_date: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for row in rows {
        if let Some(first) = row.first_production_date {
            *per_date.entry(first).or_insert(0) += 1;
        }
    }

    let mut cumulative = 0;
    per_date
        .into_iter()
        .map(|(date, count)| {
            cumulative += count;
            CommissioningPoint {
                date,
                cumulative_sites: cumulative,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use heliofleet_types::Installation;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn nominal() -> DegradationRecord {
        DegradationRecord {
            status: SiteStatus::Nominal,
            age_years: Some(2.0),
            expected_pct: Some(1.9),
            observed_pct: Some(1.0),
            rate_pct_per_year: Some(0.5),
        }
    }

    fn window_30d(specific_yield: Option<f64>) -> WindowMetrics {
        WindowMetrics {
            window: WindowLabel::Days30,
            energy_kwh: 0.0,
            sample_days: 30,
            window_days: 30,
            coverage_ratio: 1.0,
            specific_yield,
            insufficient: specific_yield.is_none(),
        }
    }

    fn site_metrics(site_id: &str, yield_30d: Option<f64>, total: f64) -> SiteMetrics {
        SiteMetrics {
            site_id: site_id.to_owned(),
            windows: vec![window_30d(yield_30d)],
            degradation: nominal(),
            days_with_data: if total > 0.0 { 30 } else { 0 },
            total_energy_kwh: total,
            first_production_date: (total > 0.0).then(|| date(1)),
        }
    }

    fn registry() -> InstallationRegistry {
        let mut a = Installation::with_capacity("A1", 10.0);
        a.province = Some("Kericho".to_owned());
        let mut b = Installation::with_capacity("B2", 30.0);
        b.province = Some("Nandi".to_owned());
        let c = Installation::with_capacity("C3", 5.0);
        InstallationRegistry::from_installations([a, b, c])
    }

    #[test]
    fn test_unregistered_site_gets_null_markers_not_dropped() {
        let metrics = vec![site_metrics("A1", Some(4.0), 1200.0), site_metrics("X99", None, 300.0)];
        let report = assemble(metrics, &registry(), date(30));

        let x99 = report.rows.iter().find(|r| r.site_id == "X99").unwrap();
        assert!(!x99.registered);
        assert!(x99.capacity_kwp.is_none());
        assert!(x99.province.is_none());
        assert_eq!(x99.yield_30d(), None);
        assert_eq!(report.summary.unresolved_sites, 1);
    }

    #[test]
    fn test_registered_site_without_readings_kept_as_silent() {
        let metrics = vec![site_metrics("A1", Some(4.0), 1200.0), site_metrics("C3", None, 0.0)];
        let report = assemble(metrics, &registry(), date(30));

        let c3 = report.rows.iter().find(|r| r.site_id == "C3").unwrap();
        assert!(c3.registered);
        assert!(!c3.has_readings);
        assert_eq!(report.summary.silent_sites, 1);
    }

    #[test]
    fn test_capacity_weighted_fleet_yield() {
        // A1: 4.0 at 10 kWp, B2: 3.0 at 30 kWp -> (40 + 90) / 40 = 3.25.
        let metrics = vec![site_metrics("A1", Some(4.0), 1200.0), site_metrics("B2", Some(3.0), 2700.0)];
        let report = assemble(metrics, &registry(), date(30));

        let weighted = report.summary.mean_yield_30d.unwrap();
        assert!((weighted - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_performance_bands() {
        let metrics = vec![
            site_metrics("A1", Some(5.0), 100.0),
            site_metrics("B2", Some(3.8), 100.0),
            site_metrics("C3", Some(2.9), 100.0),
            site_metrics("D4", Some(1.0), 100.0),
            site_metrics("E5", None, 100.0),
        ];
        let report = assemble(metrics, &registry(), date(30));

        assert_eq!(report.bands.excellent, vec!["A1"]);
        assert_eq!(report.bands.good, vec!["B2"]);
        assert_eq!(report.bands.fair, vec!["C3"]);
        assert_eq!(report.bands.poor, vec!["D4"]);
    }

    #[test]
    fn test_group_stats_sorted_by_yield() {
        let metrics = vec![site_metrics("A1", Some(2.0), 100.0), site_metrics("B2", Some(4.0), 100.0)];
        let report = assemble(metrics, &registry(), date(30));

        assert_eq!(report.by_province.len(), 2);
        assert_eq!(report.by_province[0].key, "Nandi");
        assert!((report.by_province[0].mean_yield_30d.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_sorted_and_timeline_cumulative() {
        let mut m1 = site_metrics("B2", Some(3.0), 100.0);
        m1.first_production_date = Some(date(5));
        let mut m2 = site_metrics("A1", Some(3.0), 100.0);
        m2.first_production_date = Some(date(2));
        let report = assemble(vec![m1, m2], &registry(), date(30));

        assert_eq!(report.rows[0].site_id, "A1");
        assert_eq!(report.commissioning_timeline.len(), 2);
        assert_eq!(report.commissioning_timeline[1].cumulative_sites, 2);
    }

    #[test]
    fn test_top_producers_ordering() {
        let metrics = vec![
            site_metrics("A1", Some(3.0), 500.0),
            site_metrics("B2", Some(3.0), 900.0),
            site_metrics("C3", Some(3.0), 0.0),
        ];
        let report = assemble(metrics, &registry(), date(30));

        assert_eq!(report.top_producers.len(), 2);
        assert_eq!(report.top_producers[0].site_id, "B2");
    }
}
