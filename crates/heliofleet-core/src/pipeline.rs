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

//! Run orchestration.
//!
//! One run is: normalize inputs (parallel) -> merge into the historical
//! store in ascending input-name order -> persist -> metrics (parallel per
//! site) -> assemble the report. The merge is the single serialization
//! point; metrics never start before the snapshot is durable.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use heliofleet_types::{EngineConfig, Reading};

use crate::error::Result;
use crate::metrics::{assess_site, compute_windows};
use crate::registry::{InstallationRegistry, RegistryReport};
use crate::report::{FleetReport, SiteMetrics, assemble};
use crate::schema::{ParseReport, normalize_table};
use crate::store::{HistoryStore, MergeReport};
use crate::table::{InputBatch, RawTable};

/// An input file that failed at the batch level (unreadable bytes or no
/// usable header). Row-level problems live in the parse reports instead.
#[derive(Debug, Clone, Serialize)]
pub struct FailedInput {
    pub input: String,
    pub error: String,
}

/// Everything an operator needs to judge a run, produced even on partial
/// failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub files_processed: usize,
    pub files_failed: Vec<FailedInput>,
    pub parse_reports: Vec<ParseReport>,
    pub rows_accepted: usize,
    pub rows_skipped: usize,
    pub merge: MergeReport,
    pub registry: RegistryReport,
    /// Sites with readings but no registry entry, in site-id order.
    pub unresolved_sites: Vec<String>,
    pub nominal: usize,
    pub degrading: usize,
    pub offline: usize,
    pub insufficient_data: usize,
}

/// Result of one consolidation run.
#[derive(Debug)]
pub struct RunOutput {
    pub store: HistoryStore,
    pub report: FleetReport,
    pub diagnostics: Diagnostics,
}

/// Run the engine purely in memory: the caller owns snapshot persistence.
///
/// The prior store is consumed and returned merged; a batch-level input
/// failure never aborts the run, it is surfaced in the diagnostics.
#[must_use]
pub fn run(
    inputs: Vec<InputBatch>,
    prior_store: HistoryStore,
    registry: &InstallationRegistry,
    as_of: NaiveDate,
    config: &EngineConfig,
) -> RunOutput {
    let mut store = prior_store;
    let diagnostics = merge_phase(inputs, &mut store, config);
    metrics_phase(store, registry, as_of, config, diagnostics)
}

/// Run against a persisted snapshot: load, merge, persist, then metrics.
///
/// Persistence failure aborts before the metrics phase; the prior snapshot
/// on disk stays authoritative and no success is reported.
pub fn run_with_snapshot(
    inputs: Vec<InputBatch>,
    snapshot_path: &Path,
    registry: &InstallationRegistry,
    as_of: NaiveDate,
    config: &EngineConfig,
) -> Result<RunOutput> {
    let mut store = HistoryStore::load(snapshot_path)?;
    let diagnostics = merge_phase(inputs, &mut store, config);

    // Phase barrier: the merged store must be durable before any metric is
    // derived from it.
    store.save(snapshot_path)?;

    Ok(metrics_phase(store, registry, as_of, config, diagnostics))
}

/// Normalize all inputs in parallel, then merge in ascending input-name
/// order so the conflict policy is reproducible regardless of worker
/// completion order.
fn merge_phase(
    mut inputs: Vec<InputBatch>,
    store: &mut HistoryStore,
    config: &EngineConfig,
) -> Diagnostics {
    inputs.sort_by(|a, b| a.name.cmp(&b.name));
    info!(files = inputs.len(), "normalizing input batches");

    let parsed: Vec<std::result::Result<(Vec<Reading>, ParseReport), FailedInput>> = inputs
        .par_iter()
        .map(|batch| {
            RawTable::from_batch(batch)
                .and_then(|table| normalize_table(&table, &config.schema, &batch.name))
                .map_err(|e| FailedInput {
                    input: batch.name.clone(),
                    error: e.to_string(),
                })
        })
        .collect();

    let mut diagnostics = Diagnostics::default();
    for outcome in parsed {
        match outcome {
            Ok((readings, report)) => {
                diagnostics.files_processed += 1;
                diagnostics.rows_accepted += report.accepted;
                diagnostics.rows_skipped += report.skipped;
                diagnostics.parse_reports.push(report);

                let merge = store.merge(readings);
                diagnostics.merge.inserted += merge.inserted;
                diagnostics.merge.unchanged += merge.unchanged;
                diagnostics.merge.missing_preserved += merge.missing_preserved;
                diagnostics.merge.overwritten.extend(merge.overwritten);
            }
            Err(failed) => {
                warn!(input = %failed.input, error = %failed.error, "input batch failed");
                diagnostics.files_failed.push(failed);
            }
        }
    }

    info!(
        processed = diagnostics.files_processed,
        failed = diagnostics.files_failed.len(),
        inserted = diagnostics.merge.inserted,
        overwritten = diagnostics.merge.overwritten.len(),
        "merge phase complete"
    );
    diagnostics
}

/// Compute per-site metrics over the immutable merged store and join with
/// the registry. Parallel across sites; output order is fixed by site id.
fn metrics_phase(
    store: HistoryStore,
    registry: &InstallationRegistry,
    as_of: NaiveDate,
    config: &EngineConfig,
    mut diagnostics: Diagnostics,
) -> RunOutput {
    // Every site known to either side gets a row, in site-id order.
    let site_ids: Vec<String> = store
        .site_ids()
        .chain(registry.site_ids())
        .map(str::to_owned)
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    info!(sites = site_ids.len(), %as_of, "computing site metrics");

    let metrics: Vec<SiteMetrics> = site_ids
        .par_iter()
        .map(|site_id| site_metrics(site_id, &store, registry, as_of, config))
        .collect();

    let report = assemble(metrics, registry, as_of);

    diagnostics.registry = registry.report().clone();
    diagnostics.unresolved_sites = store
        .site_ids()
        .filter(|id| registry.lookup(id).is_none())
        .map(str::to_owned)
        .collect();
    diagnostics.nominal = report.summary.nominal;
    diagnostics.degrading = report.summary.degrading;
    diagnostics.offline = report.summary.offline;
    diagnostics.insufficient_data = report.summary.insufficient_data;

    RunOutput {
        store,
        report,
        diagnostics,
    }
}

fn site_metrics(
    site_id: &str,
    store: &HistoryStore,
    registry: &InstallationRegistry,
    as_of: NaiveDate,
    config: &EngineConfig,
) -> SiteMetrics {
    let installation = registry.lookup(site_id);
    let capacity = installation.and_then(|site| site.capacity_kwp);
    let commission = installation.and_then(|site| site.commission_date);
    let history = store.site_history(site_id);

    let empty = crate::store::SiteHistory::new();
    let windows = compute_windows(history.unwrap_or(&empty), capacity, as_of, &config.metrics);
    let degradation = assess_site(history, capacity, commission, as_of, &config.metrics);

    let mut days_with_data = 0u32;
    let mut total_energy_kwh = 0.0;
    let mut first_production_date = None;
    if let Some(history) = history {
        for (date, value) in history.range(..=as_of) {
            if let Some(kwh) = value.as_kwh() {
                days_with_data += 1;
                total_energy_kwh += kwh;
                if first_production_date.is_none() && kwh > 0.0 {
                    first_production_date = Some(*date);
                }
            }
        }
    }

    SiteMetrics {
        site_id: site_id.to_owned(),
        windows,
        degradation,
        days_with_data,
        total_energy_kwh,
        first_production_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::InputFormat;
    use heliofleet_types::{EnergyValue, Installation, WindowLabel};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn csv_batch(name: &str, body: &str) -> InputBatch {
        let mut csv = String::from("Site,Date,Solar Supply (kWh)\n");
        csv.push_str(body);
        InputBatch::new(name, InputFormat::Csv, csv.into_bytes())
    }

    fn registry_100kwp(site_id: &str) -> InstallationRegistry {
        InstallationRegistry::from_installations([Installation::with_capacity(site_id, 100.0)])
    }

    #[test]
    fn test_end_to_end_seven_day_yield() {
        let body = "S1,2025-06-01,400\nS1,2025-06-02,420\nS1,2025-06-03,410\n\
                    S1,2025-06-04,0\nS1,2025-06-05,430\nS1,2025-06-06,415\nS1,2025-06-07,405\n";
        let output = run(
            vec![csv_batch("week.csv", body)],
            HistoryStore::new(),
            &registry_100kwp("S1"),
            date(7),
            &EngineConfig::default(),
        );

        assert_eq!(output.store.len(), 7);
        let row = &output.report.rows[0];
        let w7 = row.window(WindowLabel::Days7).unwrap();
        assert!((w7.specific_yield.unwrap() - 4.114).abs() < 0.001);
        assert!((w7.coverage_ratio - 1.0).abs() < 1e-9);
        // Too young for a degradation verdict, but certainly not offline:
        // D4's zero is a genuine reading inside a producing week.
        assert_ne!(
            row.degradation.status,
            crate::metrics::SiteStatus::Offline
        );
    }

    #[test]
    fn test_failed_input_does_not_abort_run() {
        let good = csv_batch("b_good.csv", "S1,2025-06-01,10\n");
        let bad = InputBatch::new("a_bad.csv", InputFormat::Csv, b"x,y\n1,2\n".to_vec());

        let output = run(
            vec![good, bad],
            HistoryStore::new(),
            &registry_100kwp("S1"),
            date(7),
            &EngineConfig::default(),
        );

        assert_eq!(output.diagnostics.files_processed, 1);
        assert_eq!(output.diagnostics.files_failed.len(), 1);
        assert_eq!(output.diagnostics.files_failed[0].input, "a_bad.csv");
        assert_eq!(output.store.len(), 1);
    }

    #[test]
    fn test_overlapping_batches_merge_in_name_order() {
        // Same key in both files; "b_later.csv" must win regardless of the
        // order the batches were handed in.
        let earlier = csv_batch("a_earlier.csv", "S1,2025-06-01,10\n");
        let later = csv_batch("b_later.csv", "S1,2025-06-01,12\n");

        let output = run(
            vec![later, earlier],
            HistoryStore::new(),
            &registry_100kwp("S1"),
            date(7),
            &EngineConfig::default(),
        );

        assert_eq!(
            output.store.site_history("S1").unwrap()[&date(1)],
            EnergyValue::Kwh(12.0)
        );
        assert_eq!(output.diagnostics.merge.overwritten.len(), 1);
    }

    #[test]
    fn test_unresolved_site_surfaces_in_diagnostics() {
        let output = run(
            vec![csv_batch("x.csv", "X99,2025-06-01,10\n")],
            HistoryStore::new(),
            &registry_100kwp("S1"),
            date(7),
            &EngineConfig::default(),
        );

        assert_eq!(output.diagnostics.unresolved_sites, vec!["X99"]);
        let x99 = output.report.rows.iter().find(|r| r.site_id == "X99").unwrap();
        assert!(!x99.registered);
        assert!(x99.windows.iter().all(|w| w.specific_yield.is_none()));
        // The reading is retained in the store for future registry updates.
        assert_eq!(output.store.site_history("X99").unwrap().len(), 1);
    }

    #[test]
    fn test_registered_site_without_readings_gets_a_row() {
        let output = run(
            Vec::new(),
            HistoryStore::new(),
            &registry_100kwp("S1"),
            date(7),
            &EngineConfig::default(),
        );

        assert_eq!(output.report.rows.len(), 1);
        assert!(!output.report.rows[0].has_readings);
        assert_eq!(
            output.report.rows[0].degradation.status,
            crate::metrics::SiteStatus::InsufficientData
        );
    }
}
