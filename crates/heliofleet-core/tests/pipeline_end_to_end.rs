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

//! End-to-end runs against a persisted snapshot: daily re-runs with
//! overlapping batches must never lose, duplicate or corrupt history.

use chrono::NaiveDate;

use heliofleet_core::table::{InputBatch, InputFormat};
use heliofleet_core::{HistoryStore, InstallationRegistry, run_with_snapshot};
use heliofleet_types::{EngineConfig, Installation, WindowLabel};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn monitoring_csv(rows: &[(&str, &str, &str)]) -> String {
    let mut csv = String::from(
        "Vendor Monitoring Export,,\n,,\nSite,Date,Solar Supply (kWh)\n",
    );
    for (site, day, kwh) in rows {
        csv.push_str(&format!("{site},{day},{kwh}\n"));
    }
    csv
}

fn batch(name: &str, csv: String) -> InputBatch {
    InputBatch::new(name, InputFormat::Csv, csv.into_bytes())
}

fn registry() -> InstallationRegistry {
    let mut s1 = Installation::with_capacity("S1", 100.0);
    s1.province = Some("Kericho".to_owned());
    s1.project = Some("Health".to_owned());
    InstallationRegistry::from_installations([s1])
}

#[test]
fn daily_rerun_with_overlapping_batch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("history.json");
    let config = EngineConfig::default();
    let as_of = date(2025, 6, 7);

    let week = monitoring_csv(&[
        ("S1", "2025-06-01", "400"),
        ("S1", "2025-06-02", "420"),
        ("S1", "2025-06-03", "410"),
        ("S1", "2025-06-04", "0"),
        ("S1", "2025-06-05", "430"),
        ("S1", "2025-06-06", "415"),
        ("S1", "2025-06-07", "405"),
    ]);

    // Day one: cold start.
    let first = run_with_snapshot(
        vec![batch("week1.csv", week.clone())],
        &snapshot,
        &registry(),
        as_of,
        &config,
    )
    .unwrap();
    assert_eq!(first.diagnostics.merge.inserted, 7);

    let row = &first.report.rows[0];
    let w7 = row.window(WindowLabel::Days7).unwrap();
    assert!((w7.specific_yield.unwrap() - 2880.0 / 100.0 / 7.0).abs() < 1e-9);
    assert!((w7.coverage_ratio - 1.0).abs() < 1e-9);

    // Day two: the same file re-uploaded. Nothing may change.
    let second = run_with_snapshot(
        vec![batch("week1.csv", week)],
        &snapshot,
        &registry(),
        as_of,
        &config,
    )
    .unwrap();

    assert_eq!(second.diagnostics.merge.inserted, 0);
    assert!(second.diagnostics.merge.overwritten.is_empty());
    assert_eq!(second.store, first.store);
    assert_eq!(second.store.len(), 7);
}

#[test]
fn corrected_batch_overwrites_with_audit_and_missing_is_non_destructive() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("history.json");
    let config = EngineConfig::default();
    let as_of = date(2025, 6, 3);

    let original = monitoring_csv(&[
        ("S1", "2025-06-01", "400"),
        ("S1", "2025-06-02", "420"),
    ]);
    run_with_snapshot(
        vec![batch("a.csv", original)],
        &snapshot,
        &registry(),
        as_of,
        &config,
    )
    .unwrap();

    // A corrected re-upload: one value revised, one reported as no-data.
    let corrected = monitoring_csv(&[
        ("S1", "2025-06-01", "405"),
        ("S1", "2025-06-02", "N/A"),
        ("S1", "2025-06-03", "410"),
    ]);
    let output = run_with_snapshot(
        vec![batch("b.csv", corrected)],
        &snapshot,
        &registry(),
        as_of,
        &config,
    )
    .unwrap();

    assert_eq!(output.diagnostics.merge.inserted, 1);
    assert_eq!(output.diagnostics.merge.overwritten.len(), 1);
    assert_eq!(output.diagnostics.merge.overwritten[0].date, date(2025, 6, 1));
    // The stored 420 survived the incoming "N/A".
    assert_eq!(output.diagnostics.merge.missing_preserved, 1);

    // And the snapshot on disk reflects exactly that.
    let reloaded = HistoryStore::load(&snapshot).unwrap();
    assert_eq!(reloaded, output.store);
    assert_eq!(reloaded.len(), 3);
}

#[test]
fn partial_failure_still_produces_report_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("history.json");

    let good = batch(
        "good.csv",
        monitoring_csv(&[("S1", "2025-06-01", "400"), ("X99", "2025-06-01", "55")]),
    );
    let headerless = InputBatch::new(
        "broken.csv",
        InputFormat::Csv,
        b"no,usable,header\n1,2,3\n".to_vec(),
    );

    let output = run_with_snapshot(
        vec![good, headerless],
        &snapshot,
        &registry(),
        date(2025, 6, 7),
        &EngineConfig::default(),
    )
    .unwrap();

    assert_eq!(output.diagnostics.files_processed, 1);
    assert_eq!(output.diagnostics.files_failed.len(), 1);
    assert_eq!(output.diagnostics.unresolved_sites, vec!["X99"]);
    assert!(snapshot.exists());

    // X99 is in the store and in the report, with null attribute markers
    // and no per-kWp numbers.
    assert!(output.store.site_history("X99").is_some());
    let x99 = output.report.rows.iter().find(|r| r.site_id == "X99").unwrap();
    assert!(!x99.registered);
    assert!(x99.capacity_kwp.is_none());
    assert!(x99.windows.iter().all(|w| w.specific_yield.is_none()));
}
