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

//! CSV export of the wide per-installation report table.
//!
//! Downstream rendering collaborators (spreadsheet, dashboard) consume this
//! artifact; the engine itself never formats for display.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use heliofleet_core::FleetReport;
use heliofleet_types::WindowLabel;

pub fn write_report_csv(report: &FleetReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create report at {}", path.display()))?;

    let mut header = vec![
        "site_id".to_owned(),
        "site_name".to_owned(),
        "registered".to_owned(),
        "province".to_owned(),
        "project".to_owned(),
        "panel_type".to_owned(),
        "vendor".to_owned(),
        "capacity_kwp".to_owned(),
        "commission_date".to_owned(),
        "first_production_date".to_owned(),
        "days_with_data".to_owned(),
        "total_energy_kwh".to_owned(),
    ];
    for window in WindowLabel::ALL {
        header.push(format!("energy_kwh_{window}"));
        header.push(format!("yield_{window}"));
        header.push(format!("coverage_{window}"));
    }
    header.extend(
        [
            "status",
            "age_years",
            "expected_degradation_pct",
            "observed_degradation_pct",
            "degradation_rate_pct_per_year",
        ]
        .map(str::to_owned),
    );
    writer.write_record(&header)?;

    for row in &report.rows {
        let mut record = vec![
            row.site_id.clone(),
            row.site_name.clone().unwrap_or_default(),
            row.registered.to_string(),
            row.province.clone().unwrap_or_default(),
            row.project.clone().unwrap_or_default(),
            row.panel_type.clone().unwrap_or_default(),
            row.vendor.clone().unwrap_or_default(),
            opt_number(row.capacity_kwp, 2),
            row.commission_date.map(|d| d.to_string()).unwrap_or_default(),
            row.first_production_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            row.days_with_data.to_string(),
            format!("{:.1}", row.total_energy_kwh),
        ];
        for window in WindowLabel::ALL {
            match row.window(window) {
                Some(w) => {
                    record.push(format!("{:.1}", w.energy_kwh));
                    record.push(opt_number(w.specific_yield, 3));
                    record.push(format!("{:.2}", w.coverage_ratio));
                }
                None => record.extend([String::new(), String::new(), String::new()]),
            }
        }
        record.push(row.degradation.status.to_string());
        record.push(opt_number(row.degradation.age_years, 2));
        record.push(opt_number(row.degradation.expected_pct, 2));
        record.push(opt_number(row.degradation.observed_pct, 2));
        record.push(opt_number(row.degradation.rate_pct_per_year, 2));

        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!(
        rows = report.rows.len(),
        "wrote site report to {}",
        path.display()
    );
    Ok(())
}

/// Empty string for absent values: explicit null markers, not zeros.
fn opt_number(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.decimals$}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use heliofleet_core::table::{InputBatch, InputFormat};
    use heliofleet_core::{HistoryStore, InstallationRegistry, run};
    use heliofleet_types::{EngineConfig, Installation};

    #[test]
    fn test_report_csv_shape() {
        let csv_body =
            "Site,Date,Solar Supply (kWh)\nS1,2025-06-01,400\nS1,2025-06-02,410\nX99,2025-06-01,5\n";
        let output = run(
            vec![InputBatch::new(
                "a.csv",
                InputFormat::Csv,
                csv_body.as_bytes().to_vec(),
            )],
            HistoryStore::new(),
            &InstallationRegistry::from_installations([Installation::with_capacity("S1", 100.0)]),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            &EngineConfig::default(),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_report_csv(&output.report, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("site_id,site_name,registered"));
        assert!(header.contains("yield_30d"));
        assert!(header.contains("status"));

        // One row per site, S1 before X99, X99 with null markers.
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("S1,"));
        assert!(rows[1].starts_with("X99,,false"));
    }
}
