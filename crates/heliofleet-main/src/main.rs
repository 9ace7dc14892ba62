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

//! HelioFleet batch runner.
//!
//! Thin operational wrapper around the consolidation engine: discover
//! monitoring exports, run one consolidation pass against the persisted
//! snapshot, export the report table, archive consumed files.

mod config;
mod export;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use heliofleet_core::table::InputBatch;
use heliofleet_core::{Diagnostics, InstallationRegistry, run_with_snapshot};

use config::AppConfig;

#[derive(Parser)]
#[command(name = "heliofleet")]
#[command(about = "Consolidate solar fleet monitoring exports and build the site report", long_about = None)]
struct Cli {
    /// Base data directory (monitoring exports, snapshot, outputs)
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Configuration file (defaults to <data-dir>/heliofleet.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compute metrics as of this date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Leave processed monitoring files in place instead of archiving them
    #[arg(long)]
    no_archive: bool,
}

fn main() -> Result<()> {
    // Initialize tracing with env filter support; respects RUST_LOG.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let as_of = cli.as_of.unwrap_or_else(|| chrono::Local::now().date_naive());

    let config = AppConfig::load(cli.config.as_deref(), &cli.data_dir)?;
    let monitoring_dir = config.resolve(&cli.data_dir, &config.paths.monitoring_dir);
    let registry_file = config.resolve(&cli.data_dir, &config.paths.registry_file);
    let snapshot_file = config.resolve(&cli.data_dir, &config.paths.snapshot_file);
    let output_dir = config.resolve(&cli.data_dir, &config.paths.output_dir);
    let archive_dir = config.resolve(&cli.data_dir, &config.paths.archive_dir);

    info!("starting HelioFleet consolidation run");
    info!("   as-of date: {}", as_of);
    info!("   monitoring dir: {}", monitoring_dir.display());
    info!("   registry: {}", registry_file.display());
    info!("   snapshot: {}", snapshot_file.display());

    let registry_batch = read_batch(&registry_file)
        .with_context(|| format!("failed to read registry {}", registry_file.display()))?;
    let registry = InstallationRegistry::load(
        &registry_batch,
        &config.engine.registry,
        config.engine.schema.date_order,
    )?;
    info!(
        sites = registry.len(),
        skipped = registry.report().skipped,
        "loaded installation registry"
    );

    let inputs = discover_inputs(&monitoring_dir)?;
    if inputs.is_empty() {
        info!("no new monitoring files; metrics will run over the existing snapshot");
    }

    let output = run_with_snapshot(
        inputs.iter().map(|(_, batch)| batch.clone()).collect(),
        &snapshot_file,
        &registry,
        as_of,
        &config.engine,
    )?;

    let report_path = output_dir.join(format!("site_report_{}.csv", as_of.format("%Y%m%d")));
    export::write_report_csv(&output.report, &report_path)?;

    if !cli.no_archive {
        archive_processed(&inputs, &output.diagnostics, &archive_dir, as_of)?;
    }

    log_summary(&output.diagnostics, &output.report);
    Ok(())
}

/// Collect monitoring exports in deterministic name order, skipping
/// spreadsheet lock files ("~$...").
fn discover_inputs(monitoring_dir: &Path) -> Result<Vec<(PathBuf, InputBatch)>> {
    if !monitoring_dir.exists() {
        warn!(
            "monitoring directory {} does not exist",
            monitoring_dir.display()
        );
        return Ok(Vec::new());
    }

    let mut inputs = Vec::new();
    for entry in fs::read_dir(monitoring_dir)
        .with_context(|| format!("failed to list {}", monitoring_dir.display()))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("~$") {
            continue;
        }
        if InputBatch::format_for_name(name).is_some() {
            inputs.push((path.clone(), read_batch(&path)?));
        }
    }

    inputs.sort_by(|a, b| a.1.name.cmp(&b.1.name));
    info!(files = inputs.len(), "discovered monitoring exports");
    Ok(inputs)
}

fn read_batch(path: &Path) -> Result<InputBatch> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| path.display().to_string());
    let format = InputBatch::format_for_name(&name)
        .with_context(|| format!("unsupported input format: {name}"))?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(InputBatch::new(name, format, bytes))
}

/// Move successfully processed files out of the monitoring directory so the
/// next upload starts clean. Name collisions in the archive get a date and
/// counter suffix rather than overwriting.
fn archive_processed(
    inputs: &[(PathBuf, InputBatch)],
    diagnostics: &Diagnostics,
    archive_dir: &Path,
    as_of: NaiveDate,
) -> Result<()> {
    let processed: std::collections::BTreeSet<&str> = diagnostics
        .parse_reports
        .iter()
        .map(|report| report.input.as_str())
        .collect();
    if processed.is_empty() {
        return Ok(());
    }

    fs::create_dir_all(archive_dir)
        .with_context(|| format!("failed to create {}", archive_dir.display()))?;

    let mut moved = 0usize;
    for (path, batch) in inputs {
        if !processed.contains(batch.name.as_str()) {
            continue;
        }
        let target = archive_target(archive_dir, &batch.name, as_of);
        match fs::rename(path, &target) {
            Ok(()) => moved += 1,
            Err(e) => warn!(
                input = %batch.name,
                error = %e,
                "failed to archive processed file"
            ),
        }
    }
    info!(moved, "archived processed monitoring files");
    Ok(())
}

fn archive_target(archive_dir: &Path, name: &str, as_of: NaiveDate) -> PathBuf {
    let plain = archive_dir.join(name);
    if !plain.exists() {
        return plain;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };
    let date_tag = as_of.format("%Y%m%d");
    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            archive_dir.join(format!("{stem}_{date_tag}.{ext}"))
        } else {
            archive_dir.join(format!("{stem}_{date_tag}_{counter}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn log_summary(diagnostics: &Diagnostics, report: &heliofleet_core::FleetReport) {
    info!("run summary:");
    info!(
        "   files: {} processed, {} failed",
        diagnostics.files_processed,
        diagnostics.files_failed.len()
    );
    for failed in &diagnostics.files_failed {
        warn!("   failed input {}: {}", failed.input, failed.error);
    }
    info!(
        "   rows: {} accepted, {} skipped",
        diagnostics.rows_accepted, diagnostics.rows_skipped
    );
    info!(
        "   merge: {} inserted, {} overwritten, {} missing preserved",
        diagnostics.merge.inserted,
        diagnostics.merge.overwritten.len(),
        diagnostics.merge.missing_preserved
    );
    if !diagnostics.unresolved_sites.is_empty() {
        warn!(
            "   {} site(s) not in registry: {}",
            diagnostics.unresolved_sites.len(),
            diagnostics.unresolved_sites.join(", ")
        );
    }
    info!(
        "   fleet: {} sites, {:.1} kWp, {:.0} kWh lifetime",
        report.summary.total_sites,
        report.summary.total_capacity_kwp,
        report.summary.total_energy_kwh
    );
    info!(
        "   status: {} nominal, {} degrading, {} offline, {} insufficient data",
        diagnostics.nominal,
        diagnostics.degrading,
        diagnostics.offline,
        diagnostics.insufficient_data
    );
    for producer in &report.top_producers {
        info!(
            "   top producer {}: {:.1} kWh over {} days",
            producer.site_id, producer.total_energy_kwh, producer.days_with_data
        );
    }
}
