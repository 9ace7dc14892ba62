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

//! Installation registry: static per-site metadata, loaded once per run.
//!
//! A partial registry is preferable to none — dashboards should still render
//! for unaffected installations — so a malformed row is skipped with a
//! diagnostic while a wholly unusable source is a hard error.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use heliofleet_types::{DateOrder, Installation, RegistryColumns};

use crate::error::{EngineError, Result};
use crate::schema::parse_date_cell;
use crate::table::{Cell, InputBatch, RawTable};

/// Immutable site metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct InstallationRegistry {
    sites: BTreeMap<String, Installation>,
    report: RegistryReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryReport {
    pub loaded: usize,
    /// Rows without a usable site id.
    pub skipped: usize,
    /// Rows kept without a usable nameplate capacity; these sites get no
    /// per-kWp metrics.
    pub without_capacity: usize,
}

impl InstallationRegistry {
    /// Build a registry directly from installations (tests, embedders).
    #[must_use]
    pub fn from_installations(installations: impl IntoIterator<Item = Installation>) -> Self {
        let mut sites = BTreeMap::new();
        let mut without_capacity = 0;
        for site in installations {
            if site.capacity_kwp.is_none() {
                without_capacity += 1;
            }
            sites.insert(site.site_id.clone(), site);
        }
        let loaded = sites.len();
        Self {
            sites,
            report: RegistryReport {
                loaded,
                skipped: 0,
                without_capacity,
            },
        }
    }

    /// Load the registry from a raw tabular source.
    pub fn load(
        batch: &InputBatch,
        columns: &RegistryColumns,
        date_order: DateOrder,
    ) -> Result<Self> {
        let table = RawTable::from_batch(batch)
            .map_err(|e| EngineError::Registry(format!("cannot read '{}': {e}", batch.name)))?;

        let resolved = resolve_registry_columns(&table, columns).ok_or_else(|| {
            EngineError::Registry(format!(
                "no row in the first {} rows of '{}' carries a '{}' column",
                columns.header_search_rows, batch.name, columns.site_id_column
            ))
        })?;

        let mut sites = BTreeMap::new();
        let mut report = RegistryReport::default();

        for row in table.rows.iter().skip(resolved.header_row + 1) {
            if row.iter().all(Cell::is_empty) {
                continue;
            }

            let Some(site_id) = resolved.site_id.and_then(|idx| cell_text(row, idx)) else {
                report.skipped += 1;
                continue;
            };

            let capacity_kwp = resolved
                .capacity
                .and_then(|idx| cell_number(row, idx))
                .filter(|v| *v > 0.0)
                .or_else(|| {
                    Installation::derive_capacity_kwp(
                        resolved.panel_count.and_then(|idx| cell_number(row, idx)),
                        resolved.panel_watts.and_then(|idx| cell_number(row, idx)),
                    )
                });
            if capacity_kwp.is_none() {
                report.without_capacity += 1;
            }

            let vendor = resolved.vendor.and_then(|idx| cell_text(row, idx));
            let panel_type = panel_description(
                resolved.panel_watts.and_then(|idx| cell_number(row, idx)),
                vendor.as_deref(),
                resolved
                    .panel_model
                    .and_then(|idx| cell_text(row, idx))
                    .as_deref(),
            );

            let installation = Installation {
                site_id: site_id.clone(),
                site_name: resolved.name.and_then(|idx| cell_text(row, idx)),
                capacity_kwp,
                province: resolved.province.and_then(|idx| cell_text(row, idx)),
                project: resolved.project.and_then(|idx| cell_text(row, idx)),
                panel_type,
                vendor,
                commission_date: resolved
                    .commission
                    .and_then(|idx| row.get(idx))
                    .and_then(|cell| parse_date_cell(cell, date_order)),
            };

            if sites.insert(site_id.clone(), installation).is_some() {
                warn!(site_id, "duplicate registry row, keeping the later one");
            }
        }

        if sites.is_empty() {
            return Err(EngineError::Registry(format!(
                "'{}' produced no usable installation rows",
                batch.name
            )));
        }

        report.loaded = sites.len();
        Ok(Self { sites, report })
    }

    #[must_use]
    pub fn lookup(&self, site_id: &str) -> Option<&Installation> {
        self.sites.get(site_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Installation> {
        self.sites.values()
    }

    pub fn site_ids(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    #[must_use]
    pub fn report(&self) -> &RegistryReport {
        &self.report
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ResolvedRegistryColumns {
    header_row: usize,
    site_id: Option<usize>,
    name: Option<usize>,
    capacity: Option<usize>,
    panel_count: Option<usize>,
    panel_watts: Option<usize>,
    panel_model: Option<usize>,
    vendor: Option<usize>,
    province: Option<usize>,
    project: Option<usize>,
    commission: Option<usize>,
}

/// Find the first row carrying the site-id column; every other column is
/// optional and resolved from the same row when present.
fn resolve_registry_columns(
    table: &RawTable,
    columns: &RegistryColumns,
) -> Option<ResolvedRegistryColumns> {
    for (row_idx, row) in table.rows.iter().take(columns.header_search_rows).enumerate() {
        let find = |name: &str| -> Option<usize> {
            let wanted = name.trim().to_lowercase();
            row.iter().position(|cell| {
                cell.as_text()
                    .is_some_and(|text| text.to_lowercase() == wanted)
            })
        };

        let Some(site_id) = find(&columns.site_id_column) else {
            continue;
        };

        return Some(ResolvedRegistryColumns {
            header_row: row_idx,
            site_id: Some(site_id),
            name: find(&columns.name_column),
            capacity: find(&columns.capacity_column),
            panel_count: find(&columns.panel_count_column),
            panel_watts: find(&columns.panel_watts_column),
            panel_model: find(&columns.panel_model_column),
            vendor: find(&columns.vendor_column),
            province: find(&columns.province_column),
            project: find(&columns.project_column),
            commission: find(&columns.commission_column),
        });
    }
    None
}

fn cell_text(row: &[Cell], idx: usize) -> Option<String> {
    row.get(idx).and_then(Cell::as_text).map(str::to_owned)
}

fn cell_number(row: &[Cell], idx: usize) -> Option<f64> {
    match row.get(idx)? {
        Cell::Number(v) => Some(*v),
        Cell::Text(s) => s.trim().parse::<f64>().ok(),
        Cell::Empty | Cell::Date(_) => None,
    }
}

/// "550 LONGi LR5-72HPH" style description from whatever attributes exist.
fn panel_description(
    panel_watts: Option<f64>,
    vendor: Option<&str>,
    model: Option<&str>,
) -> Option<String> {
    if vendor.is_none() && model.is_none() && panel_watts.is_none() {
        return None;
    }
    let mut parts = Vec::new();
    if let Some(watts) = panel_watts
        && watts > 0.0
    {
        parts.push(format!("{}", watts.round() as i64));
    }
    parts.push(vendor.unwrap_or("Unknown").to_owned());
    parts.push(model.unwrap_or("Unknown").to_owned());
    Some(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::InputFormat;
    use chrono::NaiveDate;

    fn registry_batch(csv: &str) -> InputBatch {
        InputBatch::new("sites.csv", InputFormat::Csv, csv.as_bytes().to_vec())
    }

    #[test]
    fn test_load_with_derived_capacity() {
        let batch = registry_batch(
            "Split,Site,Panels,Panel Size,Panel Vendor,Panel Model,Project,Province,Commissioned Date\n\
             KE-01,Kericho Clinic,20,550,LONGi,LR5-72HPH,Health,Kericho,2023-04-12\n\
             KE-02,Nandi School,10,450,Jinko,Tiger,Education,Nandi,2024-01-03\n",
        );
        let registry =
            InstallationRegistry::load(&batch, &RegistryColumns::default(), DateOrder::DayFirst)
                .unwrap();

        assert_eq!(registry.len(), 2);
        let site = registry.lookup("KE-01").unwrap();
        assert_eq!(site.capacity_kwp, Some(11.0));
        assert_eq!(site.panel_type.as_deref(), Some("550 LONGi LR5-72HPH"));
        assert_eq!(site.province.as_deref(), Some("Kericho"));
        assert_eq!(
            site.commission_date,
            NaiveDate::from_ymd_opt(2023, 4, 12)
        );
    }

    #[test]
    fn test_direct_capacity_preferred_over_derivation() {
        let batch = registry_batch(
            "Split,Capacity (kWp),Panels,Panel Size\nKE-01,15.5,20,550\n",
        );
        let registry =
            InstallationRegistry::load(&batch, &RegistryColumns::default(), DateOrder::DayFirst)
                .unwrap();
        assert_eq!(registry.lookup("KE-01").unwrap().capacity_kwp, Some(15.5));
    }

    #[test]
    fn test_malformed_row_skipped_not_fatal() {
        let batch = registry_batch(
            "Split,Panels,Panel Size\nKE-01,20,550\n,10,450\nKE-03,,\n",
        );
        let registry =
            InstallationRegistry::load(&batch, &RegistryColumns::default(), DateOrder::DayFirst)
                .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.report().skipped, 1);
        assert_eq!(registry.report().without_capacity, 1);
        assert_eq!(registry.lookup("KE-03").unwrap().capacity_kwp, None);
    }

    #[test]
    fn test_unusable_source_is_registry_error() {
        let batch = registry_batch("alpha,beta\n1,2\n");
        let err =
            InstallationRegistry::load(&batch, &RegistryColumns::default(), DateOrder::DayFirst)
                .unwrap_err();
        assert!(matches!(err, EngineError::Registry(_)));
    }
}
