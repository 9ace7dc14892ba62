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

//! Schema normalization: locate the header row in a raw table and emit
//! canonical [`Reading`] records.
//!
//! Vendor exports place the header anywhere in the first few dozen rows and
//! vary its exact spelling, so resolution is token-based and
//! case-insensitive. Everything downstream of this module operates on the
//! canonical record type only, never on raw cells.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use heliofleet_types::{DateOrder, EnergyValue, Reading, SchemaConfig};

use crate::error::{EngineError, Result};
use crate::table::{Cell, RawTable, excel_serial_to_date};

/// Why a row was skipped. Skips are counted, never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingSiteId,
    UnparseableDate,
    UnparseableEnergy,
    /// Negative raw energy is malformed input, dropped rather than zeroed.
    NegativeEnergy,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingSiteId => "missing_site_id",
            SkipReason::UnparseableDate => "unparseable_date",
            SkipReason::UnparseableEnergy => "unparseable_energy",
            SkipReason::NegativeEnergy => "negative_energy",
        }
    }
}

/// Per-input parse outcome, surfaced in the run diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseReport {
    pub input: String,
    pub accepted: usize,
    pub skipped: usize,
    pub reasons: BTreeMap<SkipReason, usize>,
}

impl ParseReport {
    fn skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self.reasons.entry(reason).or_insert(0) += 1;
    }
}

/// Column indices resolved from a discovered header row.
#[derive(Debug, Clone, Copy)]
struct ResolvedColumns {
    header_row: usize,
    site: usize,
    date: usize,
    energy: usize,
}

/// Normalize one raw table into canonical readings plus a parse report.
///
/// Fails with [`EngineError::Schema`] when no row inside the search window
/// carries all required columns; per-row problems are counted and skipped.
pub fn normalize_table(
    table: &RawTable,
    config: &SchemaConfig,
    input_name: &str,
) -> Result<(Vec<Reading>, ParseReport)> {
    let columns = resolve_columns(table, config, input_name)?;
    debug!(
        input = input_name,
        header_row = columns.header_row,
        site_col = columns.site,
        date_col = columns.date,
        energy_col = columns.energy,
        "resolved input schema"
    );

    let mut readings = Vec::new();
    let mut report = ParseReport {
        input: input_name.to_owned(),
        ..ParseReport::default()
    };

    for row in table.rows.iter().skip(columns.header_row + 1) {
        // Trailing banner/summary rows decode as fully empty; not data.
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let Some(site_id) = row.get(columns.site).and_then(Cell::as_text) else {
            report.skip(SkipReason::MissingSiteId);
            continue;
        };

        let Some(date) = row
            .get(columns.date)
            .and_then(|cell| parse_date_cell(cell, config.date_order))
        else {
            report.skip(SkipReason::UnparseableDate);
            continue;
        };

        let energy = match parse_energy_cell(
            row.get(columns.energy).unwrap_or(&Cell::Empty),
            &config.missing_value_tokens,
        ) {
            Ok(energy) => energy,
            Err(reason) => {
                report.skip(reason);
                continue;
            }
        };

        readings.push(Reading::new(site_id, date, energy));
        report.accepted += 1;
    }

    Ok((readings, report))
}

fn resolve_columns(
    table: &RawTable,
    config: &SchemaConfig,
    input_name: &str,
) -> Result<ResolvedColumns> {
    let energy_tokens = alphanumeric_tokens(&config.energy_column);
    let site_name = config.site_id_column.trim().to_lowercase();
    let date_name = config.date_column.trim().to_lowercase();

    for (row_idx, row) in table.rows.iter().take(config.header_search_rows).enumerate() {
        let mut site = None;
        let mut date = None;
        let mut energy = None;

        for (col_idx, cell) in row.iter().enumerate() {
            let Some(text) = cell.as_text() else { continue };
            let lower = text.to_lowercase();

            if site.is_none() && lower == site_name {
                site = Some(col_idx);
            } else if date.is_none() && lower == date_name {
                date = Some(col_idx);
            } else if energy.is_none()
                && !energy_tokens.is_empty()
                && energy_tokens.iter().all(|token| lower.contains(token))
            {
                energy = Some(col_idx);
            }
        }

        if let (Some(site), Some(date), Some(energy)) = (site, date, energy) {
            return Ok(ResolvedColumns {
                header_row: row_idx,
                site,
                date,
                energy,
            });
        }
    }

    Err(EngineError::Schema {
        input: input_name.to_owned(),
        searched: config.header_search_rows.min(table.rows.len()),
        missing: format!(
            "'{}', '{}', '{}'",
            config.site_id_column, config.date_column, config.energy_column
        ),
    })
}

/// Lowercased alphanumeric tokens of a configured column name; parentheses
/// and punctuation are stripped so "(kWh)" matches "kWh".
fn alphanumeric_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Parse a date cell under the run's day/month policy.
///
/// Accepted forms: native spreadsheet dates, Excel serial numbers, ISO-8601
/// with or without a time suffix, and slash/dash separated day-month forms
/// resolved by `date_order` (never guessed per row).
pub(crate) fn parse_date_cell(cell: &Cell, date_order: DateOrder) -> Option<NaiveDate> {
    match cell {
        Cell::Date(date) => Some(*date),
        Cell::Number(serial) => excel_serial_to_date(*serial),
        Cell::Text(raw) => parse_date_text(raw.trim(), date_order),
        Cell::Empty => None,
    }
}

fn parse_date_text(text: &str, date_order: DateOrder) -> Option<NaiveDate> {
    const ISO_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const DAY_FIRST: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"];
    const MONTH_FIRST: [&str; 3] = ["%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"];

    for format in ISO_FORMATS {
        if format.contains("%H") {
            if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, format) {
                return Some(dt.date());
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    let locale_formats = match date_order {
        DateOrder::DayFirst => DAY_FIRST,
        DateOrder::MonthFirst => MONTH_FIRST,
    };
    for format in locale_formats {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    None
}

fn parse_energy_cell(
    cell: &Cell,
    missing_tokens: &[String],
) -> std::result::Result<EnergyValue, SkipReason> {
    let value = match cell {
        Cell::Empty => return Ok(EnergyValue::Missing),
        Cell::Number(v) => *v,
        Cell::Text(raw) => {
            let trimmed = raw.trim();
            let lower = trimmed.to_lowercase();
            if missing_tokens.iter().any(|token| token.as_str() == lower) {
                return Ok(EnergyValue::Missing);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| SkipReason::UnparseableEnergy)?
        }
        Cell::Date(_) => return Err(SkipReason::UnparseableEnergy),
    };

    if !value.is_finite() {
        return Err(SkipReason::UnparseableEnergy);
    }
    if value < 0.0 {
        return Err(SkipReason::NegativeEnergy);
    }
    Ok(EnergyValue::Kwh(value))
}
