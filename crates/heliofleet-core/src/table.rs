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

//! Raw tabular input handling.
//!
//! Monitoring exports arrive as XLSX or CSV byte streams. Both are decoded
//! into the same grid of [`Cell`]s so that header discovery and row parsing
//! (`schema.rs`) are format-agnostic.

use std::io::Cursor;

use calamine::{Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use crate::error::{EngineError, Result};

/// One raw input file handed to the engine.
#[derive(Debug, Clone)]
pub struct InputBatch {
    /// Stable name used for diagnostics and for the deterministic merge
    /// order (inputs are merged in ascending name order).
    pub name: String,
    pub format: InputFormat,
    pub bytes: Vec<u8>,
}

impl InputBatch {
    #[must_use]
    pub fn new(name: impl Into<String>, format: InputFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Guess the format from a file name extension.
    #[must_use]
    pub fn format_for_name(name: &str) -> Option<InputFormat> {
        let lower = name.to_lowercase();
        if lower.ends_with(".xlsx") {
            Some(InputFormat::Xlsx)
        } else if lower.ends_with(".csv") {
            Some(InputFormat::Csv)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Xlsx,
    Csv,
}

impl InputFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Xlsx => "xlsx",
            InputFormat::Csv => "csv",
        }
    }
}

/// One decoded cell. Typed cells (numbers, dates) survive decoding so that
/// downstream parsing does not round-trip through strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    /// Trimmed text content, for header matching and id columns.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() { None } else { Some(trimmed) }
            }
            Cell::Empty | Cell::Number(_) | Cell::Date(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Date(_) => false,
        }
    }
}

/// A fully decoded input table.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Decode an input batch into a cell grid.
    pub fn from_batch(batch: &InputBatch) -> Result<Self> {
        match batch.format {
            InputFormat::Xlsx => Self::from_xlsx(&batch.name, &batch.bytes),
            InputFormat::Csv => Self::from_csv(&batch.name, &batch.bytes),
        }
    }

    fn from_xlsx(name: &str, bytes: &[u8]) -> Result<Self> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook: Xlsx<_> = Xlsx::new(cursor).map_err(|e| EngineError::Malformed {
            input: name.to_owned(),
            format: "xlsx",
            reason: e.to_string(),
        })?;

        let sheet_names = workbook.sheet_names().to_vec();
        let Some(first_sheet) = sheet_names.first() else {
            return Err(EngineError::Malformed {
                input: name.to_owned(),
                format: "xlsx",
                reason: "workbook has no sheets".to_owned(),
            });
        };

        let range = workbook
            .worksheet_range(first_sheet)
            .map_err(|e| EngineError::Malformed {
                input: name.to_owned(),
                format: "xlsx",
                reason: e.to_string(),
            })?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_from_xlsx).collect())
            .collect();

        Ok(Self { rows })
    }

    fn from_csv(name: &str, bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| EngineError::Malformed {
                input: name.to_owned(),
                format: "csv",
                reason: e.to_string(),
            })?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(field.to_owned())
                        }
                    })
                    .collect(),
            );
        }

        Ok(Self { rows })
    }
}

fn cell_from_xlsx(data: &calamine::Data) -> Cell {
    match data {
        calamine::Data::Empty | calamine::Data::Error(_) => Cell::Empty,
        calamine::Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        calamine::Data::Float(v) => Cell::Number(*v),
        calamine::Data::Int(v) => Cell::Number(*v as f64),
        calamine::Data::Bool(b) => Cell::Text(b.to_string()),
        calamine::Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(date) => Cell::Date(date),
            None => Cell::Empty,
        },
        calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Convert an Excel serial day number to a calendar date.
///
/// Excel's epoch is 1899-12-30 (the 1900 leap-year bug is inside the first
/// 60 serials, well before any monitoring data).
#[must_use]
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}
