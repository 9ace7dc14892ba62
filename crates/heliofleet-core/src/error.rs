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

//! Error taxonomy for the consolidation engine.
//!
//! Row-level problems are not errors: they are skipped and counted in the
//! parse/merge reports. The variants here are the batch- and run-level
//! failures that callers have to react to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No row within the configured search window carried all required
    /// column headers. Fatal for the input file, recoverable for the run.
    #[error("no usable header in '{input}' within the first {searched} rows (need {missing})")]
    Schema {
        input: String,
        searched: usize,
        missing: String,
    },

    /// The input bytes could not be read as the declared tabular format.
    #[error("failed to read '{input}' as {format}: {reason}")]
    Malformed {
        input: String,
        format: &'static str,
        reason: String,
    },

    /// The registry source was wholly unusable. Individual malformed rows
    /// never raise this; they are skipped with a diagnostic.
    #[error("registry load failed: {0}")]
    Registry(String),

    /// A persisted snapshot exists but cannot be parsed. Left on disk
    /// untouched so the operator can inspect it.
    #[error("snapshot at '{path}' is corrupt: {reason}")]
    Snapshot { path: String, reason: String },

    /// Writing the new snapshot failed; the prior snapshot on disk remains
    /// authoritative and the run must not be declared successful.
    #[error("failed to persist snapshot to '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
