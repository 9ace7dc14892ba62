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

//! The historical store: one reading per `(site_id, date)`, persisted as a
//! single versioned snapshot and reloaded wholesale at run start.
//!
//! The store is an explicit value passed through the pipeline — no ambient
//! state — so merge semantics are testable without I/O. Merging is
//! idempotent and independent of wall-clock time; the only ordering that
//! matters is the canonical ingest order of the batch itself.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use heliofleet_types::{EnergyValue, Reading};

use crate::error::{EngineError, Result};

/// Snapshot schema version; bump on incompatible layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// Per-site daily history, ordered by date.
pub type SiteHistory = BTreeMap<NaiveDate, EnergyValue>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    sites: BTreeMap<String, SiteHistory>,
}

/// Audit trail for one merge, surfaced in run diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    /// Incoming value equal to the stored one; nothing changed.
    pub unchanged: usize,
    /// Stored real readings an incoming `Missing` was not allowed to erase.
    pub missing_preserved: usize,
    pub overwritten: Vec<Overwrite>,
}

/// One audited replacement of a stored value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overwrite {
    pub site_id: String,
    pub date: NaiveDate,
    pub old: EnergyValue,
    pub new: EnergyValue,
}

impl MergeReport {
    #[must_use]
    pub fn total_applied(&self) -> usize {
        self.inserted + self.overwritten.len()
    }
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of canonical readings into the store.
    ///
    /// Conflict policy (applied per reading, in batch order):
    /// - absent key: insert;
    /// - present key: the incoming value wins, except an incoming `Missing`
    ///   never erases a stored real reading;
    /// - duplicates within the batch: the later reading wins, subject to the
    ///   same rule.
    ///
    /// Every actual replacement is recorded with its old and new values.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = Reading>) -> MergeReport {
        let mut report = MergeReport::default();

        for reading in batch {
            let history = self.sites.entry(reading.site_id.clone()).or_default();
            match history.get(&reading.date).copied() {
                None => {
                    history.insert(reading.date, reading.energy);
                    report.inserted += 1;
                }
                Some(stored) if stored == reading.energy => {
                    report.unchanged += 1;
                }
                Some(stored) if reading.energy.is_missing() && !stored.is_missing() => {
                    report.missing_preserved += 1;
                }
                Some(stored) => {
                    history.insert(reading.date, reading.energy);
                    report.overwritten.push(Overwrite {
                        site_id: reading.site_id,
                        date: reading.date,
                        old: stored,
                        new: reading.energy,
                    });
                }
            }
        }

        debug!(
            inserted = report.inserted,
            overwritten = report.overwritten.len(),
            unchanged = report.unchanged,
            missing_preserved = report.missing_preserved,
            "merged batch into history store"
        );
        report
    }

    #[must_use]
    pub fn site_history(&self, site_id: &str) -> Option<&SiteHistory> {
        self.sites.get(site_id)
    }

    pub fn site_ids(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SiteHistory)> {
        self.sites.iter().map(|(id, history)| (id.as_str(), history))
    }

    /// Total number of stored `(site, date)` readings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    #[must_use]
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Earliest and latest date covered by any site.
    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut range: Option<(NaiveDate, NaiveDate)> = None;
        for history in self.sites.values() {
            let (Some(first), Some(last)) = (history.keys().next(), history.keys().next_back())
            else {
                continue;
            };
            range = Some(match range {
                None => (*first, *last),
                Some((lo, hi)) => (lo.min(*first), hi.max(*last)),
            });
        }
        range
    }

    // ============= Snapshot persistence =============

    /// Load the persisted snapshot; an absent file is a cold start and
    /// yields the empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no history snapshot at {}, cold start", path.display());
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot =
            serde_json::from_str(&contents).map_err(|e| EngineError::Snapshot {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot {
                path: path.display().to_string(),
                reason: format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            });
        }

        let mut store = Self::new();
        for row in snapshot.readings {
            store
                .sites
                .entry(row.site_id)
                .or_default()
                .insert(row.date, row.energy_kwh);
        }
        info!(
            readings = store.len(),
            sites = store.site_count(),
            "loaded history snapshot from {}",
            path.display()
        );
        Ok(store)
    }

    /// Persist the store atomically: serialize to a sibling temp file, then
    /// rename over the snapshot. A crash mid-write leaves the prior snapshot
    /// authoritative.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| EngineError::Persist {
                path: path.display().to_string(),
                source: e,
            })?;
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            readings: self
                .iter()
                .flat_map(|(site_id, history)| {
                    history.iter().map(move |(date, energy)| SnapshotRow {
                        site_id: site_id.to_owned(),
                        date: *date,
                        energy_kwh: *energy,
                    })
                })
                .collect(),
        };
        let json = serde_json::to_string(&snapshot).map_err(|e| EngineError::Persist {
            path: path.display().to_string(),
            source: std::io::Error::other(e),
        })?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json).map_err(|e| EngineError::Persist {
            path: path.display().to_string(),
            source: e,
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            // Leave nothing half-written behind.
            let _ = fs::remove_file(&temp_path);
            EngineError::Persist {
                path: path.display().to_string(),
                source: e,
            }
        })?;

        info!(
            readings = snapshot.readings.len(),
            "saved history snapshot to {}",
            path.display()
        );
        Ok(())
    }
}

/// On-disk snapshot layout: a version tag plus flat reading rows.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    readings: Vec<SnapshotRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    site_id: String,
    date: NaiveDate,
    energy_kwh: EnergyValue,
}
