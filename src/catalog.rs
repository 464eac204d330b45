//! Export representation of the catalog and its persistence.
//!
//! Surrounding systems read `{id, title, ..., screenings: [{date, showtimes:
//! [{time, status}]}]}` with optional fields as empty strings.

use crate::constants::{COMING_SOON, PUBLISHED_FILE_NAME, STATUS_AVAILABLE, STATUS_SOLD_OUT};
use crate::error::Result;
use crate::types::{CatalogItem, Occurrence, Slot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub time: String,
    pub status: String,
}

impl Showtime {
    pub fn is_sold_out(&self) -> bool {
        self.status == STATUS_SOLD_OUT
    }
}

impl From<&Slot> for Showtime {
    fn from(slot: &Slot) -> Self {
        let status = if slot.available {
            STATUS_AVAILABLE
        } else {
            STATUS_SOLD_OUT
        };
        Self {
            time: slot.time.clone(),
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screening {
    pub date: String,
    pub showtimes: Vec<Showtime>,
}

impl From<&Occurrence> for Screening {
    fn from(occurrence: &Occurrence) -> Self {
        Self {
            date: occurrence.date.clone(),
            showtimes: occurrence.slots.iter().map(Showtime::from).collect(),
        }
    }
}

/// One exported catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub director: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub poster_url: String,
    #[serde(default)]
    pub detail_url: String,
    pub screenings: Vec<Screening>,
}

impl From<&CatalogItem> for CatalogRecord {
    fn from(item: &CatalogItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            director: item.director.clone(),
            year: item.year.clone(),
            runtime: item.runtime.clone(),
            synopsis: item.synopsis.clone(),
            poster_url: item.poster_url.clone(),
            detail_url: item.detail_url.clone(),
            screenings: item.occurrences.iter().map(Screening::from).collect(),
        }
    }
}

impl CatalogRecord {
    /// "date - time" of the first showtime, the bare date, or "Coming Soon".
    pub fn first_screening_label(&self) -> String {
        match self.screenings.first() {
            None => COMING_SOON.to_string(),
            Some(screening) => match screening.showtimes.first() {
                Some(showtime) => format!("{} - {}", screening.date, showtime.time),
                None if screening.date.is_empty() => COMING_SOON.to_string(),
                None => screening.date.clone(),
            },
        }
    }

    pub fn has_available_screenings(&self) -> bool {
        self.screenings
            .iter()
            .flat_map(|s| &s.showtimes)
            .any(|showtime| !showtime.is_sold_out())
    }

    /// False when there are no screenings at all; that state reads as "Coming Soon".
    pub fn is_all_sold_out(&self) -> bool {
        !self.screenings.is_empty()
            && self
                .screenings
                .iter()
                .all(|s| s.showtimes.iter().all(Showtime::is_sold_out))
    }

    pub fn screening_dates(&self) -> Vec<&str> {
        self.screenings.iter().map(|s| s.date.as_str()).collect()
    }
}

/// A record that deserializes fine but breaks a catalog invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogIssue {
    #[error("film '{id}' appears more than once")]
    DuplicateId { id: String },

    #[error("film '{id}' has no title")]
    MissingTitle { id: String },

    #[error("film '{id}' has no screenings")]
    NoScreenings { id: String },

    #[error("film '{id}' has a screening on '{date}' with no showtimes")]
    NoShowtimes { id: String, date: String },

    #[error("film '{id}' lists '{date}' more than once or out of order")]
    UnsortedDates { id: String, date: String },

    #[error("film '{id}' on '{date}' repeats or misorders showtime '{time}'")]
    UnsortedTimes { id: String, date: String, time: String },

    #[error("film '{id}' ('{title}') is out of title order")]
    UnsortedTitles { id: String, title: String },
}

/// Check the invariants every written catalog holds: unique ids, non-empty
/// titles and schedules, strictly increasing dates and times, and records
/// sorted by title.
pub fn audit(records: &[CatalogRecord]) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let id = record.id.clone();
        if !seen.insert(record.id.as_str()) {
            issues.push(CatalogIssue::DuplicateId { id: id.clone() });
        }
        if record.title.trim().is_empty() {
            issues.push(CatalogIssue::MissingTitle { id: id.clone() });
        }
        if index > 0 && records[index - 1].title > record.title {
            issues.push(CatalogIssue::UnsortedTitles {
                id: id.clone(),
                title: record.title.clone(),
            });
        }
        if record.screenings.is_empty() {
            issues.push(CatalogIssue::NoScreenings { id: id.clone() });
        }

        for (day, screening) in record.screenings.iter().enumerate() {
            if day > 0 && record.screenings[day - 1].date >= screening.date {
                issues.push(CatalogIssue::UnsortedDates {
                    id: id.clone(),
                    date: screening.date.clone(),
                });
            }
            if screening.showtimes.is_empty() {
                issues.push(CatalogIssue::NoShowtimes {
                    id: id.clone(),
                    date: screening.date.clone(),
                });
            }
            for pair in screening.showtimes.windows(2) {
                if pair[0].time >= pair[1].time {
                    issues.push(CatalogIssue::UnsortedTimes {
                        id: id.clone(),
                        date: screening.date.clone(),
                        time: pair[1].time.clone(),
                    });
                }
            }
        }
    }

    issues
}

pub struct CatalogBuilder;

impl CatalogBuilder {
    /// Keep only complete items and convert them to export records, preserving order.
    pub fn build(items: &[CatalogItem]) -> Vec<CatalogRecord> {
        items
            .iter()
            .filter(|item| item.is_complete())
            .map(CatalogRecord::from)
            .collect()
    }

    pub fn to_json(records: &[CatalogRecord]) -> Result<String> {
        Ok(serde_json::to_string_pretty(records)?)
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub fn write_json(records: &[CatalogRecord], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::to_json(records)?)?;
        info!("💾 Saved {} catalog records to {}", records.len(), path.display());
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Vec<CatalogRecord>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Copy a written catalog into `publish_dir` under the public file name.
    pub fn publish(source: &Path, publish_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(publish_dir)?;
        let target = publish_dir.join(PUBLISHED_FILE_NAME);
        fs::copy(source, &target)?;
        debug!("Copied {} to {}", source.display(), target.display());
        Ok(target)
    }
}
