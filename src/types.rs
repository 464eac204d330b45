use crate::error::{Result, ScraperError};
use serde::{Deserialize, Serialize};

/// One showtime within a screening day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: String,
    pub available: bool,
}

impl Slot {
    pub fn new(time: impl Into<String>, available: bool) -> Self {
        Self {
            time: time.into(),
            available,
        }
    }
}

/// A `(date, slots)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub date: String,
    pub slots: Vec<Slot>,
}

impl Occurrence {
    pub fn new(date: impl Into<String>, slots: Vec<Slot>) -> Self {
        Self {
            date: date.into(),
            slots,
        }
    }
}

/// One calendar cell observed during the listing scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub title: String,
    pub detail_ref: String,
    #[serde(default)]
    pub item_id: Option<String>,
    pub date: String,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl RawEntry {
    /// Identity and detail reference, or an input error when either is missing
    pub fn identity(&self) -> Result<(&str, &str)> {
        if self.detail_ref.trim().is_empty() {
            return Err(ScraperError::AggregationInput(format!(
                "entry '{}' on {} has no detail reference",
                self.title, self.date
            )));
        }
        match self.item_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok((id, self.detail_ref.as_str())),
            _ => Err(ScraperError::AggregationInput(format!(
                "entry '{}' has no item id ({})",
                self.title, self.detail_ref
            ))),
        }
    }
}

/// Best-effort fields pulled out of one detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailFields {
    pub poster: Option<String>,
    pub director: Option<String>,
    pub year: Option<String>,
    pub runtime: Option<String>,
    pub synopsis: Option<String>,
    pub schedule: Vec<Occurrence>,
}

/// Enrichment produced by one task for one item id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub item_id: String,
    pub poster: Option<String>,
    pub director: Option<String>,
    pub year: Option<String>,
    pub runtime: Option<String>,
    pub synopsis: Option<String>,
    pub detail_ref: Option<String>,
    /// Full schedule enumerated by the detail page; replaces listing-derived dates
    pub all_occurrences: Option<Vec<Occurrence>>,
}

impl EnrichmentResult {
    pub fn from_fields(item_id: &str, detail_ref: &str, fields: DetailFields) -> Self {
        let all_occurrences = if fields.schedule.is_empty() {
            None
        } else {
            Some(fields.schedule)
        };
        Self {
            item_id: item_id.to_string(),
            poster: fields.poster,
            director: fields.director,
            year: fields.year,
            runtime: fields.runtime,
            synopsis: fields.synopsis,
            detail_ref: Some(detail_ref.to_string()),
            all_occurrences,
        }
    }
}

/// Canonical record for one catalog item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub director: String,
    pub year: String,
    pub runtime: String,
    pub synopsis: String,
    pub poster_url: String,
    pub detail_url: String,
    pub occurrences: Vec<Occurrence>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, detail_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            detail_url: detail_url.into(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.occurrences.is_empty()
    }
}
