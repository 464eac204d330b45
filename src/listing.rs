use crate::error::{Result, ScraperError};
use crate::extract::ListingParser;
use crate::fetch::{PageFetcher, Readiness};
use crate::types::RawEntry;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Fetches the venue calendar and turns it into raw entries.
pub struct ListingScanner {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn ListingParser>,
    calendar_url: String,
    base_url: String,
    readiness: Readiness,
}

impl ListingScanner {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn ListingParser>,
        calendar_url: impl Into<String>,
        base_url: impl Into<String>,
        readiness: Readiness,
    ) -> Self {
        Self {
            fetcher,
            parser,
            calendar_url: calendar_url.into(),
            base_url: base_url.into(),
            readiness,
        }
    }

    /// Every failure here is fatal to the run, including a calendar with no entries.
    #[instrument(skip(self), fields(url = %self.calendar_url))]
    pub async fn scan(&self) -> Result<Vec<RawEntry>> {
        let markup = self.fetcher.fetch(&self.calendar_url, &self.readiness).await?;
        let entries = self.parser.parse_listing(&markup, &self.base_url)?;

        if entries.is_empty() {
            warn!("No screenings found on {}", self.calendar_url);
            return Err(ScraperError::EmptyListing(self.calendar_url.clone()));
        }

        let without_id = entries.iter().filter(|e| e.item_id.is_none()).count();
        info!(
            "📅 Found {} listing entries ({} without a film id)",
            entries.len(),
            without_id
        );
        Ok(entries)
    }
}
