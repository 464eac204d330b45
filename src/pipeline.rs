use crate::aggregate::{Aggregation, Aggregator};
use crate::apis::metrograph::{MetrographExtractor, MetrographListingParser};
use crate::catalog::{CatalogBuilder, CatalogRecord};
use crate::config::{Config, OutputConfig};
use crate::constants::VENUE_NAME;
use crate::enrich::{ConcurrentEnricher, EnrichReporter, TracingReporter};
use crate::error::Result;
use crate::extract::{Extractor, ListingParser};
use crate::fetch::{PageFetcher, Readiness};
use crate::listing::ListingScanner;
use crate::types::{EnrichmentResult, RawEntry};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub discovered_entries: usize,
    pub skipped_entries: usize,
    pub unique_items: usize,
    pub enriched_items: usize,
    pub soft_failures: usize,
    pub catalog_items: usize,
    /// Unset when nothing was written
    pub output_file: Option<String>,
    pub published_file: Option<String>,
    pub success: bool,
    pub duration_secs: f64,
}

/// Where a catalog ended up after persisting.
#[derive(Debug, Clone)]
pub struct Persisted {
    pub output_file: PathBuf,
    pub published_file: Option<PathBuf>,
}

pub struct Pipeline {
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    parser: Arc<dyn ListingParser>,
    reporter: Arc<dyn EnrichReporter>,
}

impl Pipeline {
    /// Pipeline wired with the venue's own parsers.
    pub fn new(config: Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config,
            fetcher,
            extractor: Arc::new(MetrographExtractor::new()),
            parser: Arc::new(MetrographListingParser::new()),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ListingParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn EnrichReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn scanner(&self) -> ListingScanner {
        ListingScanner::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.parser),
            self.config.venue.calendar_url.as_str(),
            self.config.venue.base_url.as_str(),
            Readiness::new(
                self.config.fetch.listing_ready_selector.as_str(),
                self.config.fetch.listing_timeout(),
            ),
        )
    }

    fn enricher(&self) -> ConcurrentEnricher {
        ConcurrentEnricher::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            Readiness::new(
                self.config.fetch.detail_ready_selector.as_str(),
                self.config.fetch.timeout(),
            ),
            self.config.fetch.concurrency,
        )
        .with_reporter(Arc::clone(&self.reporter))
    }

    /// Listing scan only.
    pub async fn scan(&self) -> Result<Vec<RawEntry>> {
        let t_scan = Instant::now();
        let entries = self.scanner().scan().await?;
        histogram!("screenings_listing_duration_seconds", "venue" => VENUE_NAME).record(t_scan.elapsed().as_secs_f64());
        counter!("screenings_listing_entries_total", "venue" => VENUE_NAME).increment(entries.len() as u64);
        Ok(entries)
    }

    /// Aggregate and build export records without touching the network.
    pub fn assemble(
        entries: &[RawEntry],
        enrichment: &HashMap<String, EnrichmentResult>,
    ) -> (Aggregation, Vec<CatalogRecord>) {
        let aggregation = Aggregator::aggregate(entries, enrichment);
        for rejected in &aggregation.rejected {
            warn!("Skipping listing entry: {}", rejected);
        }
        let records = CatalogBuilder::build(&aggregation.items);
        (aggregation, records)
    }

    /// Write the catalog to the configured output and copy it to the publish directory if set.
    ///
    /// An empty catalog is never written, so a failed run leaves the previous
    /// output and published file in place.
    pub fn persist(output: &OutputConfig, records: &[CatalogRecord]) -> Result<Option<Persisted>> {
        if records.is_empty() {
            warn!("Catalog is empty; keeping {} as it is", output.path.display());
            return Ok(None);
        }

        let output_file = output.path.clone();
        CatalogBuilder::write_json(records, &output_file)?;

        let published_file = match &output.publish_dir {
            Some(dir) => {
                let target = CatalogBuilder::publish(&output_file, dir)?;
                info!("📤 Published catalog to {}", target.display());
                Some(target)
            }
            None => None,
        };

        Ok(Some(Persisted {
            output_file,
            published_file,
        }))
    }

    /// Run the complete pipeline: listing, enrichment, aggregation, persistence.
    #[instrument(skip(self), fields(venue = VENUE_NAME))]
    pub async fn run(&self) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("🚀 Starting run {} for {}", run_id, VENUE_NAME);
        counter!("screenings_pipeline_runs_total", "venue" => VENUE_NAME).increment(1);
        let t_pipeline = Instant::now();

        // Step 1: Listing
        info!("📡 Scanning {}...", self.config.venue.calendar_url);
        let entries = match self.scan().await {
            Ok(entries) => entries,
            Err(e) => {
                counter!("screenings_pipeline_failures_total", "venue" => VENUE_NAME).increment(1);
                return Err(e);
            }
        };

        // Step 2: Enrichment
        let enricher = self.enricher();
        info!("🔧 Enriching detail pages ({} at a time)...", enricher.concurrency());
        let t_enrich = Instant::now();
        let outcome = enricher.enrich(&entries).await;
        histogram!("screenings_enrich_duration_seconds", "venue" => VENUE_NAME).record(t_enrich.elapsed().as_secs_f64());
        counter!("screenings_items_enriched_total", "venue" => VENUE_NAME).increment(outcome.results.len() as u64);
        counter!("screenings_soft_failures_total", "venue" => VENUE_NAME).increment(outcome.failures.len() as u64);
        info!(
            "✅ Enriched {} items ({} soft failures)",
            outcome.results.len(),
            outcome.failures.len()
        );

        // Step 3: Aggregation
        let (aggregation, records) = Self::assemble(&entries, &outcome.results);
        let unique_items = aggregation.items.len() + aggregation.incomplete;
        if aggregation.incomplete > 0 {
            info!("Dropped {} incomplete items", aggregation.incomplete);
        }
        histogram!("screenings_catalog_items_per_run", "venue" => VENUE_NAME).record(records.len() as f64);

        // Step 4: Persistence
        let persisted = Self::persist(&self.config.output, &records)?;

        let duration_secs = t_pipeline.elapsed().as_secs_f64();
        histogram!("screenings_pipeline_duration_seconds", "venue" => VENUE_NAME).record(duration_secs);

        let result = PipelineResult {
            run_id,
            started_at,
            discovered_entries: entries.len(),
            skipped_entries: aggregation.rejected.len(),
            unique_items,
            enriched_items: outcome.results.len(),
            soft_failures: outcome.failures.len(),
            catalog_items: records.len(),
            output_file: persisted
                .as_ref()
                .map(|p| p.output_file.to_string_lossy().to_string()),
            published_file: persisted
                .and_then(|p| p.published_file)
                .map(|p| p.to_string_lossy().to_string()),
            success: !records.is_empty(),
            duration_secs,
        };

        info!(
            "🏁 Run {} finished: {} entries, {} items enriched, {} in catalog ({:.1}s)",
            run_id, result.discovered_entries, result.enriched_items, result.catalog_items, duration_secs
        );
        Ok(result)
    }
}
