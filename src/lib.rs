pub mod aggregate;
pub mod apis;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod listing;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use aggregate::{Aggregation, Aggregator};
pub use catalog::{CatalogBuilder, CatalogRecord};
pub use config::Config;
pub use enrich::{ConcurrentEnricher, EnrichEvent, EnrichReporter, EnrichmentOutcome, SoftFailure};
pub use error::{ExtractError, FetchError, Result, ScraperError};
pub use fetch::{PageFetcher, Readiness};
pub use pipeline::{Pipeline, PipelineResult};
