use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use screenings_scraper::catalog::CatalogBuilder;
use screenings_scraper::config::Config;
use screenings_scraper::fetch::{HttpPageFetcher, PageFetcher};
use screenings_scraper::logging;
use screenings_scraper::pipeline::{Pipeline, PipelineResult};
use screenings_scraper::types::{EnrichmentResult, RawEntry};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "screenings_scraper")]
#[command(about = "Cinema screening catalog scraper")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a config.toml (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the calendar, enrich every film, and write the catalog
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// Render pages in headless Chromium instead of plain HTTP
        #[arg(long)]
        browser: bool,
    },
    /// Scan the calendar only and dump the raw entries as JSON
    Listing {
        /// Write entries here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        browser: bool,
    },
    /// Rebuild a catalog offline from dumped entries and optional enrichment results
    Aggregate {
        /// JSON array of raw listing entries
        #[arg(long)]
        entries: PathBuf,
        /// JSON array of enrichment results
        #[arg(long)]
        enrichment: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Copy an existing catalog file into the public data directory
    Publish {
        /// Catalog file to publish (defaults to the configured output path)
        source: Option<PathBuf>,
        /// Destination directory (defaults to the configured publish_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Overrides {
    /// Maximum detail pages fetched at once
    #[arg(long)]
    concurrency: Option<usize>,
    /// Per-page readiness timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Catalog output file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Also copy the catalog to <DIR>/films.json
    #[arg(long)]
    publish_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(concurrency) = self.concurrency {
            config.fetch.concurrency = concurrency;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.fetch.timeout_ms = timeout_ms;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(dir) = &self.publish_dir {
            config.output.publish_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(())
    }
}

#[cfg(feature = "browser")]
async fn run_in_browser(config: Config) -> Result<PipelineResult> {
    use screenings_scraper::fetch::BrowserPageFetcher;

    let browser = Arc::new(BrowserPageFetcher::launch(&config.fetch).await?);
    let result = Pipeline::new(config, Arc::clone(&browser) as Arc<dyn PageFetcher>)
        .run()
        .await;
    if let Ok(browser) = Arc::try_unwrap(browser) {
        browser.shutdown().await;
    }
    Ok(result?)
}

#[cfg(not(feature = "browser"))]
async fn run_in_browser(_config: Config) -> Result<PipelineResult> {
    bail!("this build does not include the `browser` feature")
}

#[cfg(feature = "browser")]
async fn scan_in_browser(config: Config) -> Result<Vec<RawEntry>> {
    use screenings_scraper::fetch::BrowserPageFetcher;

    let browser = Arc::new(BrowserPageFetcher::launch(&config.fetch).await?);
    let entries = Pipeline::new(config, Arc::clone(&browser) as Arc<dyn PageFetcher>)
        .scan()
        .await;
    if let Ok(browser) = Arc::try_unwrap(browser) {
        browser.shutdown().await;
    }
    Ok(entries?)
}

#[cfg(not(feature = "browser"))]
async fn scan_in_browser(_config: Config) -> Result<Vec<RawEntry>> {
    bail!("this build does not include the `browser` feature")
}

fn http_fetcher(config: &Config) -> Arc<dyn PageFetcher> {
    Arc::new(HttpPageFetcher::new(&config.fetch))
}

fn print_result(result: &PipelineResult) {
    println!("\n📊 Run {}:", result.run_id);
    println!("   Listing entries: {}", result.discovered_entries);
    println!("   Skipped entries: {}", result.skipped_entries);
    println!("   Unique films: {}", result.unique_items);
    println!("   Enriched: {}", result.enriched_items);
    println!("   Soft failures: {}", result.soft_failures);
    println!("   Catalog items: {}", result.catalog_items);
    match &result.output_file {
        Some(output) => println!("   Output file: {}", output),
        None => println!("   Output file: not written"),
    }
    if let Some(published) = &result.published_file {
        println!("   Published: {}", published);
    }
    println!("   Duration: {:.1}s", result.duration_secs);
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// Returns whether the command succeeded.
async fn execute(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { overrides, browser } => {
            overrides.apply(&mut config)?;
            println!("🎬 Scraping {}...", config.venue.calendar_url);

            let outcome = if browser {
                run_in_browser(config).await
            } else {
                let fetcher = http_fetcher(&config);
                Pipeline::new(config, fetcher).run().await.map_err(Into::into)
            };

            match outcome {
                Ok(result) => {
                    print_result(&result);
                    if !result.success {
                        warn!("Run {} produced an empty catalog", result.run_id);
                    }
                    Ok(result.success)
                }
                Err(e) => {
                    error!("Run failed: {:#}", e);
                    println!("❌ Run failed: {e:#}");
                    Ok(false)
                }
            }
        }
        Commands::Listing { out, browser } => {
            let entries = if browser {
                scan_in_browser(config).await?
            } else {
                let fetcher = http_fetcher(&config);
                Pipeline::new(config, fetcher).scan().await?
            };
            let json = serde_json::to_string_pretty(&entries)?;
            match out {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&path, json)?;
                    info!("💾 Saved {} listing entries to {}", entries.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(true)
        }
        Commands::Aggregate {
            entries,
            enrichment,
            overrides,
        } => {
            overrides.apply(&mut config)?;
            let entries: Vec<RawEntry> = read_json(&entries)?;
            let enrichment: HashMap<String, EnrichmentResult> = match enrichment {
                Some(path) => read_json::<Vec<EnrichmentResult>>(&path)?
                    .into_iter()
                    .map(|result| (result.item_id.clone(), result))
                    .collect(),
                None => HashMap::new(),
            };

            let (aggregation, records) = Pipeline::assemble(&entries, &enrichment);
            let Some(persisted) = Pipeline::persist(&config.output, &records)? else {
                println!(
                    "❌ Aggregated {} entries into an empty catalog ({} rejected); nothing written",
                    entries.len(),
                    aggregation.rejected.len()
                );
                return Ok(false);
            };
            println!(
                "✅ Aggregated {} entries into {} films ({} rejected) -> {}",
                entries.len(),
                records.len(),
                aggregation.rejected.len(),
                persisted.output_file.display()
            );
            Ok(true)
        }
        Commands::Publish { source, dir } => {
            let source = source.unwrap_or_else(|| config.output.path.clone());
            let Some(dir) = dir.or(config.output.publish_dir) else {
                bail!("no publish directory given; pass --dir or set output.publish_dir");
            };
            // Refuse to publish something that is not a catalog.
            let records = CatalogBuilder::read_json(&source)
                .with_context(|| format!("{} is not a readable catalog", source.display()))?;
            if records.is_empty() {
                bail!("{} is an empty catalog; not publishing it", source.display());
            }
            let target = CatalogBuilder::publish(&source, &dir)?;
            println!("📤 Published {} films to {}", records.len(), target.display());
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    if !execute(cli).await? {
        std::process::exit(1);
    }
    Ok(())
}
