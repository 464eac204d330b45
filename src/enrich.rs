//! Bounded-concurrency enrichment of discovered items.
//!
//! One task per unique item id fetches the item's detail page and extracts
//! fields from it. A semaphore caps how many tasks hold a session at once;
//! the batch is awaited as a whole and per-item failures come back as values.

use crate::error::{ExtractError, FetchError};
use crate::extract::Extractor;
use crate::fetch::{PageFetcher, Readiness};
use crate::types::{EnrichmentResult, RawEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The task died before producing a result, usually by panicking.
    #[error("enrichment task aborted: {0}")]
    Aborted(String),
}

/// An error confined to one item. The item is left out of the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    pub item_id: String,
    pub detail_ref: String,
    pub cause: FailureCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichEvent {
    Started { item_id: String, detail_ref: String },
    Enriched { item_id: String, schedule_days: usize },
    SoftFailure(SoftFailure),
}

/// Receives per-item outcomes as they happen.
pub trait EnrichReporter: Send + Sync {
    fn report(&self, event: EnrichEvent);
}

/// Forwards events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl EnrichReporter for TracingReporter {
    fn report(&self, event: EnrichEvent) {
        match event {
            EnrichEvent::Started { item_id, detail_ref } => {
                debug!("Enriching {} from {}", item_id, detail_ref);
            }
            EnrichEvent::Enriched { item_id, schedule_days } => {
                info!("✅ Enriched {} ({} scheduled days)", item_id, schedule_days);
            }
            EnrichEvent::SoftFailure(failure) => {
                warn!(
                    "Skipping {} ({}): {}",
                    failure.item_id, failure.detail_ref, failure.cause
                );
            }
        }
    }
}

impl EnrichReporter for UnboundedSender<EnrichEvent> {
    fn report(&self, event: EnrichEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

impl<F> EnrichReporter for F
where
    F: Fn(EnrichEvent) + Send + Sync,
{
    fn report(&self, event: EnrichEvent) {
        self(event)
    }
}

/// Everything one enrichment batch produced.
#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    pub results: HashMap<String, EnrichmentResult>,
    /// Ids enriched in this batch; feed back as `visited` to avoid refetching
    pub succeeded: HashSet<String>,
    pub failures: Vec<SoftFailure>,
    /// Ids skipped because they were already visited
    pub skipped: usize,
}

/// One `(item_id, detail_ref)` per id, first seen wins. Entries without an id are ignored.
pub fn unique_refs(entries: &[RawEntry]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| entry.identity().ok())
        .filter(|(id, _)| seen.insert(id.to_string()))
        .map(|(id, detail_ref)| (id.to_string(), detail_ref.to_string()))
        .collect()
}

pub struct ConcurrentEnricher {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    readiness: Readiness,
    concurrency: usize,
    reporter: Arc<dyn EnrichReporter>,
}

impl ConcurrentEnricher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
        readiness: Readiness,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            readiness,
            concurrency: concurrency.max(1),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn EnrichReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn enrich(&self, entries: &[RawEntry]) -> EnrichmentOutcome {
        self.enrich_unvisited(entries, &HashSet::new()).await
    }

    /// Enrich every unique id in `entries` that is not already in `visited`.
    #[instrument(skip_all, fields(entries = entries.len(), concurrency = self.concurrency))]
    pub async fn enrich_unvisited(
        &self,
        entries: &[RawEntry],
        visited: &HashSet<String>,
    ) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, (String, String)> = HashMap::new();

        for (item_id, detail_ref) in unique_refs(entries) {
            if visited.contains(&item_id) {
                outcome.skipped += 1;
                continue;
            }

            let permits = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let reporter = Arc::clone(&self.reporter);
            let readiness = self.readiness.clone();
            let identity = (item_id.clone(), detail_ref.clone());

            let handle = tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        reporter.report(EnrichEvent::Started {
                            item_id: item_id.clone(),
                            detail_ref: detail_ref.clone(),
                        });
                        enrich_one(&*fetcher, &*extractor, &readiness, &item_id, &detail_ref).await
                    }
                    Err(_) => Err(FetchError::Session("enrichment permits closed".to_string()).into()),
                };

                match result {
                    Ok(enriched) => {
                        reporter.report(EnrichEvent::Enriched {
                            item_id: item_id.clone(),
                            schedule_days: enriched.all_occurrences.as_ref().map_or(0, Vec::len),
                        });
                        Ok(enriched)
                    }
                    Err(cause) => {
                        let failure = SoftFailure {
                            item_id,
                            detail_ref,
                            cause,
                        };
                        reporter.report(EnrichEvent::SoftFailure(failure.clone()));
                        Err(failure)
                    }
                }
            });
            pending.insert(handle.id(), identity);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(enriched))) => {
                    pending.remove(&id);
                    outcome.succeeded.insert(enriched.item_id.clone());
                    outcome.results.insert(enriched.item_id.clone(), enriched);
                }
                Ok((id, Err(failure))) => {
                    pending.remove(&id);
                    outcome.failures.push(failure);
                }
                Err(e) => match pending.remove(&e.id()) {
                    Some((item_id, detail_ref)) => {
                        error!("Enrichment task for {} aborted: {}", item_id, e);
                        let failure = SoftFailure {
                            item_id,
                            detail_ref,
                            cause: FailureCause::Aborted(e.to_string()),
                        };
                        self.reporter.report(EnrichEvent::SoftFailure(failure.clone()));
                        outcome.failures.push(failure);
                    }
                    None => error!("Untracked enrichment task aborted: {}", e),
                },
            }
        }

        outcome
    }
}

async fn enrich_one(
    fetcher: &dyn PageFetcher,
    extractor: &dyn Extractor,
    readiness: &Readiness,
    item_id: &str,
    detail_ref: &str,
) -> Result<EnrichmentResult, FailureCause> {
    let markup = fetcher.fetch(detail_ref, readiness).await?;
    let fields = extractor.extract(&markup)?;
    Ok(EnrichmentResult::from_fields(item_id, detail_ref, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SessionTracker;
    use crate::types::{DetailFields, Occurrence, Slot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the URL back as markup after a fixed delay, tracking peak parallelism.
    struct DelayedFetcher {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        failing: HashSet<String>,
        sessions: SessionTracker,
    }

    impl DelayedFetcher {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                failing: HashSet::new(),
                sessions: SessionTracker::new(),
            }
        }

        fn failing_on(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl PageFetcher for DelayedFetcher {
        async fn fetch(&self, url: &str, readiness: &Readiness) -> Result<String, FetchError> {
            let _lease = self.sessions.open();
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(url) {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: readiness.timeout_ms(),
                });
            }
            Ok(format!("<div class=\"movie-info\">{url}</div>"))
        }

        fn active_sessions(&self) -> usize {
            self.sessions.active()
        }
    }

    /// Director is the page text; pages mentioning "broken" are unparseable.
    struct EchoExtractor;

    impl Extractor for EchoExtractor {
        fn extract(&self, markup: &str) -> Result<DetailFields, ExtractError> {
            if markup.contains("explode") {
                panic!("extractor blew up");
            }
            if markup.contains("broken") {
                return Err(ExtractError::TotalFailure("broken page".to_string()));
            }
            Ok(DetailFields {
                director: Some(markup.to_string()),
                schedule: vec![Occurrence::new("Mon", vec![Slot::new("7:00", true)])],
                ..Default::default()
            })
        }
    }

    fn entry(id: &str, date: &str) -> RawEntry {
        RawEntry {
            title: format!("Film {id}"),
            detail_ref: format!("https://venue.test/film/{id}"),
            item_id: Some(id.to_string()),
            date: date.to_string(),
            slots: vec![Slot::new("7:00", true)],
        }
    }

    fn enricher(fetcher: Arc<DelayedFetcher>, concurrency: usize) -> ConcurrentEnricher {
        ConcurrentEnricher::new(
            fetcher,
            Arc::new(EchoExtractor),
            Readiness::new(".movie-info", Duration::from_secs(1)),
            concurrency,
        )
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let fetcher = Arc::new(DelayedFetcher::new(50));
        let entries: Vec<_> = (1..=5).map(|i| entry(&i.to_string(), "Mon")).collect();

        let outcome = enricher(Arc::clone(&fetcher), 2).enrich(&entries).await;

        assert_eq!(outcome.results.len(), 5);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(fetcher.active_sessions(), 0);
    }

    #[tokio::test]
    async fn runs_units_in_parallel_up_to_the_limit() {
        let fetcher = Arc::new(DelayedFetcher::new(100));
        let entries: Vec<_> = (1..=4).map(|i| entry(&i.to_string(), "Mon")).collect();

        enricher(Arc::clone(&fetcher), 4).enrich(&entries).await;

        assert!(fetcher.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let fetcher = Arc::new(DelayedFetcher::new(5).failing_on("https://venue.test/film/2"));
        let mut broken = entry("3", "Mon");
        broken.detail_ref = "https://venue.test/broken/3".to_string();
        let entries = vec![entry("1", "Mon"), entry("2", "Mon"), broken];

        let outcome = enricher(Arc::clone(&fetcher), 3).enrich(&entries).await;

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results.contains_key("1"));
        assert_eq!(outcome.succeeded, HashSet::from(["1".to_string()]));
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .any(|f| f.item_id == "2" && matches!(f.cause, FailureCause::Fetch(FetchError::Timeout { .. }))));
        assert!(outcome
            .failures
            .iter()
            .any(|f| f.item_id == "3" && matches!(f.cause, FailureCause::Extract(_))));
        assert_eq!(fetcher.active_sessions(), 0);
    }

    #[tokio::test]
    async fn panicking_task_becomes_a_soft_failure() {
        let fetcher = Arc::new(DelayedFetcher::new(1));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EnrichEvent>();
        let mut exploding = entry("2", "Mon");
        exploding.detail_ref = "https://venue.test/explode/2".to_string();
        let entries = vec![entry("1", "Mon"), exploding];

        let outcome = enricher(Arc::clone(&fetcher), 2)
            .with_reporter(Arc::new(tx))
            .enrich(&entries)
            .await;

        assert!(outcome.results.contains_key("1"));
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.item_id, "2");
        assert_eq!(failure.detail_ref, "https://venue.test/explode/2");
        assert!(matches!(failure.cause, FailureCause::Aborted(_)));
        assert_eq!(fetcher.active_sessions(), 0);

        let mut reported = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EnrichEvent::SoftFailure(failure) = event {
                reported.push(failure.item_id);
            }
        }
        assert_eq!(reported, vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn fetches_each_id_once_with_first_seen_ref() {
        let fetcher = Arc::new(DelayedFetcher::new(1));
        let mut later = entry("1", "Tue");
        later.detail_ref = "https://venue.test/film/1?again".to_string();
        let entries = vec![entry("1", "Mon"), later, entry("2", "Mon")];

        let outcome = enricher(Arc::clone(&fetcher), 2).enrich(&entries).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome.results["1"].detail_ref.as_deref(),
            Some("https://venue.test/film/1")
        );
    }

    #[tokio::test]
    async fn skips_visited_ids() {
        let fetcher = Arc::new(DelayedFetcher::new(1));
        let entries = vec![entry("1", "Mon"), entry("2", "Mon")];
        let visited = HashSet::from(["1".to_string()]);

        let outcome = enricher(Arc::clone(&fetcher), 2)
            .enrich_unvisited(&entries, &visited)
            .await;

        assert_eq!(outcome.skipped, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(outcome.results.contains_key("2"));
    }

    #[tokio::test]
    async fn reports_through_channel() {
        let fetcher = Arc::new(DelayedFetcher::new(1).failing_on("https://venue.test/film/2"));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EnrichEvent>();
        let entries = vec![entry("1", "Mon"), entry("2", "Mon")];

        enricher(fetcher, 2)
            .with_reporter(Arc::new(tx))
            .enrich(&entries)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events.iter().filter(|e| matches!(e, EnrichEvent::Started { .. })).count(),
            2
        );
        assert!(events.contains(&EnrichEvent::Enriched {
            item_id: "1".to_string(),
            schedule_days: 1
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, EnrichEvent::SoftFailure(f) if f.item_id == "2")));
    }

    #[tokio::test]
    async fn accepts_closure_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = move |event: EnrichEvent| {
            if let EnrichEvent::Enriched { item_id, .. } = event {
                sink.lock().unwrap().push(item_id);
            }
        };

        enricher(Arc::new(DelayedFetcher::new(1)), 1)
            .with_reporter(Arc::new(reporter))
            .enrich(&[entry("9", "Mon")])
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["9".to_string()]);
    }

    #[test]
    fn unique_refs_ignores_entries_without_identity() {
        let mut anonymous = entry("x", "Mon");
        anonymous.item_id = None;
        let refs = unique_refs(&[anonymous, entry("1", "Mon"), entry("1", "Tue")]);
        assert_eq!(
            refs,
            vec![("1".to_string(), "https://venue.test/film/1".to_string())]
        );
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(enricher(Arc::new(DelayedFetcher::new(1)), 0).concurrency(), 1);
    }
}
