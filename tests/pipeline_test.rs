use anyhow::Result;
use screenings_scraper::catalog::CatalogBuilder;
use screenings_scraper::config::Config;
use screenings_scraper::enrich::EnrichEvent;
use screenings_scraper::error::ScraperError;
use screenings_scraper::fetch::{HttpPageFetcher, PageFetcher};
use screenings_scraper::pipeline::Pipeline;
use std::sync::Arc;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALENDAR: &str = r#"
<html><body>
  <div class="calendar-list-day">
    <div class="date">Friday April 4</div>
    <div class="item">
      <a class="title" href="/film/?vista_film_id=101">Stalker</a>
      <a href="/t/1" title="Buy tickets">7:00pm</a>
    </div>
    <div class="item">
      <a class="title" href="/film/?vista_film_id=202">Tokyo Story</a>
      <a href="/t/2" title="Sold out" class="sold_out">3:00pm</a>
    </div>
  </div>
  <div class="calendar-list-day">
    <div class="date">Saturday April 5</div>
    <div class="item">
      <a class="title" href="/film/?vista_film_id=202">Tokyo Story</a>
      <a href="/t/3" title="Buy tickets">1:00pm</a>
      <a href="/t/4" title="Buy tickets">1:00pm</a>
    </div>
    <div class="item">
      <a class="title" href="/film/?vista_film_id=303">Close-Up</a>
      <a href="/t/5" title="Buy tickets">8:00pm</a>
    </div>
  </div>
</body></html>
"#;

const STALKER: &str = r#"
<html><body>
  <div class="movie-image"><img src="https://cdn.test/stalker.jpg"></div>
  <div class="movie-info">
    <h5>Director: Andrei Tarkovsky</h5>
    <h5>1979 / 161min</h5>
    <p>A guide leads two men through the Zone, an area where the normal laws of physics do not apply.</p>
  </div>
  <ul class="film_day_chooser">
    <li><a data-day="1">Friday April 4</a></li>
    <li><a data-day="2">Sunday April 6</a></li>
  </ul>
  <div id="day_1" class="film_day"><a href="/t/1">7:00pm</a></div>
  <div id="day_2" class="film_day"><a href="/t/9" class="sold_out">2:00pm</a></div>
</body></html>
"#;

const TOKYO_STORY: &str = r#"
<html><body>
  <div class="movie-info">
    <h5>Director: Yasujiro Ozu</h5>
    <h5>1953 / 136min</h5>
  </div>
</body></html>
"#;

async fn mount_page(server: &MockServer, id: &str, body: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/film/"))
        .and(query_param("vista_film_id", id))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.venue.base_url = server.uri();
    config.venue.calendar_url = format!("{}/calendar/", server.uri());
    config.fetch.concurrency = 2;
    config.fetch.timeout_ms = 2_000;
    config.fetch.listing_timeout_ms = 2_000;
    config.fetch.poll_interval_ms = 20;
    config.fetch.jitter_ms = 0;
    config.output.path = dir.join("output/catalog.json");
    config.output.publish_dir = Some(dir.join("public/data"));
    config
}

#[tokio::test]
async fn full_run_builds_and_publishes_catalog() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CALENDAR))
        .mount(&server)
        .await;
    mount_page(&server, "101", STALKER, 200).await;
    mount_page(&server, "202", TOKYO_STORY, 200).await;
    mount_page(&server, "303", "", 500).await;

    let dir = tempdir()?;
    let config = config_for(&server, dir.path());
    let fetcher = Arc::new(HttpPageFetcher::new(&config.fetch));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EnrichEvent>();

    let result = Pipeline::new(config, Arc::clone(&fetcher) as Arc<dyn PageFetcher>)
        .with_reporter(Arc::new(tx))
        .run()
        .await?;

    assert!(result.success);
    assert_eq!(result.discovered_entries, 4);
    assert_eq!(result.unique_items, 3);
    assert_eq!(result.enriched_items, 2);
    assert_eq!(result.soft_failures, 1);
    assert_eq!(result.catalog_items, 3);
    assert_eq!(fetcher.active_sessions(), 0);

    let records = CatalogBuilder::read_json(&dir.path().join("output/catalog.json"))?;
    let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Close-Up", "Stalker", "Tokyo Story"]);

    // Detail schedule replaces the single listing date.
    let stalker = &records[1];
    assert_eq!(stalker.director, "Andrei Tarkovsky");
    assert_eq!(stalker.screening_dates(), vec!["Friday April 4", "Sunday April 6"]);

    // No detail schedule: listing dates merged, duplicate 1:00pm collapsed.
    let tokyo = &records[2];
    assert_eq!(tokyo.year, "1953");
    assert_eq!(tokyo.screening_dates(), vec!["Friday April 4", "Saturday April 5"]);
    assert_eq!(tokyo.screenings[1].showtimes.len(), 1);
    assert_eq!(tokyo.screenings[0].showtimes[0].status, "Sold Out");

    // Failed enrichment still yields a listing-only record.
    assert_eq!(records[0].director, "");
    assert_eq!(records[0].first_screening_label(), "Saturday April 5 - 8:00pm");

    assert!(dir.path().join("public/data/films.json").exists());

    let mut failures = 0;
    while let Ok(event) = rx.try_recv() {
        if let EnrichEvent::SoftFailure(failure) = event {
            assert_eq!(failure.item_id, "303");
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
    Ok(())
}

#[tokio::test]
async fn empty_calendar_fails_the_run() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<div class=\"calendar-list-day\"></div>"),
        )
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let config = config_for(&server, dir.path());
    let fetcher = Arc::new(HttpPageFetcher::new(&config.fetch));

    let err = Pipeline::new(config, fetcher).run().await.unwrap_err();

    assert!(matches!(err, ScraperError::EmptyListing(_)));
    assert!(!dir.path().join("output/catalog.json").exists());
    Ok(())
}

#[tokio::test]
async fn empty_catalog_keeps_previous_publication() -> Result<()> {
    // The only item links to a film page without an id, so nothing can be aggregated.
    let calendar = r#"
        <div class="calendar-list-day">
          <div class="date">Friday April 4</div>
          <div class="item">
            <a class="title" href="/film/members-night">Members Night</a>
            <a href="/t/1" title="Buy tickets">7:00pm</a>
          </div>
        </div>"#;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(calendar))
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let published = dir.path().join("public/data/films.json");
    std::fs::create_dir_all(dir.path().join("public/data"))?;
    let previous = r#"[{"id":"101","title":"Stalker","screenings":[{"date":"Friday April 4","showtimes":[{"time":"7:00pm","status":"Available"}]}]}]"#;
    std::fs::write(&published, previous)?;

    let config = config_for(&server, dir.path());
    let fetcher = Arc::new(HttpPageFetcher::new(&config.fetch));
    let result = Pipeline::new(config, fetcher).run().await?;

    assert!(!result.success);
    assert_eq!(result.discovered_entries, 1);
    assert_eq!(result.catalog_items, 0);
    assert_eq!(result.output_file, None);
    assert_eq!(result.published_file, None);
    assert!(!dir.path().join("output/catalog.json").exists());
    assert_eq!(std::fs::read_to_string(&published)?, previous);
    Ok(())
}
