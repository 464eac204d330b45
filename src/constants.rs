/// Venue and extraction constants shared by the listing scanner and the extractor

pub const VENUE_NAME: &str = "Metrograph";
pub const BASE_URL: &str = "https://metrograph.com";
pub const CALENDAR_URL: &str = "https://metrograph.com/calendar/";

// Readiness signals: the fetcher waits for these before handing markup over
pub const LISTING_READY_SELECTOR: &str = ".calendar-list-day";
pub const DETAIL_READY_SELECTOR: &str = ".movie-info";

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_LISTING_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_JITTER_MS: u64 = 150;

pub const DEFAULT_OUTPUT_PATH: &str = "output/metrograph_movies.json";
pub const PUBLISHED_FILE_NAME: &str = "films.json";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub const STATUS_AVAILABLE: &str = "Available";
pub const STATUS_SOLD_OUT: &str = "Sold Out";
pub const COMING_SOON: &str = "Coming Soon";

/// Query parameter carrying the film identity in detail URLs
pub const FILM_ID_PARAM: &str = "vista_film_id";
