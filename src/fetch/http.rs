use super::{PageFetcher, Readiness, SessionTracker};
use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};

/// Plain HTTP fetcher. Each fetch builds its own client so no cookies or
/// connections leak from one item to the next.
pub struct HttpPageFetcher {
    user_agent: String,
    poll_interval: Duration,
    jitter_ms: u64,
    sessions: SessionTracker,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            jitter_ms: config.jitter_ms,
            sessions: SessionTracker::new(),
        }
    }

    fn open_client(&self) -> Result<Client, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Client::builder()
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Session(format!("failed to build HTTP client: {e}")))
    }

    async fn load(client: &Client, url: &str) -> Result<String, FetchError> {
        let navigation = |message: String| FetchError::Navigation {
            url: url.to_string(),
            message,
        };
        let response = client.get(url).send().await.map_err(|e| navigation(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(navigation(format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| navigation(e.to_string()))
    }

    async fn pause(&self) {
        if self.jitter_ms == 0 {
            return;
        }
        let delay = rand::thread_rng().gen_range(0..=self.jitter_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Reload until the readiness selector matches. The caller bounds this with the timeout.
    async fn load_until_ready(
        &self,
        client: &Client,
        url: &str,
        selector: &Selector,
    ) -> Result<String, FetchError> {
        loop {
            self.pause().await;
            let markup = Self::load(client, url).await?;
            if is_ready(&markup, selector) {
                return Ok(markup);
            }
            debug!("Readiness selector not matched yet for {}", url);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn is_ready(markup: &str, selector: &Selector) -> bool {
    Html::parse_document(markup).select(selector).next().is_some()
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self, readiness), fields(selector = %readiness.selector))]
    async fn fetch(&self, url: &str, readiness: &Readiness) -> Result<String, FetchError> {
        let selector = Selector::parse(&readiness.selector).map_err(|e| {
            FetchError::Session(format!("invalid readiness selector '{}': {e}", readiness.selector))
        })?;

        let _lease = self.sessions.open();
        let client = self.open_client()?;

        match tokio::time::timeout(readiness.timeout, self.load_until_ready(&client, url, &selector)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: readiness.timeout_ms(),
            }),
        }
    }

    fn active_sessions(&self) -> usize {
        self.sessions.active()
    }
}
