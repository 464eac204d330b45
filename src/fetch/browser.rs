//! Headless Chromium fetcher for pages that only render their schedule client-side.

use super::{PageFetcher, Readiness, SessionTracker};
use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::{
    BrowserContextId, CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub struct BrowserPageFetcher {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    poll_interval: Duration,
    sessions: SessionTracker,
}

impl BrowserPageFetcher {
    /// Launch a headless browser shared by all fetches. Each fetch runs in its
    /// own browser context, so cookies and storage never carry over between items.
    pub async fn launch(config: &FetchConfig) -> Result<Self, FetchError> {
        let browser_config = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", config.user_agent))
            .window_size(1280, 800)
            .build()
            .map_err(|e| FetchError::Session(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FetchError::Session(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            sessions: SessionTracker::new(),
        })
    }

    /// Close the browser process; outstanding contexts are torn down with it.
    pub async fn shutdown(self) {
        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser cleanly: {}", e);
                }
            }
            // A tab cleanup task still holds it; dropping our handle kills the process once it finishes.
            Err(_) => debug!("Browser still referenced by tab cleanup"),
        }
        self.handler.abort();
    }

    async fn render(page: &Page, url: &str, selector: &str, poll: Duration) -> Result<String, FetchError> {
        page.goto(url).await.map_err(|e| FetchError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        while page.find_element(selector).await.is_err() {
            debug!("Waiting for {} on {}", selector, url);
            tokio::time::sleep(poll).await;
        }

        page.content()
            .await
            .map_err(|e| FetchError::Session(format!("failed to read rendered markup: {e}")))
    }
}

/// One tab inside a throwaway browser context.
///
/// Both are torn down on every exit path: `release` on the normal path, a
/// spawned cleanup from `Drop` when the owning future is cancelled.
struct IsolatedTab {
    browser: Arc<Browser>,
    context: BrowserContextId,
    page: Option<Page>,
    released: bool,
}

impl IsolatedTab {
    async fn open(browser: &Arc<Browser>) -> Result<Self, FetchError> {
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| FetchError::Session(format!("failed to create browser context: {e}")))?;

        // From here on the context is disposed even if opening the tab fails or is cancelled.
        let mut tab = Self {
            browser: Arc::clone(browser),
            context: created.result.browser_context_id.clone(),
            page: None,
            released: false,
        };

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = Some(tab.context.clone());
        let page = browser
            .new_page(target)
            .await
            .map_err(|e| FetchError::Session(format!("failed to open tab: {e}")))?;
        tab.page = Some(page);
        Ok(tab)
    }

    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Session("tab is not open".to_string()))
    }

    async fn teardown(browser: &Browser, context: BrowserContextId, page: Option<Page>) {
        if let Some(page) = page {
            if let Err(e) = page.close().await {
                debug!("Tab close failed: {}", e);
            }
        }
        if let Err(e) = browser.execute(DisposeBrowserContextParams::new(context)).await {
            debug!("Browser context disposal failed: {}", e);
        }
    }

    async fn release(mut self) {
        Self::teardown(&self.browser, self.context.clone(), self.page.take()).await;
        self.released = true;
    }
}

impl Drop for IsolatedTab {
    fn drop(&mut self) {
        if !self.released {
            let browser = Arc::clone(&self.browser);
            let context = self.context.clone();
            let page = self.page.take();
            tokio::spawn(async move {
                Self::teardown(&browser, context, page).await;
            });
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserPageFetcher {
    #[instrument(skip(self, readiness), fields(selector = %readiness.selector))]
    async fn fetch(&self, url: &str, readiness: &Readiness) -> Result<String, FetchError> {
        let _lease = self.sessions.open();
        let timed_out = || FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: readiness.timeout_ms(),
        };
        // Opening the context and tab counts against the same budget as rendering.
        let deadline = Instant::now() + readiness.timeout;

        let tab = tokio::time::timeout_at(deadline, IsolatedTab::open(&self.browser))
            .await
            .map_err(|_| timed_out())??;

        let outcome = tokio::time::timeout_at(deadline, async {
            Self::render(tab.page()?, url, &readiness.selector, self.poll_interval).await
        })
        .await;
        tab.release().await;

        outcome.unwrap_or_else(|_| Err(timed_out()))
    }

    fn active_sessions(&self) -> usize {
        self.sessions.active()
    }
}
