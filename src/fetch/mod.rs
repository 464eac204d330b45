//! Page acquisition. The only part of the crate that touches the network.
//!
//! Every call to [`PageFetcher::fetch`] opens its own session unit (an HTTP
//! client or a browser tab), waits for a readiness selector, and releases the
//! session before returning on every path.

#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

use crate::error::FetchError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "browser")]
pub use browser::BrowserPageFetcher;
pub use http::HttpPageFetcher;

/// What "the page is ready" means for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// CSS selector that must match before markup is returned
    pub selector: String,
    /// Upper bound on navigation plus waiting
    pub timeout: Duration,
}

impl Readiness {
    pub fn new(selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            selector: selector.into(),
            timeout,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch fully rendered markup for `url` once `readiness` is observed.
    async fn fetch(&self, url: &str, readiness: &Readiness) -> Result<String, FetchError>;

    /// Sessions currently open; zero whenever no fetch is in progress.
    fn active_sessions(&self) -> usize;
}

/// Counts open session units.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicUsize>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; it is released when the returned lease drops.
    pub fn open(&self) -> SessionLease {
        self.active.fetch_add(1, Ordering::SeqCst);
        SessionLease {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SessionLease {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
