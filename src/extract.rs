//! Site-agnostic extraction contracts.
//!
//! Venue-specific parsers implement [`Extractor`] for detail pages and
//! [`ListingParser`] for calendar pages. Both are synchronous: they run over
//! markup that has already been fetched.

use crate::error::ExtractError;
use crate::types::{DetailFields, RawEntry};
use scraper::{ElementRef, Html};

/// One way of finding a value in a document; `None` means "try the next one".
pub type Strategy<T> = fn(&Html) -> Option<T>;

/// Turns a rendered detail page into best-effort fields.
pub trait Extractor: Send + Sync {
    /// Absent fields come back as `None`; only unparseable markup is an error.
    fn extract(&self, markup: &str) -> Result<DetailFields, ExtractError>;
}

/// Turns a rendered calendar page into raw listing entries.
pub trait ListingParser: Send + Sync {
    fn parse_listing(&self, markup: &str, base_url: &str) -> Result<Vec<RawEntry>, ExtractError>;
}

/// Evaluate strategies in priority order and keep the first hit.
pub fn first_match<T>(document: &Html, chain: &[Strategy<T>]) -> Option<T> {
    chain.iter().find_map(|strategy| strategy(document))
}

/// Parse markup, rejecting input that is not a document at all.
pub fn parse_markup(markup: &str) -> Result<Html, ExtractError> {
    let trimmed = markup.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::TotalFailure("empty document".to_string()));
    }
    if !trimmed.contains('<') {
        return Err(ExtractError::TotalFailure(format!(
            "no markup found in {} bytes of input",
            trimmed.len()
        )));
    }
    Ok(Html::parse_document(markup))
}

/// Trimmed, whitespace-collapsed text of an element.
pub fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}
