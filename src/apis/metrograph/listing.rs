use crate::constants::FILM_ID_PARAM;
use crate::error::ExtractError;
use crate::extract::{element_text, has_class, parse_markup, ListingParser};
use crate::types::{RawEntry, Slot};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CALENDAR_DAY: Lazy<Selector> = Lazy::new(|| selector("div.calendar-list-day"));
static DAY_LABEL: Lazy<Selector> = Lazy::new(|| selector("div.date"));
static ITEM: Lazy<Selector> = Lazy::new(|| selector("div.item"));
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| selector("a.title"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));

static FILM_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{}=(\d+)", regex::escape(FILM_ID_PARAM))).expect("static regex")
});

/// Identity of a film, taken from its detail URL
pub fn extract_film_id(detail_url: &str) -> Option<String> {
    FILM_ID.captures(detail_url).map(|caps| caps[1].to_string())
}

/// Calendar-page parser: one entry per film per day.
#[derive(Debug, Default, Clone)]
pub struct MetrographListingParser;

impl MetrographListingParser {
    pub fn new() -> Self {
        Self
    }

    /// Showtime anchors carry a `title` attribute; the film's own title link does not count.
    fn showtimes(item: &ElementRef) -> Vec<Slot> {
        item.select(&ANCHOR)
            .filter(|link| {
                let attrs = link.value();
                attrs.attr("title").is_some() && attrs.attr("class").map(str::trim) != Some("title")
            })
            .map(|link| Slot::new(element_text(&link), !has_class(&link, "sold_out")))
            .collect()
    }
}

impl ListingParser for MetrographListingParser {
    fn parse_listing(&self, markup: &str, base_url: &str) -> Result<Vec<RawEntry>, ExtractError> {
        let document = parse_markup(markup)?;
        let base = Url::parse(base_url)
            .map_err(|e| ExtractError::TotalFailure(format!("invalid base url {base_url}: {e}")))?;

        let mut entries = Vec::new();
        for day in document.select(&CALENDAR_DAY) {
            let Some(label) = day.select(&DAY_LABEL).next() else {
                continue;
            };
            let date = element_text(&label);

            for item in day.select(&ITEM) {
                let Some(title_link) = item.select(&TITLE_LINK).next() else {
                    continue;
                };
                let Some(href) = title_link.value().attr("href").map(str::trim).filter(|h| !h.is_empty())
                else {
                    continue;
                };
                let detail_ref = match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(e) => {
                        debug!("Skipping unresolvable detail link {}: {}", href, e);
                        continue;
                    }
                };

                entries.push(RawEntry {
                    title: element_text(&title_link),
                    item_id: extract_film_id(&detail_ref),
                    detail_ref,
                    date: date.clone(),
                    slots: Self::showtimes(&item),
                });
            }
        }
        Ok(entries)
    }
}
