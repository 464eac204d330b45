use crate::error::ExtractError;
use crate::extract::{element_text, first_match, has_class, non_empty, parse_markup, Extractor, Strategy};
use crate::types::{DetailFields, Occurrence, Slot};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static POSTER: Lazy<Selector> = Lazy::new(|| selector(".movie-image img"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:image"]"#));
static INFO_HEADINGS: Lazy<Selector> = Lazy::new(|| selector(".movie-info h5"));
static HEADINGS_AND_PARAS: Lazy<Selector> = Lazy::new(|| selector("h4, h5, h6, p"));
static INFO_PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector(".movie-info > p"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static MODULE_PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector(".fl-module-content p"));
static BACK_LINK: Lazy<Selector> = Lazy::new(|| selector("a.back-link"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static DAY_CHOOSER: Lazy<Selector> = Lazy::new(|| selector(".film_day_chooser li a"));
static DAY_PANELS: Lazy<Selector> = Lazy::new(|| selector(r#"[id^="day_"]"#));
static DATE_PICKER: Lazy<Selector> = Lazy::new(|| selector(".date_picker_holder"));
static FILM_DAY: Lazy<Selector> = Lazy::new(|| selector(".film_day"));
static FILM_DAY_TITLE: Lazy<Selector> = Lazy::new(|| selector("h5.sr-only"));

static YEAR_RUNTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})\s*/\s*(\d+\s*min[a-z]*)").expect("static regex"));
static DIRECTOR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Director(?:s)?:\s*(.+)").expect("static regex"));

const SYNOPSIS_MIN_LEN: usize = 100;

/// Detail-page extractor for the venue's film pages.
#[derive(Debug, Default, Clone)]
pub struct MetrographExtractor;

impl MetrographExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for MetrographExtractor {
    fn extract(&self, markup: &str) -> Result<DetailFields, ExtractError> {
        let document = parse_markup(markup)?;

        let poster_chain: &[Strategy<String>] = &[poster_from_image, poster_from_og_meta];
        let director_chain: &[Strategy<String>] = &[director_from_info, director_from_any_line];
        let year_chain: &[Strategy<String>] = &[year_from_info_line, year_from_pattern];
        let runtime_chain: &[Strategy<String>] = &[runtime_from_info_line, runtime_from_pattern];
        let synopsis_chain: &[Strategy<String>] =
            &[synopsis_from_info, synopsis_from_module, synopsis_from_long_paragraph];
        let schedule_chain: &[Strategy<Vec<Occurrence>>] =
            &[schedule_from_day_chooser, schedule_from_date_picker, schedule_from_film_days];

        Ok(DetailFields {
            poster: first_match(&document, poster_chain),
            director: first_match(&document, director_chain),
            year: first_match(&document, year_chain),
            runtime: first_match(&document, runtime_chain),
            synopsis: first_match(&document, synopsis_chain),
            schedule: first_match(&document, schedule_chain).unwrap_or_default(),
        })
    }
}

fn poster_from_image(doc: &Html) -> Option<String> {
    doc.select(&POSTER)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| non_empty(src.to_string()))
}

fn poster_from_og_meta(doc: &Html) -> Option<String> {
    doc.select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .and_then(|src| non_empty(src.to_string()))
}

fn director_from_info(doc: &Html) -> Option<String> {
    doc.select(&INFO_HEADINGS)
        .map(|h5| element_text(&h5))
        .find(|text| text.contains("Director:"))
        .and_then(|text| non_empty(text.replace("Director:", "")))
}

fn director_from_any_line(doc: &Html) -> Option<String> {
    doc.select(&HEADINGS_AND_PARAS)
        .map(|el| element_text(&el))
        .find_map(|text| {
            DIRECTOR_LINE
                .captures(&text)
                .and_then(|caps| non_empty(caps[1].to_string()))
        })
}

/// `"1979 / 161min"` split into its year and runtime halves.
fn info_line(doc: &Html) -> Option<(String, String)> {
    let line = doc.select(&INFO_HEADINGS).nth(1).map(|h5| element_text(&h5))?;
    let mut parts = line.split('/');
    let year = parts.next()?.trim().to_string();
    let runtime = parts.next()?.trim().to_string();
    Some((year, runtime))
}

fn year_from_info_line(doc: &Html) -> Option<String> {
    info_line(doc).and_then(|(year, _)| non_empty(year))
}

fn runtime_from_info_line(doc: &Html) -> Option<String> {
    info_line(doc)
        .filter(|(_, runtime)| runtime.contains("min"))
        .and_then(|(_, runtime)| non_empty(runtime))
}

fn year_from_pattern(doc: &Html) -> Option<String> {
    doc.select(&INFO_HEADINGS)
        .map(|h5| element_text(&h5))
        .find_map(|text| YEAR_RUNTIME.captures(&text).map(|caps| caps[1].to_string()))
}

fn runtime_from_pattern(doc: &Html) -> Option<String> {
    doc.select(&INFO_HEADINGS)
        .map(|h5| element_text(&h5))
        .find_map(|text| YEAR_RUNTIME.captures(&text).map(|caps| caps[2].to_string()))
}

fn has_back_link(element: &ElementRef) -> bool {
    element.select(&BACK_LINK).next().is_some()
}

fn synopsis_from_info(doc: &Html) -> Option<String> {
    let container = doc.select(&INFO_PARAGRAPH).next()?;
    let nested = container
        .select(&PARAGRAPH)
        .filter(|p| !has_back_link(p))
        .map(|p| element_text(&p))
        .find(|text| !text.is_empty());
    nested.or_else(|| non_empty(element_text(&container).replace("Back to films", "")))
}

fn synopsis_from_module(doc: &Html) -> Option<String> {
    doc.select(&MODULE_PARAGRAPH)
        .filter(|p| !p.html().contains("back-link"))
        .map(|p| element_text(&p))
        .find(|text| !text.is_empty())
}

fn synopsis_from_long_paragraph(doc: &Html) -> Option<String> {
    doc.select(&PARAGRAPH)
        .filter(|p| !has_back_link(p))
        .map(|p| element_text(&p))
        .find(|text| text.chars().count() > SYNOPSIS_MIN_LEN)
}

/// Showtime links inside one day panel; ticket buttons and blanks are ignored.
fn showtimes_in(panel: &ElementRef) -> Vec<Slot> {
    panel
        .select(&ANCHOR)
        .filter_map(|link| {
            let time = element_text(&link);
            if time.is_empty() || !time.contains(':') || time.contains("Buy") {
                return None;
            }
            Some(Slot::new(time, !has_class(&link, "sold_out")))
        })
        .collect()
}

fn non_empty_schedule(days: Vec<Occurrence>) -> Option<Vec<Occurrence>> {
    if days.is_empty() {
        None
    } else {
        Some(days)
    }
}

fn schedule_from_day_chooser(doc: &Html) -> Option<Vec<Occurrence>> {
    let mut days = Vec::new();
    for chooser in doc.select(&DAY_CHOOSER) {
        let Some(day_id) = chooser.value().attr("data-day") else {
            continue;
        };
        let label = element_text(&chooser);
        let panel_id = format!("day_{day_id}");
        let Some(panel) = doc
            .select(&DAY_PANELS)
            .find(|el| el.value().attr("id") == Some(panel_id.as_str()))
        else {
            continue;
        };
        let slots = showtimes_in(&panel);
        if !slots.is_empty() {
            days.push(Occurrence::new(label, slots));
        }
    }
    non_empty_schedule(days)
}

fn schedule_from_date_picker(doc: &Html) -> Option<Vec<Occurrence>> {
    let holder = doc.select(&DATE_PICKER).next()?;
    let label = non_empty(element_text(&holder)).or_else(|| {
        holder
            .select(&ANCHOR)
            .next()
            .and_then(|a| non_empty(element_text(&a)))
    })?;

    let panels: Vec<ElementRef> = doc.select(&FILM_DAY).collect();
    let single = panels.len() == 1;
    let mut days = Vec::new();
    for panel in &panels {
        let panel_label = panel
            .select(&FILM_DAY_TITLE)
            .next()
            .map(|h5| element_text(&h5))
            .unwrap_or_default();
        if panel_label.is_empty() || panel_label == label || single {
            let slots = showtimes_in(panel);
            if !slots.is_empty() {
                days.push(Occurrence::new(label.clone(), slots));
            }
        }
    }
    non_empty_schedule(days)
}

fn schedule_from_film_days(doc: &Html) -> Option<Vec<Occurrence>> {
    let days = doc
        .select(&FILM_DAY)
        .filter_map(|panel| {
            let label = panel
                .select(&FILM_DAY_TITLE)
                .next()
                .and_then(|h5| non_empty(element_text(&h5)))?;
            let slots = showtimes_in(&panel);
            (!slots.is_empty()).then(|| Occurrence::new(label, slots))
        })
        .collect();
    non_empty_schedule(days)
}
