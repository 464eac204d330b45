//! Consolidates raw listing entries and enrichment results into one record per item.

use crate::error::ScraperError;
use crate::types::{CatalogItem, EnrichmentResult, Occurrence, RawEntry, Slot};
use std::collections::HashMap;

/// Output of one aggregation pass.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Complete items sorted by title
    pub items: Vec<CatalogItem>,
    /// Entries rejected for a missing detail reference or id
    pub rejected: Vec<ScraperError>,
    /// Items built but dropped for having no title or no occurrences
    pub incomplete: usize,
}

pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(
        entries: &[RawEntry],
        enrichment: &HashMap<String, EnrichmentResult>,
    ) -> Aggregation {
        let mut aggregation = Aggregation::default();
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&RawEntry>> = HashMap::new();

        for entry in entries {
            match entry.identity() {
                Ok((id, _)) => {
                    let group = groups.entry(id).or_insert_with(|| {
                        order.push(id);
                        Vec::new()
                    });
                    group.push(entry);
                }
                Err(e) => aggregation.rejected.push(e),
            }
        }

        let mut items = Vec::with_capacity(order.len());
        for id in order {
            let group = &groups[id];
            let item = Self::build_item(id, group, enrichment.get(id));
            if item.is_complete() {
                items.push(item);
            } else {
                aggregation.incomplete += 1;
            }
        }

        // Stable, so equal titles keep first-seen order.
        items.sort_by(|a, b| a.title.cmp(&b.title));
        aggregation.items = items;
        aggregation
    }

    fn build_item(id: &str, group: &[&RawEntry], enriched: Option<&EnrichmentResult>) -> CatalogItem {
        let first = group[0];
        let mut item = CatalogItem::new(id, first.title.trim(), first.detail_ref.as_str());

        if let Some(result) = enriched {
            apply_enrichment(&mut item, result);
        }

        match enriched.and_then(|r| r.all_occurrences.as_ref()) {
            Some(schedule) => {
                for occurrence in schedule {
                    merge_entry(&mut item, &occurrence.date, &occurrence.slots);
                }
            }
            None => {
                for entry in group {
                    merge_entry(&mut item, &entry.date, &entry.slots);
                }
            }
        }

        normalize(&mut item);
        item
    }
}

/// Copy enrichment scalars into fields that are still empty. Never overwrites.
pub fn apply_enrichment(item: &mut CatalogItem, result: &EnrichmentResult) {
    fill(&mut item.director, &result.director);
    fill(&mut item.year, &result.year);
    fill(&mut item.runtime, &result.runtime);
    fill(&mut item.synopsis, &result.synopsis);
    fill(&mut item.poster_url, &result.poster);
    fill(&mut item.detail_url, &result.detail_ref);
}

fn fill(field: &mut String, value: &Option<String>) {
    if !field.trim().is_empty() {
        return;
    }
    if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *field = value.to_string();
    }
}

/// Union `slots` into the occurrence for `date`, keyed on time.
///
/// A blank date or an empty slot list contributes nothing. When a time is
/// already present the existing slot is kept.
pub fn merge_entry(item: &mut CatalogItem, date: &str, slots: &[Slot]) {
    let date = date.trim();
    if date.is_empty() || slots.is_empty() {
        return;
    }

    let index = match item.occurrences.iter().position(|o| o.date == date) {
        Some(index) => index,
        None => {
            item.occurrences.push(Occurrence::new(date, Vec::new()));
            item.occurrences.len() - 1
        }
    };

    let occurrence = &mut item.occurrences[index];
    for slot in slots {
        let time = slot.time.trim();
        if time.is_empty() || occurrence.slots.iter().any(|s| s.time == time) {
            continue;
        }
        occurrence.slots.push(Slot::new(time, slot.available));
    }

    if occurrence.slots.is_empty() {
        item.occurrences.remove(index);
    }
}

/// Sort occurrences by date and slots by time, both lexically.
pub fn normalize(item: &mut CatalogItem) {
    for occurrence in &mut item.occurrences {
        occurrence.slots.sort_by(|a, b| a.time.cmp(&b.time));
    }
    item.occurrences.sort_by(|a, b| a.date.cmp(&b.date));
}
