use jsonschema::JSONSchema;
use screenings_scraper::catalog::{audit, CatalogBuilder, CatalogIssue, CatalogRecord};
use screenings_scraper::types::{CatalogItem, Occurrence, Slot};
use serde_json::json;

fn compiled_schema() -> JSONSchema {
    let schema = include_str!("../schemas/catalog.v1.json");
    let schema_json: serde_json::Value = serde_json::from_str(schema).unwrap();
    let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema_json));
    JSONSchema::options().compile(schema_static).unwrap()
}

#[test]
fn sample_catalog_is_valid() {
    let compiled = compiled_schema();
    let instance: serde_json::Value =
        serde_json::from_str(include_str!("resources/catalog_sample.json")).unwrap();
    assert!(compiled.is_valid(&instance));
}

#[test]
fn sample_catalog_passes_film_checks() {
    let records: Vec<CatalogRecord> =
        serde_json::from_str(include_str!("resources/catalog_sample.json")).unwrap();
    assert_eq!(records.len(), 2);
    assert!(audit(&records).is_empty());
}

#[test]
fn schema_valid_catalog_can_still_fail_film_checks() {
    let compiled = compiled_schema();
    let instance = json!([{
        "id": "1",
        "title": "Stalker",
        "director": "",
        "year": "",
        "runtime": "",
        "synopsis": "",
        "poster_url": "",
        "detail_url": "",
        "screenings": [
            {"date": "Tue", "showtimes": [{"time": "7:00", "status": "Available"}]},
            {"date": "Mon", "showtimes": [{"time": "9:00", "status": "Sold Out"}, {"time": "9:00", "status": "Available"}]}
        ]
    }]);
    assert!(compiled.is_valid(&instance));

    let records: Vec<CatalogRecord> = serde_json::from_value(instance).unwrap();
    let issues = audit(&records);
    assert!(issues.contains(&CatalogIssue::UnsortedDates {
        id: "1".to_string(),
        date: "Mon".to_string()
    }));
    assert!(issues.contains(&CatalogIssue::UnsortedTimes {
        id: "1".to_string(),
        date: "Mon".to_string(),
        time: "9:00".to_string()
    }));
}

#[test]
fn built_catalog_is_valid() {
    let compiled = compiled_schema();
    let item = CatalogItem {
        occurrences: vec![Occurrence::new(
            "Mon",
            vec![Slot::new("7:00", true), Slot::new("9:00", false)],
        )],
        ..CatalogItem::new("1", "Stalker", "https://metrograph.com/film/?vista_film_id=1")
    };
    let records = CatalogBuilder::build(&[item]);
    let instance = serde_json::to_value(&records).unwrap();
    assert!(compiled.is_valid(&instance));
}

#[test]
fn unknown_status_is_rejected() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/catalog_sample.json")).unwrap();
    invalid[0]["screenings"][0]["showtimes"][0]["status"] = json!("Limited");
    assert!(!compiled.is_valid(&invalid), "status must be Available or Sold Out");
}

#[test]
fn film_without_screenings_is_rejected() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/catalog_sample.json")).unwrap();
    invalid[1]["screenings"] = json!([]);
    assert!(!compiled.is_valid(&invalid));
}

#[test]
fn optional_fields_must_be_present_as_strings() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/catalog_sample.json")).unwrap();
    invalid[1]["director"] = json!(null);
    assert!(!compiled.is_valid(&invalid));
}
