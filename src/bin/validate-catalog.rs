use anyhow::{Context, Result};
use clap::Parser;
use jsonschema::JSONSchema;
use screenings_scraper::catalog::{audit, CatalogRecord};
use serde_json::Value;
use std::{fs, path::Path, path::PathBuf};

/// Check a catalog file: JSON Schema shape first, then per-film invariants.
#[derive(Parser, Debug)]
#[command(name = "validate-catalog", version, about = "Check an exported catalog file")]
struct Cli {
    /// Catalog JSON file
    path: PathBuf,

    /// Schema to check the shape against
    #[arg(long, default_value = "schemas/catalog.v1.json")]
    schema: PathBuf,
}

fn load_json(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// Schema violations as `message at /pointer` lines.
fn shape_problems(schema: Value, instance: &Value) -> Result<Vec<String>> {
    // jsonschema 0.17 compiles against a 'static schema
    let schema: &'static Value = Box::leak(Box::new(schema));
    let compiled = JSONSchema::options()
        .compile(schema)
        .context("Failed to compile JSON Schema")?;

    let problems = match compiled.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| format!("{} at {}", error, error.instance_path))
            .collect(),
    };
    Ok(problems)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let instance = load_json(&args.path)?;

    let mut problems = shape_problems(load_json(&args.schema)?, &instance)?;
    let mut films = 0;

    // Film-level checks only make sense once the shape is right.
    if problems.is_empty() {
        let records: Vec<CatalogRecord> = serde_json::from_value(instance)
            .with_context(|| format!("{} does not hold catalog records", args.path.display()))?;
        films = records.len();
        if records.is_empty() {
            problems.push("catalog has no films".to_string());
        }
        problems.extend(audit(&records).iter().map(ToString::to_string));
    }

    if problems.is_empty() {
        println!("✅ {} is valid ({films} films)", args.path.display());
        return Ok(());
    }

    eprintln!("❌ {} has {} problem(s):", args.path.display(), problems.len());
    for problem in &problems {
        eprintln!("- {problem}");
    }
    std::process::exit(1)
}
