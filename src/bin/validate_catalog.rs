//! Validate a catalog file: dangling references are errors, suspicious data warnings.
//! Run: cargo run --bin validate_catalog [-- path/to/catalog.yaml]

use std::path::{Path, PathBuf};

use fitsim::data::{validate_catalog_file, Catalog, ValidationSeverity};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&manifest_dir).join("data").join("catalog.yaml"));

    if !path.exists() {
        eprintln!("Catalog not found: {}", path.display());
        std::process::exit(1);
    }

    let report = validate_catalog_file(&path)?;
    for diagnostic in &report.diagnostics {
        println!("{diagnostic}");
    }
    let errors = report.count(ValidationSeverity::Error);
    println!(
        "Validated {}: {} error(s), {} warning(s), {} note(s)",
        path.display(),
        errors,
        report.count(ValidationSeverity::Warning),
        report.count(ValidationSeverity::Info)
    );
    if errors > 0 {
        std::process::exit(1);
    }

    // A clean report must also build.
    let catalog = Catalog::load(&path)?;
    println!(
        "Loaded {} items, {} effects, {} attributes",
        catalog.len(),
        catalog.effects().len(),
        catalog.attributes().len()
    );
    Ok(())
}
