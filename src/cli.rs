use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::config::EngineConfig;
use crate::data::catalog::Catalog;
use crate::data::validate::{validate_catalog_file, ValidationSeverity};
use crate::engine::report::AttributeReport;
use crate::parallel::{evaluate_fits, WorkerPool};
use crate::persist::FitComposition;
use crate::service::market::{Market, SearchFilter};

const USAGE: &str = "usage: fitsim <eval|report|batch|search|validate>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Eval,
    Report,
    Batch,
    Search,
    Validate,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("eval") => Some(Command::Eval),
        Some("report") => Some(Command::Report),
        Some("batch") => Some(Command::Batch),
        Some("search") => Some(Command::Search),
        Some("validate") => Some(Command::Validate),
        _ => None,
    }
}

/// Dispatch a command line; returns the process exit code (0 ok, 1 failure, 2 usage).
pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Eval) => handle_eval(args),
        Some(Command::Report) => handle_report(args),
        Some(Command::Batch) => handle_batch(args),
        Some(Command::Search) => handle_search(args),
        Some(Command::Validate) => handle_validate(args),
        None => {
            eprintln!("{USAGE}");
            2
        }
    }
}

fn load_catalog(config: &EngineConfig) -> Option<Arc<Catalog>> {
    match Catalog::load(&config.catalog_path) {
        Ok(catalog) => Some(catalog),
        Err(err) => {
            eprintln!(
                "failed to load catalog {}: {err}",
                config.catalog_path.display()
            );
            None
        }
    }
}

fn print_json(value: &serde_json::Value) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize output: {err}");
            1
        }
    }
}

fn handle_eval(args: &[String]) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: fitsim eval <fit.json|fit.yaml> [attribute...]");
        return 2;
    };
    let config = EngineConfig::load_from_env();
    let Some(catalog) = load_catalog(&config) else {
        return 1;
    };
    let composition = match FitComposition::from_file(Path::new(path)) {
        Ok(composition) => composition,
        Err(err) => {
            eprintln!("failed to read fit {path}: {err}");
            return 1;
        }
    };
    let (mut fit, rehydrate) = match composition.rehydrate(&catalog, config.stacking) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load fit {path}: {err}");
            return 1;
        }
    };

    let requested: Vec<String> = args[3..].to_vec();
    let report = if requested.is_empty() {
        AttributeReport::collect(&mut fit)
    } else {
        AttributeReport::for_attributes(&mut fit, &requested)
    };
    let values: BTreeMap<&str, Option<f64>> = report
        .rows
        .iter()
        .filter(|row| row.target == "ship")
        .map(|row| (row.attribute.as_str(), row.value))
        .collect();

    print_json(&json!({
        "fit": report.fit,
        "hull": fit.hull().definition().name,
        "values": values,
        "dropped": rehydrate.dropped,
    }))
}

fn handle_report(args: &[String]) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: fitsim report <fit.json|fit.yaml> [--csv]");
        return 2;
    };
    let as_csv = args.iter().any(|arg| arg == "--csv");
    let config = EngineConfig::load_from_env();
    let Some(catalog) = load_catalog(&config) else {
        return 1;
    };
    let loaded = FitComposition::from_file(Path::new(path))
        .and_then(|composition| composition.rehydrate(&catalog, config.stacking));
    let (mut fit, _) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load fit {path}: {err}");
            return 1;
        }
    };

    let report = AttributeReport::collect(&mut fit);
    let written = if as_csv {
        report.write_csv(io::stdout().lock())
    } else {
        report.to_json().map(|payload| println!("{payload}"))
    };
    match written {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("failed to write report: {err}");
            1
        }
    }
}

fn handle_batch(args: &[String]) -> i32 {
    let mut paths = Vec::new();
    let mut workers = 0usize;
    let mut rest = args.iter().skip(2);
    while let Some(arg) = rest.next() {
        if arg == "--workers" {
            workers = parse_usize_arg(rest.next(), "workers", 0);
        } else {
            paths.push(PathBuf::from(arg));
        }
    }
    if paths.is_empty() {
        eprintln!("usage: fitsim batch <fit>... [--workers N]");
        return 2;
    }

    let config = EngineConfig::load_from_env();
    let Some(catalog) = load_catalog(&config) else {
        return 1;
    };
    let mut compositions = Vec::with_capacity(paths.len());
    for path in &paths {
        match FitComposition::from_file(path) {
            Ok(composition) => compositions.push(composition),
            Err(err) => {
                eprintln!("failed to read fit {}: {err}", path.display());
                return 1;
            }
        }
    }

    let results = evaluate_fits(
        &compositions,
        &catalog,
        config.stacking,
        &[],
        &WorkerPool::with_workers(workers),
    );
    let mut failed = 0;
    let payload: Vec<serde_json::Value> = results
        .into_iter()
        .zip(&paths)
        .map(|(result, path)| match result {
            Ok(evaluation) => json!({
                "path": path.display().to_string(),
                "fit": evaluation.name,
                "rows": evaluation.report.rows,
                "dropped": evaluation.rehydrate.dropped,
            }),
            Err(err) => {
                failed += 1;
                json!({ "path": path.display().to_string(), "error": err.to_string() })
            }
        })
        .collect();

    let code = print_json(&serde_json::Value::Array(payload));
    if failed > 0 {
        1
    } else {
        code
    }
}

fn handle_search(args: &[String]) -> i32 {
    let Some(query) = args.get(2) else {
        eprintln!("usage: fitsim search <text> [--all]");
        return 2;
    };
    let filter = if args.iter().any(|arg| arg == "--all") {
        SearchFilter::All
    } else {
        SearchFilter::Fittable
    };
    let config = EngineConfig::load_from_env();
    let Some(catalog) = load_catalog(&config) else {
        return 1;
    };
    let market = Market::new(catalog);
    let found: Vec<serde_json::Value> = market
        .search(query, &filter)
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "group": market.group_by_item(item),
                "category": market.category_by_item(item),
            })
        })
        .collect();
    print_json(&serde_json::Value::Array(found))
}

fn handle_validate(args: &[String]) -> i32 {
    let path = match args.get(2) {
        Some(path) => PathBuf::from(path),
        None => EngineConfig::load_from_env().catalog_path,
    };

    match validate_catalog_file(&path) {
        Ok(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("- {diagnostic}");
            }
            if report.has_errors() {
                eprintln!(
                    "validation failed: {} error(s), {} warning(s)",
                    report.count(ValidationSeverity::Error),
                    report.count(ValidationSeverity::Warning)
                );
                1
            } else {
                println!(
                    "validation passed: {} ({} warning(s))",
                    path.display(),
                    report.count(ValidationSeverity::Warning)
                );
                0
            }
        }
        Err(err) => {
            eprintln!("validation failed: {}: {err}", path.display());
            1
        }
    }
}

fn parse_usize_arg(raw: Option<&String>, name: &str, default: usize) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}
