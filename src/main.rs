use std::{env::args, process::ExitCode};

use anyhow::{Context, Result};
use sleuth::{
    physical::{db::Analysis, slack::SlackSource},
    schema::{Catalog, CatalogSummary, SchemaObject},
    AnalysisOptions, Database,
};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = args().nth(1) else {
        eprintln!("usage: sleuth <database>");
        return ExitCode::FAILURE;
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> Result<()> {
    let db = Database::open(path).with_context(|| format!("cannot analyze {path}"))?;

    println!("== Header ==");
    for field in db.header().translate().fields {
        println!("{:<32} {:<12} {}", field.label, field.raw, field.translated);
    }

    let analysis = db
        .analyze(&AnalysisOptions::from_env())
        .context("page classification failed")?;
    print_pages(&analysis);

    println!();
    println!("== Catalog ==");
    let catalog = db.catalog();
    match catalog.objects() {
        Ok(objects) => {
            let summary = CatalogSummary::group(objects);
            println!(
                "{} table(s), {} index(es), {} trigger(s), {} view(s)",
                summary.tables.len(),
                summary.indexes.len(),
                summary.triggers.len(),
                summary.views.len()
            );
            let row_count = |name: &str| match catalog.row_count(name) {
                Ok(Some(count)) => count.to_string(),
                Ok(None) => "unknown".to_owned(),
                Err(err) => {
                    warn!(object = name, "{err:#}");
                    "unknown".to_owned()
                }
            };

            print_objects("Tables", &summary.tables, |table| {
                format!("rows: {}", row_count(&table.name))
            });
            print_objects("Indexes", &summary.indexes, |index| {
                format!("on {}", index.tbl_name)
            });
            print_objects("Triggers", &summary.triggers, |trigger| {
                format!("on {}", trigger.tbl_name)
            });
            print_objects("Views", &summary.views, |view| {
                format!("rows: {}", row_count(&view.name))
            });
        }
        Err(err) => warn!("{err:#}"),
    }

    Ok(())
}

fn print_objects(title: &str, objects: &[SchemaObject], detail: impl Fn(&SchemaObject) -> String) {
    if objects.is_empty() {
        return;
    }

    println!();
    println!("-- {title}");
    for (i, object) in objects.iter().enumerate() {
        println!(
            "{:>4} {} ({}, root page {})",
            i + 1,
            object.name,
            detail(object),
            object.rootpage
        );
        println!("     {}", object.sql.as_deref().unwrap_or("<EMPTY>").replace('\n', " "));
    }
}

fn print_pages(analysis: &Analysis) {
    let classification = &analysis.classification;

    println!();
    println!("== Pages ({} bytes each) ==", classification.page_size);
    for (category, count) in classification.counts() {
        println!("{:<16} {count}", format!("{category:?}"));
    }
    println!("map: {}", classification.map());

    for page in &analysis.pages {
        println!();
        println!(
            "-- page at offset {}: {} row(s), {} slack region(s)",
            page.offset,
            page.rows.len(),
            page.slack.len()
        );
        for row in &page.rows {
            println!("  row {} @ {}: {:?}", row.row_id, row.cell_offset, row.values);
        }
        for region in page.slack.iter().filter(|region| !region.sanitized.is_empty()) {
            let source = match region.source {
                SlackSource::Gap => "gap".to_owned(),
                SlackSource::Freeblock { offset, .. } => format!("freeblock {offset}"),
            };
            println!(
                "  slack {source} @ {} ({} bytes): {}",
                region.offset,
                region.length,
                region.sanitized_text()
            );
        }
        for failure in &page.failures {
            println!("  ! {failure}");
        }
    }
}
