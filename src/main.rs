use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use estate_index::config::Settings;
use estate_index::index;
use estate_index::normalize::Normalizer;
use estate_index::pipeline::Pipeline;
use estate_index::store;

#[derive(Parser)]
#[command(name = "estate_index", about = "Listing extraction, normalization and indexing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, normalize and store one rendered listing page
    Ingest {
        /// Rendered HTML of the listing page
        html: PathBuf,
        /// URL the page was rendered from
        #[arg(short, long)]
        url: String,
        /// Property id (default: derived from the URL)
        #[arg(long)]
        id: Option<String>,
    },
    /// Re-normalize stored records, promote loose files and rebuild the index
    Organize,
    /// Rebuild the master index from stored records
    Reconcile,
    /// Show index statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;

    let result = match cli.command {
        Commands::Ingest { html, url, id } => {
            let page = std::fs::read_to_string(&html)
                .with_context(|| format!("reading {}", html.display()))?;
            let pipeline = Pipeline::from_settings(&settings)?;
            let out = pipeline.ingest(&page, &url, id.as_deref()).await?;
            println!(
                "Saved {} \"{}\" ({} images) to {}",
                out.record.id,
                out.record.title,
                out.record.images.len(),
                out.path.display()
            );
            if !out.first_seen {
                println!("Id was already known; record replaced, provenance unchanged.");
            }
            let report = index::reconcile(pipeline.normalizer())?;
            print_report(report.entries.len(), report.skipped);
            Ok(())
        }
        Commands::Organize => {
            let pipeline = Pipeline::from_settings(&settings)?;
            let (counts, report) = pipeline.organize()?;
            println!(
                "Normalized {} records ({} files skipped).",
                counts.normalized, counts.skipped
            );
            print_report(report.entries.len(), report.skipped);
            Ok(())
        }
        Commands::Reconcile => {
            let normalizer = Normalizer::from_settings(&settings);
            let report = index::reconcile(&normalizer)?;
            print_report(report.entries.len(), report.skipped);
            Ok(())
        }
        Commands::Stats => {
            let storage = settings.storage();
            let entries = store::load_index(&storage.index_path)?;
            if entries.is_empty() {
                println!("Index is empty. Run 'reconcile' or 'organize' first.");
                return Ok(());
            }
            let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
            let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
            for e in &entries {
                *by_source.entry(e.source.label()).or_default() += 1;
                *by_type.entry(e.listing_type.label()).or_default() += 1;
            }
            let images: usize = entries.iter().map(|e| e.image_count).sum();
            let provenance = store::load_provenance(&storage.provenance_path)?;

            println!("Properties: {}", entries.len());
            for (source, n) in &by_source {
                println!("  {:<12} {}", source, n);
            }
            for (kind, n) in &by_type {
                println!("  {:<12} {}", kind, n);
            }
            println!("Images:     {}", images);
            println!("Provenance: {}", provenance.len());

            let normalizer = Normalizer::from_settings(&settings);
            let records = index::load_indexed(&normalizer, &entries);
            let coverage = index::field_coverage(&records);
            println!("\nMissing fields ({} records read):", coverage.overall.records);
            print_coverage("All", &coverage.overall);
            for (source, c) in &coverage.by_source {
                print_coverage(source, c);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

fn print_coverage(label: &str, coverage: &index::FieldCoverage) {
    let cells: Vec<String> = index::COVERAGE_FIELDS
        .iter()
        .zip(coverage.missing)
        .map(|(field, n)| format!("{}={}", field, n))
        .collect();
    println!("  {:<12} {:>5}  {}", label, coverage.records, cells.join(" "));
}

fn print_report(indexed: usize, skipped: usize) {
    if skipped > 0 {
        println!("Indexed {} properties, {} files skipped.", indexed, skipped);
    } else {
        println!("Indexed {} properties.", indexed);
    }
}
