//! Site Sector CLI
//!
//! Usage:
//!   site-sector sites.csv --band-col Band --output out/sectors
//!   site-sector sites.csv --mode pci --modulo 6 --pci-col PCI -f kml

use anyhow::Result;
use clap::Parser;
use sector_cli::{run, Args};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("{}", "=".repeat(60));
    info!("Site Sector Generator");
    info!("{}", "=".repeat(60));

    let report = run(&args)?;
    let summary = &report.summary;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Mode:      {}", summary.mode);
    info!("Processed: {}", summary.processed_count);
    info!("Skipped:   {}", summary.skipped_count);
    info!("{}:", report.legend.title);
    for entry in report.legend.sorted_by_frequency() {
        info!("  {:10} {}", entry.label, entry.color.hex());
    }

    Ok(())
}
