//! RfmForge: RFM scoring and customer segmentation CLI
//!
//! Entrypoint that orchestrates data loading, scoring, report output and
//! prediction for a hypothetical customer.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rfmforge::{create_segment_chart, run_file, viz, Args};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    // Check if in prediction mode
    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&args, rfm_values)?;
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Score a single hypothetical customer against the loaded population
fn run_prediction_mode(args: &Args, (recency, frequency, monetary): (i64, f64, f64)) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!("Input RFM values: R={recency}, F={frequency}, M={monetary}");

    let start_time = Instant::now();
    let report = run_file(Path::new(&args.input), &args.load_options())
        .with_context(|| format!("RFM pipeline failed for {}", args.input))?;
    let predicted = report.predict(recency, frequency, monetary)?;

    println!("\n✓ Predicted Segment: {}", predicted.segment);
    println!(
        "  Scores: R={}, F={}, M={}, FM={}",
        predicted.r_score, predicted.f_score, predicted.m_score, predicted.fm_score
    );
    println!("  Population: {} customers", report.customers.len());
    println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}

/// Run the full scoring pipeline and write every requested output
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== RFM Segmentation Pipeline ===\n");

    let start_time = Instant::now();
    info!(input = %args.input, "starting pipeline");

    let report = run_file(Path::new(&args.input), &args.load_options())
        .with_context(|| format!("RFM pipeline failed for {}", args.input))?;
    println!("✓ Scored {} customers", report.customers.len());

    report
        .write_csv(Path::new(&args.output))
        .with_context(|| format!("failed to write {}", args.output))?;

    if let Some(summary) = &args.summary {
        report
            .write_summary(Path::new(summary))
            .with_context(|| format!("failed to write {summary}"))?;
    }

    if let Some(plot) = &args.plot {
        create_segment_chart(&report, Path::new(plot)).with_context(|| format!("failed to draw {plot}"))?;
    }

    viz::print_segment_statistics(&report);

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Scores saved to: {}", args.output);

    Ok(())
}
