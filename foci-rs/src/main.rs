mod aggregate;
mod assign;
mod blob;
mod config;
mod count;
mod debug;
mod filters;
mod json;
mod load;
mod overlay;
mod panels;
mod plots;
mod regions;
mod slices;
mod split;
mod summary;
mod sweep;
#[cfg(test)]
mod testing;
mod tiles;

use clap::{Parser, Subcommand};
use std::io::{self, Write};

#[derive(Parser)]
#[command(
    name = "foci",
    about = "RAD51 foci quantification: count, sweep, json, debug, panels, summary, split"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-nucleus foci at one threshold, with annotated overlays
    Count(count::CountArgs),
    /// Per-nucleus foci over a threshold sweep, as one CSV
    Sweep(sweep::SweepArgs),
    /// Per-tile JSON documents and an index
    Json(json::JsonArgs),
    /// Threshold comparison strips for sampled nuclei of one tile
    Debug(debug::DebugArgs),
    /// Stacked histograms of foci per nucleus across thresholds
    Panels(panels::PanelsArgs),
    /// Summary tables and density plots from a sweep CSV
    Summary(summary::SummaryArgs),
    /// Split a composite image into a grid of tiles
    Split(split::SplitArgs),
}

fn progress(prog: f64, msg: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({"progress": prog, "message": msg})
    );
    let _ = io::stderr().flush();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Count(args) => count::run(args, progress)?,
        Commands::Sweep(args) => sweep::run(args, progress)?,
        Commands::Json(args) => json::run(args, progress)?,
        Commands::Debug(args) => debug::run(args, progress)?,
        Commands::Panels(args) => panels::run(args, progress)?,
        Commands::Summary(args) => summary::run(args, progress)?,
        Commands::Split(args) => split::run(args, progress)?,
    }
    Ok(())
}
