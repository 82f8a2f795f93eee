use clap::Args;
use std::fs;
use std::path::Path;

use crate::aggregate::{ChannelKind, TileAnalysis, Thresholds};
use crate::blob::BlobParams;
use crate::config::{DetectArgs, TileArgs};
use crate::plots;
use crate::tiles::TilePaths;

pub const PANELS_PNG: &str = "foci_distribution_panels.png";

#[derive(Args, Clone)]
pub struct PanelsArgs {
    #[command(flatten)]
    pub tiles: TileArgs,
    #[command(flatten)]
    pub detect: DetectArgs,
    /// RAD51 detection thresholds to compare, one panel each
    #[arg(long, value_delimiter = ',', default_values_t = [0.2, 0.25, 0.3, 0.35, 0.4])]
    pub thresholds: Vec<f64>,
    /// Output directory
    #[arg(long, default_value = "outputs")]
    pub output: String,
}

/// RAD51 foci count of every labelled nucleus of every tile, per threshold.
fn collect_distributions(
    tiles: &[TilePaths],
    params: &BlobParams,
    thresholds: &[f64],
    progress: &impl Fn(f64, &str),
) -> Result<Vec<(f64, Vec<usize>)>, Box<dyn std::error::Error>> {
    let sweep = Thresholds {
        rad51: thresholds.to_vec(),
        probability: Vec::new(),
    };
    let mut distributions: Vec<(f64, Vec<usize>)> =
        thresholds.iter().map(|&t| (t, Vec::new())).collect();

    let total = tiles.len();
    for (i, paths) in tiles.iter().enumerate() {
        if !paths.has_mask() {
            log::warn!("Skipping {}: no mask at {}", paths.tile_id, paths.mask.display());
            progress((i + 1) as f64 / total as f64, &format!("Skipped tile {}/{}", i + 1, total));
            continue;
        }
        let tile = paths.load_rad51()?;
        let analysis = TileAnalysis::run(&tile, params, &sweep);
        for nucleus in analysis.nuclei() {
            for (t, counts) in distributions.iter_mut() {
                counts.push(nucleus.get(ChannelKind::Rad51, *t).map_or(0, |m| m.count));
            }
        }
        progress(
            (i + 1) as f64 / total as f64,
            &format!("Processed tile {}/{} ({})", i + 1, total, paths.tile_id),
        );
    }

    for (t, counts) in &distributions {
        log::info!("Threshold {:.3}: {} nuclei processed", t, counts.len());
    }
    Ok(distributions)
}

pub fn run(args: PanelsArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    if args.thresholds.is_empty() {
        return Err("At least one threshold is required".into());
    }
    let params = args.detect.params()?;
    let layout = args.tiles.layout();
    let tiles = crate::tiles::select_tiles(&layout, &args.tiles.tiles)?;

    let distributions = collect_distributions(&tiles, &params, &args.thresholds, &progress)?;

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;
    let out_path = out_dir.join(PANELS_PNG);
    plots::draw_threshold_panels(&out_path, &distributions)?;

    progress(1.0, &format!("Wrote {}", out_path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn distributions_cover_every_nucleus_per_threshold() {
        let root = tempfile::tempdir().unwrap();
        let set = testing::write_image_set(root.path(), &["tile_01", "tile_02"], &[]);
        let layout = testing::tile_args(&set).layout();
        let tiles = crate::tiles::discover_tiles(&layout).unwrap();

        let distributions =
            collect_distributions(&tiles, &BlobParams::default(), &[0.1, 0.9], &|_, _| {}).unwrap();
        assert_eq!(distributions.len(), 2);
        assert_eq!(distributions[0], (0.1, vec![1, 0, 1, 0]));
        assert_eq!(distributions[1], (0.9, vec![0, 0, 0, 0]));
    }

    #[test]
    fn probability_maps_are_not_read() {
        let root = tempfile::tempdir().unwrap();
        let set = testing::write_image_set(root.path(), &["tile_01"], &[]);
        fs::write(set.join("rad51").join("tile_01_Probabilities.tif"), b"not a tiff").unwrap();
        let layout = testing::tile_args(&set).layout();
        let tiles = crate::tiles::discover_tiles(&layout).unwrap();

        let distributions =
            collect_distributions(&tiles, &BlobParams::default(), &[0.1], &|_, _| {}).unwrap();
        assert_eq!(distributions, vec![(0.1, vec![1, 0])]);
    }
}
