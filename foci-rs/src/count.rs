use clap::Args;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::aggregate::{ChannelKind, TileAnalysis, Thresholds};
use crate::config::{DetectArgs, TileArgs};
use crate::load;
use crate::overlay;

pub const COUNT_CSV: &str = "foci_per_nucleus.csv";

#[derive(Args, Clone)]
pub struct CountArgs {
    #[command(flatten)]
    pub tiles: TileArgs,
    #[command(flatten)]
    pub detect: DetectArgs,
    /// RAD51 detection threshold
    #[arg(long, default_value_t = 0.2)]
    pub rad51_threshold: f64,
    /// Probability-map detection threshold
    #[arg(long, default_value_t = 0.365)]
    pub prob_threshold: f64,
    /// Output directory
    #[arg(long, default_value = "outputs")]
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CountRow<'a> {
    region_id: u32,
    image_id: &'a str,
    tile_id: &'a str,
    area: usize,
    foci_count_rad51: usize,
    foci_count_probs: usize,
    foci_fraction_rad51: f64,
    foci_fraction_probs: f64,
}

pub fn run(args: CountArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    let params = args.detect.params()?;
    let layout = args.tiles.layout();
    let tiles = crate::tiles::select_tiles(&layout, &args.tiles.tiles)?;
    let thresholds = Thresholds {
        rad51: vec![args.rad51_threshold],
        probability: vec![args.prob_threshold],
    };

    let out_dir = Path::new(&args.output);
    let rad51_out = out_dir.join("annotated_rad51");
    let dapi_out = out_dir.join("annotated_dapi");
    fs::create_dir_all(&rad51_out)?;
    fs::create_dir_all(&dapi_out)?;

    let csv_path = out_dir.join(COUNT_CSV);
    let mut wtr = csv::Writer::from_path(&csv_path)?;
    let total = tiles.len();
    let mut n_rows = 0usize;

    for (i, paths) in tiles.iter().enumerate() {
        if !paths.has_mask() {
            log::warn!("Skipping {}: no mask at {}", paths.tile_id, paths.mask.display());
            progress((i + 1) as f64 / total as f64, &format!("Skipped tile {}/{}", i + 1, total));
            continue;
        }
        let tile = paths.load()?;
        let dapi = paths.load_dapi()?;
        let analysis = TileAnalysis::run(&tile, &params, &thresholds);

        for nucleus in analysis.nuclei() {
            let rad51 = nucleus.get(ChannelKind::Rad51, args.rad51_threshold);
            let prob = nucleus.get(ChannelKind::Probability, args.prob_threshold);
            wtr.serialize(CountRow {
                region_id: nucleus.region.label,
                image_id: &layout.image_id,
                tile_id: &paths.tile_id,
                area: nucleus.region.area,
                foci_count_rad51: rad51.map_or(0, |m| m.count),
                foci_count_probs: prob.map_or(0, |m| m.count),
                foci_fraction_rad51: rad51.map_or(0.0, |m| m.area_fraction),
                foci_fraction_probs: prob.map_or(0.0, |m| m.area_fraction),
            })?;
            n_rows += 1;
        }

        let rad51_blobs = analysis
            .detection(ChannelKind::Rad51, args.rad51_threshold)
            .map(|d| d.blobs.as_slice())
            .unwrap_or_default();
        overlay::annotate(&tile.rad51.display, rad51_blobs, overlay::RAD51_MARK)
            .save(rad51_out.join(format!("{}_rad51_foci.png", paths.tile_id)))?;
        overlay::annotate(&dapi.display, rad51_blobs, overlay::DAPI_MARK)
            .save(dapi_out.join(format!("{}_dapi_foci.png", paths.tile_id)))?;

        let prob_blobs = match &tile.probabilities {
            Some(prob) => {
                load::to_gray_u8(&load::min_max_normalize(prob))
                    .save(rad51_out.join(format!("{}_probabilities.png", paths.tile_id)))?;
                analysis
                    .detection(ChannelKind::Probability, args.prob_threshold)
                    .map_or(0, |d| d.blobs.len())
            }
            None => 0,
        };

        log::info!(
            "{}: {} foci in RAD51, {} in probabilities",
            paths.tile_id,
            rad51_blobs.len(),
            prob_blobs
        );
        progress(
            (i + 1) as f64 / total as f64,
            &format!("Processed tile {}/{} ({})", i + 1, total, paths.tile_id),
        );
    }

    wtr.flush()?;
    progress(1.0, &format!("Wrote {} rows to {}", n_rows, csv_path.display()));
    Ok(())
}
