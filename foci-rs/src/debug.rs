use clap::Args;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::aggregate::{ChannelKind, TileAnalysis, Thresholds};
use crate::config::{DetectArgs, TileArgs};
use crate::overlay;

#[derive(Args, Clone)]
pub struct DebugArgs {
    #[command(flatten)]
    pub tiles: TileArgs,
    #[command(flatten)]
    pub detect: DetectArgs,
    /// RAD51 detection thresholds, one panel each
    #[arg(long, value_delimiter = ',', default_values_t = [0.05, 0.10, 0.15, 0.2, 0.25])]
    pub rad51_thresholds: Vec<f64>,
    /// Probability-map detection thresholds, one panel each
    #[arg(long, value_delimiter = ',', default_values_t = [0.2, 0.25, 0.3, 0.35, 0.4])]
    pub prob_thresholds: Vec<f64>,
    /// Maximum number of nuclei to render
    #[arg(long, default_value_t = 20)]
    pub max_nuclei: usize,
    /// Seed for nucleus sampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Output directory (strips go to <output>/visuals)
    #[arg(long, default_value = "outputs")]
    pub output: String,
}

/// Pick up to `n` labels without replacement, reproducibly for a given seed.
fn sample_labels(labels: &[u32], n: usize, seed: u64) -> BTreeSet<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    labels.choose_multiple(&mut rng, n.min(labels.len())).copied().collect()
}

pub fn run(args: DebugArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    let params = args.detect.params()?;
    let layout = args.tiles.layout();
    let tiles = crate::tiles::select_tiles(&layout, &args.tiles.tiles)?;
    let paths = &tiles[0];
    if !paths.has_mask() {
        return Err(format!("No mask for {} at {}", paths.tile_id, paths.mask.display()).into());
    }

    let tile = paths.load()?;
    let thresholds = Thresholds {
        rad51: args.rad51_thresholds.clone(),
        probability: args.prob_thresholds.clone(),
    };
    let analysis = TileAnalysis::run(&tile, &params, &thresholds);

    let labels: Vec<u32> = analysis
        .regions
        .iter()
        .filter(|r| r.area > 0)
        .map(|r| r.label)
        .collect();
    let selected = sample_labels(&labels, args.max_nuclei, args.seed);

    let vis_dir = Path::new(&args.output).join("visuals");
    fs::create_dir_all(&vis_dir)?;

    let total = selected.len();
    let mut done = 0usize;
    for region in analysis.regions.iter().filter(|r| selected.contains(&r.label)) {
        done += 1;
        let Some((crop, origin)) =
            overlay::crop_padded(&tile.rad51.display, region.bbox, overlay::CROP_PAD)
        else {
            log::warn!(
                "Skipping nucleus {}: bounding box {:?} lies outside the {}x{} image",
                region.label,
                region.bbox,
                tile.rad51.display.width(),
                tile.rad51.display.height()
            );
            progress(
                done as f64 / total as f64,
                &format!("Skipped nucleus {} ({}/{})", region.label, done, total),
            );
            continue;
        };
        let mut panels = vec![crop.clone()];
        let mut titles = vec!["Nucleus".to_string()];

        for d in &analysis.detections {
            let (name, color) = match d.channel {
                ChannelKind::Rad51 => ("RAD51", overlay::RAD51_PANEL_MARK),
                ChannelKind::Probability => ("Prob", overlay::PROB_PANEL_MARK),
            };
            panels.push(overlay::mark_crop(&crop, origin, d.assignment.blobs_of(region.label), color));
            titles.push(format!("{} th={:.3}", name, d.threshold));
        }

        let out_path = vis_dir.join(format!("debug_nucleus_{}.png", region.label));
        overlay::titled_strip(&panels, &titles).save(&out_path)?;
        log::info!("{}: panels {}", out_path.display(), titles.join(" | "));

        progress(
            done as f64 / total as f64,
            &format!("Saved nucleus {} ({}/{})", region.label, done, total),
        );
    }
    Ok(())
}
