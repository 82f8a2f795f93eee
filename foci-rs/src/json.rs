use clap::Args;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::aggregate::{self, TileAnalysis, Thresholds};
use crate::config::{DetectArgs, TileArgs};
use crate::regions;

#[derive(Args, Clone)]
pub struct JsonArgs {
    #[command(flatten)]
    pub tiles: TileArgs,
    #[command(flatten)]
    pub detect: DetectArgs,
    /// RAD51 detection thresholds
    #[arg(long, value_delimiter = ',', default_values_t = [0.15, 0.2, 0.25])]
    pub rad51_thresholds: Vec<f64>,
    /// Probability-map detection thresholds
    #[arg(long, value_delimiter = ',', default_values_t = [0.3, 0.365, 0.4])]
    pub prob_thresholds: Vec<f64>,
    /// Output directory for per-tile JSON and index.json
    #[arg(long, default_value = "data")]
    pub output: String,
}

/// Per-tile document: tile paths and one object per nucleus with its pixels
/// and per-threshold foci.
fn tile_document(
    tile_id: &str,
    rad51_image: &Path,
    dapi_image: &Path,
    mask: &ndarray::Array2<u32>,
    analysis: &TileAnalysis,
) -> Value {
    let pixels = regions::pixel_coords(mask);
    let nuclei: Vec<Value> = analysis
        .nuclei()
        .iter()
        .map(|nucleus| {
            let region = nucleus.region;
            let mut obj = Map::new();
            obj.insert("region_id".into(), json!(region.label));
            obj.insert("area".into(), json!(region.area));
            obj.insert("centroid".into(), json!([region.centroid.0, region.centroid.1]));
            obj.insert(
                "pixel_coords".into(),
                json!(pixels.get(&region.label).cloned().unwrap_or_default()),
            );
            for m in &nucleus.measurements {
                obj.insert(aggregate::column(m.channel, "count", m.threshold), json!(m.count));
                obj.insert(
                    aggregate::column(m.channel, "area", m.threshold),
                    json!(m.area_fraction),
                );
                obj.insert(aggregate::column(m.channel, "coords", m.threshold), json!(m.coords));
            }
            Value::Object(obj)
        })
        .collect();

    json!({
        "tile_id": tile_id,
        "rad51_image": rad51_image.to_string_lossy(),
        "dapi_image": dapi_image.to_string_lossy(),
        "nuclei": nuclei,
    })
}

pub fn run(args: JsonArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    let params = args.detect.params()?;
    let layout = args.tiles.layout();
    let tiles = crate::tiles::select_tiles(&layout, &args.tiles.tiles)?;
    let thresholds = Thresholds {
        rad51: args.rad51_thresholds.clone(),
        probability: args.prob_thresholds.clone(),
    };

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;

    let total = tiles.len();
    let mut exported: Vec<String> = Vec::new();

    for (i, paths) in tiles.iter().enumerate() {
        if !paths.has_mask() {
            log::warn!("Skipping {}: no mask at {}", paths.tile_id, paths.mask.display());
            progress((i + 1) as f64 / total as f64, &format!("Skipped tile {}/{}", i + 1, total));
            continue;
        }
        let tile = paths.load()?;
        let analysis = TileAnalysis::run(&tile, &params, &thresholds);
        let doc = tile_document(&paths.tile_id, &paths.rad51, &paths.dapi, &tile.mask, &analysis);
        let out_path = out_dir.join(format!("{}.json", paths.tile_id));
        fs::write(&out_path, serde_json::to_string_pretty(&doc)?)?;
        exported.push(paths.tile_id.clone());

        progress(
            (i + 1) as f64 / total as f64,
            &format!("Exported tile {}/{} ({})", i + 1, total, paths.tile_id),
        );
    }

    let mut index = Map::new();
    index.insert(layout.image_id.clone(), json!(exported));
    fs::write(
        out_dir.join("index.json"),
        serde_json::to_string_pretty(&Value::Object(index))?,
    )?;

    progress(1.0, &format!("Wrote {} tile documents to {}", exported.len(), out_dir.display()));
    Ok(())
}
