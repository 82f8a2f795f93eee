use clap::Args;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::aggregate::{self, ChannelKind, TileAnalysis, Thresholds};
use crate::config::{DetectArgs, TileArgs};

pub const SWEEP_CSV: &str = "foci_per_nucleus_multi_threshold.csv";
pub const LONG_CSV: &str = "foci_per_nucleus_long.csv";

#[derive(Args, Clone)]
pub struct SweepArgs {
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
    /// Output directory
    #[arg(long, default_value = "outputs")]
    pub output: String,
}

/// One nucleus at one (channel, threshold).
#[derive(Debug, Serialize)]
struct LongRow<'a> {
    image_id: &'a str,
    tile_id: &'a str,
    region_id: u32,
    area: usize,
    channel: &'static str,
    threshold: f64,
    count: usize,
    area_fraction: f64,
}

fn header(thresholds: &Thresholds, with_probabilities: bool) -> Vec<String> {
    let mut columns: Vec<String> = ["image_id", "tile_id", "region_id", "area"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut channels = vec![ChannelKind::Rad51];
    if with_probabilities {
        channels.push(ChannelKind::Probability);
    }
    for channel in channels {
        for &t in thresholds.of(channel) {
            columns.push(aggregate::column(channel, "count", t));
            columns.push(aggregate::column(channel, "area", t));
        }
    }
    columns
}

pub fn run(args: SweepArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    let params = args.detect.params()?;
    let layout = args.tiles.layout();
    let tiles = crate::tiles::select_tiles(&layout, &args.tiles.tiles)?;
    let thresholds = Thresholds {
        rad51: args.rad51_thresholds.clone(),
        probability: args.prob_thresholds.clone(),
    };

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;

    // Rows are buffered: probability columns exist only once some tile has a map.
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut any_probabilities = false;
    let total = tiles.len();
    let long_path = out_dir.join(LONG_CSV);
    let mut long = csv::Writer::from_path(&long_path)?;

    for (i, paths) in tiles.iter().enumerate() {
        if !paths.has_mask() {
            log::warn!("Skipping {}: no mask at {}", paths.tile_id, paths.mask.display());
            progress((i + 1) as f64 / total as f64, &format!("Skipped tile {}/{}", i + 1, total));
            continue;
        }
        let tile = paths.load()?;
        let analysis = TileAnalysis::run(&tile, &params, &thresholds);
        let has_prob = analysis.has_channel(ChannelKind::Probability);
        any_probabilities |= has_prob;

        for nucleus in analysis.nuclei() {
            let mut row = vec![
                layout.image_id.clone(),
                paths.tile_id.clone(),
                nucleus.region.label.to_string(),
                nucleus.region.area.to_string(),
            ];
            for &t in &thresholds.rad51 {
                push_cells(&mut row, nucleus.get(ChannelKind::Rad51, t));
            }
            if has_prob {
                for &t in &thresholds.probability {
                    push_cells(&mut row, nucleus.get(ChannelKind::Probability, t));
                }
            }
            rows.push(row);

            for m in &nucleus.measurements {
                long.serialize(LongRow {
                    image_id: &layout.image_id,
                    tile_id: &paths.tile_id,
                    region_id: nucleus.region.label,
                    area: nucleus.region.area,
                    channel: m.channel.prefix(),
                    threshold: m.threshold,
                    count: m.count,
                    area_fraction: m.area_fraction,
                })?;
            }
        }

        progress(
            (i + 1) as f64 / total as f64,
            &format!("Processed tile {}/{} ({})", i + 1, total, paths.tile_id),
        );
    }

    let columns = header(&thresholds, any_probabilities);
    let out_path = out_dir.join(SWEEP_CSV);
    let mut wtr = csv::Writer::from_path(&out_path)?;
    wtr.write_record(&columns)?;
    for mut row in rows {
        row.resize(columns.len(), String::new());
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    long.flush()?;

    progress(
        1.0,
        &format!("Wrote {} and {}", out_path.display(), long_path.display()),
    );
    Ok(())
}

fn push_cells(row: &mut Vec<String>, m: Option<&aggregate::Measurement>) {
    match m {
        Some(m) => {
            row.push(m.count.to_string());
            row.push(aggregate::format_float(m.area_fraction));
        }
        None => {
            row.push(String::new());
            row.push(String::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn header_orders_channels_and_thresholds() {
        let thresholds = Thresholds {
            rad51: vec![0.2, 0.25],
            probability: vec![0.365],
        };
        assert_eq!(
            header(&thresholds, true),
            vec![
                "image_id",
                "tile_id",
                "region_id",
                "area",
                "rad51_count_th0.2",
                "rad51_area_th0.2",
                "rad51_count_th0.25",
                "rad51_area_th0.25",
                "prob_count_th0.365",
                "prob_area_th0.365",
            ]
        );
        assert_eq!(header(&thresholds, false).len(), 8);
    }

    #[test]
    fn sweep_writes_one_row_per_nucleus() {
        let root = tempfile::tempdir().unwrap();
        let set = testing::write_image_set(root.path(), &["tile_01"], &[]);
        let out = root.path().join("out");

        let args = SweepArgs {
            tiles: testing::tile_args(&set),
            detect: testing::detect_args(),
            rad51_thresholds: vec![0.1, 0.9],
            prob_thresholds: vec![0.3],
            output: out.to_string_lossy().into_owned(),
        };
        run(args, |_, _| {}).unwrap();

        let mut rdr = csv::Reader::from_path(out.join(SWEEP_CSV)).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 8);
        assert!(!headers.iter().any(|h| h.starts_with("prob_")));
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "A1");
        assert_eq!(&records[0][1], "tile_01");
        assert_eq!(&records[0][2], "1");
        assert_eq!(&records[0][3], "400");
        assert_eq!(&records[0][4], "1");
        assert_eq!(&records[0][6], "0");
        assert_eq!(&records[1][4], "0");
        assert_eq!(&records[1][5], "0.0");

        let mut rdr = csv::Reader::from_path(out.join(LONG_CSV)).unwrap();
        assert_eq!(
            rdr.headers().unwrap().iter().collect::<Vec<_>>(),
            vec![
                "image_id",
                "tile_id",
                "region_id",
                "area",
                "channel",
                "threshold",
                "count",
                "area_fraction",
            ]
        );
        let long: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        // 2 nuclei x 2 thresholds, nucleus-major
        assert_eq!(long.len(), 4);
        assert_eq!(&long[0][4], "rad51");
        assert_eq!(&long[0][5], "0.1");
        assert_eq!(&long[0][6], "1");
        assert_eq!(&long[1][5], "0.9");
        assert_eq!(&long[2][2], "2");
    }

    #[test]
    fn tiles_without_probability_map_leave_cells_empty() {
        let root = tempfile::tempdir().unwrap();
        let set = testing::write_image_set(root.path(), &["tile_01", "tile_02"], &["tile_02"]);
        let out = root.path().join("out");

        let args = SweepArgs {
            tiles: testing::tile_args(&set),
            detect: testing::detect_args(),
            rad51_thresholds: vec![0.1],
            prob_thresholds: vec![0.2],
            output: out.to_string_lossy().into_owned(),
        };
        run(args, |_, _| {}).unwrap();

        let mut rdr = csv::Reader::from_path(out.join(SWEEP_CSV)).unwrap();
        assert_eq!(rdr.headers().unwrap().len(), 8);
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 4);
        assert_eq!(&records[0][6], "");
        assert_eq!(&records[2][1], "tile_02");
        assert_eq!(&records[2][6], "1");
    }

    #[test]
    fn tiles_without_mask_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let set = testing::write_image_set(root.path(), &["tile_01"], &[]);
        fs::remove_file(set.join("dapi").join("tile_01_cp_masks.tif")).unwrap();
        let out = root.path().join("out");

        let args = SweepArgs {
            tiles: testing::tile_args(&set),
            detect: testing::detect_args(),
            rad51_thresholds: vec![0.1],
            prob_thresholds: vec![],
            output: out.to_string_lossy().into_owned(),
        };
        run(args, |_, _| {}).unwrap();
        let mut rdr = csv::Reader::from_path(out.join(SWEEP_CSV)).unwrap();
        assert_eq!(rdr.records().count(), 0);
    }
}
