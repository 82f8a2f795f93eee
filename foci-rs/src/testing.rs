//! On-disk fixtures for command tests.

use image::{GrayImage, Luma};
use ndarray::Array2;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};

use crate::aggregate::tests::synthetic_tile;
use crate::config::{DetectArgs, TileArgs};

/// Write `<root>/A1/{rad51,dapi}` holding the synthetic two-nucleus tile under
/// every id in `tile_ids`, with a float probability map for ids in `with_probabilities`.
pub fn write_image_set(root: &Path, tile_ids: &[&str], with_probabilities: &[&str]) -> PathBuf {
    let set = root.join("A1");
    let rad51_dir = set.join("rad51");
    let dapi_dir = set.join("dapi");
    fs::create_dir_all(&rad51_dir).unwrap();
    fs::create_dir_all(&dapi_dir).unwrap();

    let tile = synthetic_tile(true);
    let (h, w) = tile.mask.dim();
    let gray = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([tile.rad51.gray[[y as usize, x as usize]].round() as u8])
    });
    let probs: Vec<f32> = tile
        .probabilities
        .as_ref()
        .unwrap()
        .iter()
        .map(|&p| p as f32)
        .collect();

    for id in tile_ids {
        gray.save(rad51_dir.join(format!("{id}.png"))).unwrap();
        gray.save(dapi_dir.join(format!("{id}.png"))).unwrap();

        write_mask(&set, id, &tile.mask);

        if with_probabilities.contains(id) {
            let file = fs::File::create(rad51_dir.join(format!("{id}_Probabilities.tif"))).unwrap();
            let mut enc = TiffEncoder::new(BufWriter::new(file)).unwrap();
            enc.write_image::<colortype::Gray32Float>(w as u32, h as u32, &probs)
                .unwrap();
        }
    }
    set
}

/// Write (or replace) `<set>/dapi/<tile_id>_cp_masks.tif` as a 16-bit label TIFF.
pub fn write_mask(set: &Path, tile_id: &str, mask: &Array2<u32>) {
    let (h, w) = mask.dim();
    let labels: Vec<u16> = mask.iter().map(|&l| l as u16).collect();
    let file = fs::File::create(set.join("dapi").join(format!("{tile_id}_cp_masks.tif"))).unwrap();
    let mut enc = TiffEncoder::new(BufWriter::new(file)).unwrap();
    enc.write_image::<colortype::Gray16>(w as u32, h as u32, &labels)
        .unwrap();
}

pub fn tile_args(set: &Path) -> TileArgs {
    TileArgs {
        input: set.to_string_lossy().into_owned(),
        rad51_dir: None,
        dapi_dir: None,
        mask_dir: None,
        mask_suffix: "_cp_masks.tif".to_string(),
        prob_suffix: "_Probabilities.tif".to_string(),
        image_id: None,
        tiles: "all".to_string(),
    }
}

pub fn detect_args() -> DetectArgs {
    DetectArgs {
        min_sigma: 1.0,
        max_sigma: 4.0,
        num_sigma: 10,
        overlap: 0.5,
    }
}
