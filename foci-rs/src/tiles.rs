use ndarray::Array2;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::load::{self, Intensity, LoadError};
use crate::slices;

const TILE_RE: &str = r"(?i)^(.+)\.(png|tiff?)$";

/// Where the channels of an image set live.
#[derive(Debug, Clone)]
pub struct TileLayout {
    pub image_id: String,
    pub rad51_dir: PathBuf,
    pub dapi_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub mask_suffix: String,
    pub prob_suffix: String,
}

/// Files belonging to one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePaths {
    pub tile_id: String,
    pub rad51: PathBuf,
    pub dapi: PathBuf,
    pub mask: PathBuf,
    pub probabilities: PathBuf,
}

/// A tile's detection inputs.
pub struct Tile {
    pub rad51: Intensity,
    pub mask: Array2<u32>,
    pub probabilities: Option<Array2<f64>>,
}

impl TilePaths {
    pub fn has_mask(&self) -> bool {
        self.mask.is_file()
    }

    pub fn has_probabilities(&self) -> bool {
        self.probabilities.is_file()
    }

    /// Load the RAD51 channel, nucleus mask and (if present) probability map.
    pub fn load(&self) -> Result<Tile, LoadError> {
        let mut tile = self.load_rad51()?;
        if self.has_probabilities() {
            tile.probabilities = Some(load::read_probabilities(&self.probabilities)?);
        } else {
            log::warn!("{}: no probability map at {}", self.tile_id, self.probabilities.display());
        }
        Ok(tile)
    }

    /// Load the RAD51 channel and nucleus mask only; the probability map is never read.
    pub fn load_rad51(&self) -> Result<Tile, LoadError> {
        Ok(Tile {
            rad51: load::read_intensity(&self.rad51)?,
            mask: load::read_label_mask(&self.mask)?,
            probabilities: None,
        })
    }

    pub fn load_dapi(&self) -> Result<Intensity, LoadError> {
        load::read_intensity(&self.dapi)
    }
}

/// All tiles in the RAD51 directory, sorted by file name. Probability maps
/// and masks stored alongside are not tiles.
pub fn discover_tiles(layout: &TileLayout) -> Result<Vec<TilePaths>, Box<dyn std::error::Error>> {
    if !layout.rad51_dir.is_dir() {
        return Err(format!("RAD51 directory not found: {}", layout.rad51_dir.display()).into());
    }
    let re = Regex::new(TILE_RE)?;

    let mut names: Vec<String> = fs::read_dir(&layout.rad51_dir)?
        .filter_map(|e| {
            let e = e.ok()?;
            if e.path().is_file() {
                e.file_name().to_str().map(String::from)
            } else {
                None
            }
        })
        .filter(|name| {
            re.is_match(name)
                && !name.contains("Probabilities")
                && (layout.mask_suffix.is_empty() || !name.ends_with(&layout.mask_suffix))
        })
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .filter_map(|name| {
            let tile_id = re.captures(&name)?[1].to_string();
            Some(layout.paths_for(&name, tile_id))
        })
        .collect())
}

/// Discover tiles and keep the ones picked by a selection string ("all", "0:5", ...).
pub fn select_tiles(
    layout: &TileLayout,
    selection: &str,
) -> Result<Vec<TilePaths>, Box<dyn std::error::Error>> {
    let all = discover_tiles(layout)?;
    if all.is_empty() {
        return Err(format!("No tiles found in {}", layout.rad51_dir.display()).into());
    }
    let picked = slices::parse_selection(selection, all.len())?;
    if picked.is_empty() {
        return Err(format!("Selection {:?} matches no tiles", selection).into());
    }
    Ok(picked.into_iter().map(|i| all[i].clone()).collect())
}

impl TileLayout {
    /// Layout rooted at an image-set directory with `rad51/` and `dapi/` below it.
    pub fn under(root: &Path) -> Self {
        let dapi_dir = root.join("dapi");
        Self {
            image_id: root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "images".to_string()),
            rad51_dir: root.join("rad51"),
            mask_dir: dapi_dir.clone(),
            dapi_dir,
            mask_suffix: "_cp_masks.tif".to_string(),
            prob_suffix: "_Probabilities.tif".to_string(),
        }
    }

    fn paths_for(&self, file_name: &str, tile_id: String) -> TilePaths {
        TilePaths {
            rad51: self.rad51_dir.join(file_name),
            dapi: self.dapi_dir.join(file_name),
            mask: self.mask_dir.join(format!("{}{}", tile_id, self.mask_suffix)),
            probabilities: self.rad51_dir.join(format!("{}{}", tile_id, self.prob_suffix)),
            tile_id,
        }
    }
}
