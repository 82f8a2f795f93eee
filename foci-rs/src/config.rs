//! Argument groups shared by the tile-processing subcommands.

use clap::Args;
use std::path::Path;

use crate::blob::BlobParams;
use crate::tiles::TileLayout;

#[derive(Args, Clone, Debug)]
pub struct TileArgs {
    /// Image set directory containing rad51/ and dapi/ (e.g. images/A1)
    #[arg(long, default_value = "images/A1")]
    pub input: String,
    /// RAD51 tile directory (default: <input>/rad51)
    #[arg(long)]
    pub rad51_dir: Option<String>,
    /// DAPI tile directory (default: <input>/dapi)
    #[arg(long)]
    pub dapi_dir: Option<String>,
    /// Nucleus mask directory (default: the DAPI directory)
    #[arg(long)]
    pub mask_dir: Option<String>,
    /// Mask file name suffix appended to the tile id
    #[arg(long, default_value = "_cp_masks.tif")]
    pub mask_suffix: String,
    /// Probability map suffix appended to the tile id (looked up in the RAD51 directory)
    #[arg(long, default_value = "_Probabilities.tif")]
    pub prob_suffix: String,
    /// Image set id written to outputs (default: name of the input directory)
    #[arg(long)]
    pub image_id: Option<String>,
    #[arg(
        long,
        default_value = "all",
        help = "Tiles to process: \"all\" or comma-separated indices/slices, e.g. \"0:10:2, 15\""
    )]
    pub tiles: String,
}

impl TileArgs {
    pub fn layout(&self) -> TileLayout {
        let mut layout = TileLayout::under(Path::new(&self.input));
        if let Some(dir) = &self.rad51_dir {
            layout.rad51_dir = dir.into();
        }
        if let Some(dir) = &self.dapi_dir {
            layout.dapi_dir = dir.into();
            layout.mask_dir = dir.into();
        }
        if let Some(dir) = &self.mask_dir {
            layout.mask_dir = dir.into();
        }
        if let Some(id) = &self.image_id {
            layout.image_id = id.clone();
        }
        layout.mask_suffix = self.mask_suffix.clone();
        layout.prob_suffix = self.prob_suffix.clone();
        layout
    }
}

#[derive(Args, Clone, Debug)]
pub struct DetectArgs {
    /// Smallest LoG scale
    #[arg(long, default_value_t = 1.0)]
    pub min_sigma: f64,
    /// Largest LoG scale
    #[arg(long, default_value_t = 4.0)]
    pub max_sigma: f64,
    /// Number of scales between min and max sigma
    #[arg(long, default_value_t = 10)]
    pub num_sigma: usize,
    /// Overlap fraction above which the smaller blob is dropped
    #[arg(long, default_value_t = 0.5)]
    pub overlap: f64,
}

impl DetectArgs {
    pub fn params(&self) -> Result<BlobParams, String> {
        let params = BlobParams {
            min_sigma: self.min_sigma,
            max_sigma: self.max_sigma,
            num_sigma: self.num_sigma,
            overlap: self.overlap,
        };
        params.validate()?;
        Ok(params)
    }
}
