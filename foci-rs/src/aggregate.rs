//! Per-nucleus foci statistics over a threshold sweep on one or two channels.

use ndarray::Array2;

use crate::assign::{self, Assignment};
use crate::blob::{Blob, BlobParams, ScaleSpace};
use crate::load;
use crate::regions::{self, Region};
use crate::tiles::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Raw RAD51 fluorescence.
    Rad51,
    /// Pixel-classifier foreground probability.
    Probability,
}

impl ChannelKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ChannelKind::Rad51 => "rad51",
            ChannelKind::Probability => "prob",
        }
    }
}

/// Threshold lists per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub rad51: Vec<f64>,
    pub probability: Vec<f64>,
}

impl Thresholds {
    pub fn of(&self, channel: ChannelKind) -> &[f64] {
        match channel {
            ChannelKind::Rad51 => &self.rad51,
            ChannelKind::Probability => &self.probability,
        }
    }
}

/// Shortest round-tripping decimal that always carries a fraction part:
/// `0.2`, `0.365`, `1.0`. Used for threshold column names and CSV cells.
pub fn format_float(t: f64) -> String {
    let s = t.to_string();
    if t.is_finite() && !s.contains('.') && !s.contains('e') {
        format!("{s}.0")
    } else {
        s
    }
}

/// Column name such as `rad51_count_th0.2`.
pub fn column(channel: ChannelKind, metric: &str, threshold: f64) -> String {
    format!("{}_{}_th{}", channel.prefix(), metric, format_float(threshold))
}

/// Blobs found on one channel at one threshold, and their assignment to nuclei.
pub struct Detection {
    pub channel: ChannelKind,
    pub threshold: f64,
    pub blobs: Vec<Blob>,
    pub assignment: Assignment,
}

/// One nucleus' result for one (channel, threshold).
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub channel: ChannelKind,
    pub threshold: f64,
    pub count: usize,
    /// Accumulated blob area over nucleus area.
    pub area_fraction: f64,
    /// `[row, col]` centres of the nucleus' blobs.
    pub coords: Vec<[usize; 2]>,
}

pub struct NucleusRecord<'a> {
    pub region: &'a Region,
    pub measurements: Vec<Measurement>,
}

impl NucleusRecord<'_> {
    pub fn get(&self, channel: ChannelKind, threshold: f64) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|m| m.channel == channel && m.threshold == threshold)
    }
}

pub struct TileAnalysis {
    pub regions: Vec<Region>,
    pub detections: Vec<Detection>,
}

/// Detect on a min-max normalised channel at every threshold, reusing one scale space.
fn sweep_channel(
    channel: ChannelKind,
    raw: &Array2<f64>,
    mask: &Array2<u32>,
    params: &BlobParams,
    thresholds: &[f64],
) -> Vec<Detection> {
    if thresholds.is_empty() {
        return Vec::new();
    }
    let space = ScaleSpace::new(&load::min_max_normalize(raw), params);
    thresholds
        .iter()
        .map(|&threshold| {
            let blobs = space.detect(threshold);
            let assignment = assign::assign(&blobs, mask);
            Detection {
                channel,
                threshold,
                blobs,
                assignment,
            }
        })
        .collect()
}

impl TileAnalysis {
    pub fn run(tile: &Tile, params: &BlobParams, thresholds: &Thresholds) -> Self {
        let mut detections = sweep_channel(
            ChannelKind::Rad51,
            &tile.rad51.gray,
            &tile.mask,
            params,
            &thresholds.rad51,
        );
        if let Some(prob) = &tile.probabilities {
            detections.extend(sweep_channel(
                ChannelKind::Probability,
                prob,
                &tile.mask,
                params,
                &thresholds.probability,
            ));
        }
        Self {
            regions: regions::region_props(&tile.mask),
            detections,
        }
    }

    pub fn has_channel(&self, channel: ChannelKind) -> bool {
        self.detections.iter().any(|d| d.channel == channel)
    }

    pub fn detection(&self, channel: ChannelKind, threshold: f64) -> Option<&Detection> {
        self.detections
            .iter()
            .find(|d| d.channel == channel && d.threshold == threshold)
    }

    /// Join region properties with every detection, one record per nucleus in label order.
    pub fn nuclei(&self) -> Vec<NucleusRecord<'_>> {
        self.regions
            .iter()
            .map(|region| {
                let measurements = self
                    .detections
                    .iter()
                    .map(|d| {
                        let foci = d.assignment.foci(region.label);
                        let area_fraction = if region.area > 0 {
                            foci.blob_area / region.area as f64
                        } else {
                            0.0
                        };
                        Measurement {
                            channel: d.channel,
                            threshold: d.threshold,
                            count: foci.count,
                            area_fraction,
                            coords: d
                                .assignment
                                .blobs_of(region.label)
                                .map(|b| [b.row, b.col])
                                .collect(),
                        }
                    })
                    .collect();
                NucleusRecord {
                    region,
                    measurements,
                }
            })
            .collect()
    }
}
