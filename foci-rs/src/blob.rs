//! Multi-scale Laplacian-of-Gaussian blob detection.
//!
//! The scale space for a channel is built once and then queried at any number
//! of thresholds, so a threshold sweep costs one set of convolutions per tile.

use ndarray::Array2;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::f64::consts::{PI, SQRT_2};

use crate::filters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobParams {
    pub min_sigma: f64,
    pub max_sigma: f64,
    pub num_sigma: usize,
    /// Blobs overlapping by more than this fraction of the smaller disk are merged.
    pub overlap: f64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_sigma: 1.0,
            max_sigma: 4.0,
            num_sigma: 10,
            overlap: 0.5,
        }
    }
}

impl BlobParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_sigma > 0.0) {
            return Err(format!("min_sigma must be positive, got {}", self.min_sigma));
        }
        if self.max_sigma < self.min_sigma {
            return Err(format!(
                "max_sigma ({}) must not be below min_sigma ({})",
                self.max_sigma, self.min_sigma
            ));
        }
        if self.num_sigma == 0 {
            return Err("num_sigma must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.overlap) {
            return Err(format!("overlap must lie in [0, 1], got {}", self.overlap));
        }
        Ok(())
    }

    /// Scales linearly spaced on `[min_sigma, max_sigma]`.
    pub fn sigmas(&self) -> Vec<f64> {
        if self.num_sigma == 1 {
            return vec![self.min_sigma];
        }
        let step = (self.max_sigma - self.min_sigma) / (self.num_sigma - 1) as f64;
        (0..self.num_sigma)
            .map(|i| {
                if i + 1 == self.num_sigma {
                    self.max_sigma
                } else {
                    self.min_sigma + i as f64 * step
                }
            })
            .collect()
    }
}

/// A detected blob: integer centre plus the scale it peaked at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub row: usize,
    pub col: usize,
    pub sigma: f64,
}

impl Blob {
    /// Area credited to the blob, `π·σ²`.
    pub fn area(&self) -> f64 {
        PI * self.sigma * self.sigma
    }

    /// Radius of the blob's disk, `√2·σ`.
    pub fn radius(&self) -> f64 {
        SQRT_2 * self.sigma
    }
}

/// Scale-normalised LoG responses `-σ²·∇²(G_σ * I)`, one layer per scale.
pub struct ScaleSpace {
    sigmas: Vec<f64>,
    layers: Vec<Array2<f64>>,
    overlap: f64,
}

impl ScaleSpace {
    pub fn new(image: &Array2<f64>, params: &BlobParams) -> Self {
        let sigmas = params.sigmas();
        let layers = sigmas
            .iter()
            .map(|&s| filters::gaussian_laplace(image, s).mapv_into(|v| -v * s * s))
            .collect();
        Self {
            sigmas,
            layers,
            overlap: params.overlap,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.layers.first().map(|l| l.dim()).unwrap_or((0, 0))
    }

    /// Blobs whose response is a 3×3×3 local maximum strictly above `threshold`,
    /// with overlapping blobs pruned.
    pub fn detect(&self, threshold: f64) -> Vec<Blob> {
        prune(self.local_maxima(threshold), self.overlap)
    }

    fn is_trivial(&self) -> bool {
        let mut values = self.layers.iter().flat_map(|l| l.iter());
        match values.next() {
            None => true,
            Some(&first) => {
                let total: usize = self.layers.iter().map(|l| l.len()).sum();
                total > 1 && values.all(|&v| v == first)
            }
        }
    }

    /// Peaks ordered by descending response; ties keep (row, col, scale) order.
    fn local_maxima(&self, threshold: f64) -> Vec<Blob> {
        if self.is_trivial() {
            return Vec::new();
        }
        let (h, w) = self.dim();
        let n_s = self.layers.len();
        let mut peaks: Vec<(f64, Blob)> = Vec::new();

        for r in 0..h {
            for c in 0..w {
                for s in 0..n_s {
                    let v = self.layers[s][[r, c]];
                    if !(v > threshold) || !self.is_neighbourhood_max(v, r, c, s) {
                        continue;
                    }
                    peaks.push((
                        v,
                        Blob {
                            row: r,
                            col: c,
                            sigma: self.sigmas[s],
                        },
                    ));
                }
            }
        }

        peaks.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        peaks.into_iter().map(|(_, blob)| blob).collect()
    }

    fn is_neighbourhood_max(&self, v: f64, r: usize, c: usize, s: usize) -> bool {
        let (h, w) = self.dim();
        let n_s = self.layers.len();
        for ss in s.saturating_sub(1)..=(s + 1).min(n_s - 1) {
            let layer = &self.layers[ss];
            for rr in r.saturating_sub(1)..=(r + 1).min(h - 1) {
                for cc in c.saturating_sub(1)..=(c + 1).min(w - 1) {
                    if layer[[rr, cc]] > v {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Index pairs `(i, j)`, `i < j`, whose centres lie within `reach` of each other.
fn pairs_within(blobs: &[Blob], reach: f64) -> Vec<(usize, usize)> {
    let cell = reach.max(1.0);
    let key = |b: &Blob| ((b.row as f64 / cell) as i64, (b.col as f64 / cell) as i64);

    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, b) in blobs.iter().enumerate() {
        grid.entry(key(b)).or_default().push(i);
    }

    let mut pairs = Vec::new();
    for (i, a) in blobs.iter().enumerate() {
        let (kr, kc) = key(a);
        for dr in -1..=1 {
            for dc in -1..=1 {
                let Some(bucket) = grid.get(&(kr + dr, kc + dc)) else {
                    continue;
                };
                for &j in bucket.iter().filter(|&&j| j > i) {
                    let b = &blobs[j];
                    let d = (a.row as f64 - b.row as f64).hypot(a.col as f64 - b.col as f64);
                    if d <= reach {
                        pairs.push((i, j));
                    }
                }
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Fraction of the smaller disk covered by the intersection of two blob disks.
fn overlap_fraction(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let (ra, ca, sa) = a;
    let (rb, cb, sb) = b;
    if sa == 0.0 && sb == 0.0 {
        return 0.0;
    }
    let (max_sigma, r1, r2) = if sa > sb {
        (sa, 1.0, sb / sa)
    } else {
        (sb, sa / sb, 1.0)
    };
    let d = (ra - rb).hypot(ca - cb) / (max_sigma * SQRT_2);
    if d > r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        return 1.0;
    }
    disk_overlap(d, r1, r2)
}

fn disk_overlap(d: f64, r1: f64, r2: f64) -> f64 {
    let ratio1 = ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).clamp(-1.0, 1.0);
    let ratio2 = ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).clamp(-1.0, 1.0);
    let a = -d + r2 + r1;
    let b = d - r2 + r1;
    let c = d + r2 - r1;
    let e = d + r2 + r1;
    let area = r1 * r1 * ratio1.acos() + r2 * r2 * ratio2.acos() - 0.5 * (a * b * c * e).abs().sqrt();
    area / (PI * r1.min(r2).powi(2))
}

/// Drop the smaller of every pair of blobs that overlap by more than `overlap`.
fn prune(blobs: Vec<Blob>, overlap: f64) -> Vec<Blob> {
    if blobs.len() < 2 {
        return blobs;
    }
    let max_sigma = blobs.iter().map(|b| b.sigma).fold(0.0, f64::max);
    let mut sigmas: Vec<f64> = blobs.iter().map(|b| b.sigma).collect();

    for (i, j) in pairs_within(&blobs, 2.0 * max_sigma * SQRT_2) {
        let a = (blobs[i].row as f64, blobs[i].col as f64, sigmas[i]);
        let b = (blobs[j].row as f64, blobs[j].col as f64, sigmas[j]);
        if overlap_fraction(a, b) > overlap {
            if sigmas[i] > sigmas[j] {
                sigmas[j] = 0.0;
            } else {
                sigmas[i] = 0.0;
            }
        }
    }

    blobs
        .into_iter()
        .zip(sigmas)
        .filter(|(_, s)| *s > 0.0)
        .map(|(b, _)| b)
        .collect()
}
