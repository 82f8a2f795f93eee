//! Nearest-pixel assignment of blobs to the nucleus whose label covers their centre.

use ndarray::Array2;
use std::collections::BTreeMap;

use crate::blob::Blob;

/// Foci accumulated for one nucleus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NucleusFoci {
    pub count: usize,
    /// Sum of `π·σ²` over the nucleus' blobs, in pixels.
    pub blob_area: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignedBlob {
    pub label: u32,
    pub blob: Blob,
}

#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub per_label: BTreeMap<u32, NucleusFoci>,
    /// Kept blobs in detection order.
    pub assigned: Vec<AssignedBlob>,
}

impl Assignment {
    pub fn foci(&self, label: u32) -> NucleusFoci {
        self.per_label.get(&label).copied().unwrap_or_default()
    }

    /// Blobs assigned to `label`, in detection order.
    pub fn blobs_of(&self, label: u32) -> impl Iterator<Item = &Blob> + '_ {
        self.assigned
            .iter()
            .filter(move |a| a.label == label)
            .map(|a| &a.blob)
    }
}

/// Look each blob centre up in the label mask. Centres outside the mask or on
/// background (label 0) are discarded.
pub fn assign(blobs: &[Blob], mask: &Array2<u32>) -> Assignment {
    let mut out = Assignment::default();
    for blob in blobs {
        let label = match mask.get((blob.row, blob.col)) {
            Some(&l) if l > 0 => l,
            _ => continue,
        };
        let entry = out.per_label.entry(label).or_default();
        entry.count += 1;
        entry.blob_area += blob.area();
        out.assigned.push(AssignedBlob { label, blob: *blob });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::f64::consts::PI;

    fn blob(row: usize, col: usize, sigma: f64) -> Blob {
        Blob { row, col, sigma }
    }

    #[test]
    fn accumulates_count_and_area_per_label() {
        let mask = array![[1, 1, 0], [1, 2, 2], [0, 2, 2]];
        let blobs = [
            blob(0, 0, 1.0),
            blob(1, 1, 2.0),
            blob(2, 2, 1.0),
            blob(0, 1, 3.0),
        ];
        let a = assign(&blobs, &mask);

        assert_eq!(a.foci(1).count, 2);
        assert!((a.foci(1).blob_area - 10.0 * PI).abs() < 1e-9);
        assert_eq!(a.foci(2).count, 2);
        assert!((a.foci(2).blob_area - 5.0 * PI).abs() < 1e-9);
        assert_eq!(a.assigned.len(), 4);
        let of_two: Vec<_> = a.blobs_of(2).map(|b| (b.row, b.col)).collect();
        assert_eq!(of_two, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn discards_background_and_out_of_bounds() {
        let mask = array![[0, 3], [3, 3]];
        let blobs = [blob(0, 0, 1.0), blob(5, 0, 1.0), blob(0, 9, 1.0), blob(1, 1, 1.0)];
        let a = assign(&blobs, &mask);
        assert_eq!(a.assigned.len(), 1);
        assert_eq!(a.foci(3).count, 1);
        assert_eq!(a.foci(0), NucleusFoci::default());
        assert_eq!(a.foci(7).count, 0);
    }
}
