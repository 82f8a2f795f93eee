use ndarray::Array2;
use std::collections::BTreeMap;

/// Geometric summary of one labelled nucleus.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub label: u32,
    /// Pixel count.
    pub area: usize,
    /// Mean (row, col) of the region's pixels.
    pub centroid: (f64, f64),
    /// (min_row, min_col, max_row + 1, max_col + 1)
    pub bbox: (usize, usize, usize, usize),
}

struct Accum {
    count: usize,
    sum_r: f64,
    sum_c: f64,
    min_r: usize,
    min_c: usize,
    max_r: usize,
    max_c: usize,
}

/// Per-label properties of a mask, ordered by label. Background (0) is skipped.
pub fn region_props(mask: &Array2<u32>) -> Vec<Region> {
    let mut acc: BTreeMap<u32, Accum> = BTreeMap::new();
    for ((r, c), &label) in mask.indexed_iter() {
        if label == 0 {
            continue;
        }
        let a = acc.entry(label).or_insert(Accum {
            count: 0,
            sum_r: 0.0,
            sum_c: 0.0,
            min_r: r,
            min_c: c,
            max_r: r,
            max_c: c,
        });
        a.count += 1;
        a.sum_r += r as f64;
        a.sum_c += c as f64;
        a.min_r = a.min_r.min(r);
        a.min_c = a.min_c.min(c);
        a.max_r = a.max_r.max(r);
        a.max_c = a.max_c.max(c);
    }

    acc.into_iter()
        .map(|(label, a)| Region {
            label,
            area: a.count,
            centroid: (a.sum_r / a.count as f64, a.sum_c / a.count as f64),
            bbox: (a.min_r, a.min_c, a.max_r + 1, a.max_c + 1),
        })
        .collect()
}

/// All `[row, col]` pixel coordinates of every label, in row-major order.
pub fn pixel_coords(mask: &Array2<u32>) -> BTreeMap<u32, Vec<[usize; 2]>> {
    let mut out: BTreeMap<u32, Vec<[usize; 2]>> = BTreeMap::new();
    for ((r, c), &label) in mask.indexed_iter() {
        if label != 0 {
            out.entry(label).or_default().push([r, c]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn computes_area_centroid_and_bbox() {
        let mask = array![
            [0, 0, 0, 0],
            [0, 5, 5, 0],
            [0, 5, 0, 2],
            [0, 0, 0, 2],
        ];
        let regions = region_props(&mask);
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].label, 2);
        assert_eq!(regions[0].area, 2);
        assert_eq!(regions[0].centroid, (2.5, 3.0));
        assert_eq!(regions[0].bbox, (2, 3, 4, 4));

        assert_eq!(regions[1].label, 5);
        assert_eq!(regions[1].area, 3);
        assert!((regions[1].centroid.0 - 4.0 / 3.0).abs() < 1e-12);
        assert!((regions[1].centroid.1 - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(regions[1].bbox, (1, 1, 3, 3));
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = Array2::<u32>::zeros((3, 3));
        assert!(region_props(&mask).is_empty());
        assert!(pixel_coords(&mask).is_empty());
    }

    #[test]
    fn pixel_coords_are_row_major() {
        let mask = array![[1, 0], [1, 1]];
        let coords = pixel_coords(&mask);
        assert_eq!(coords[&1], vec![[0, 0], [1, 0], [1, 1]]);
    }
}
