//! Histogram and density plots of per-nucleus foci statistics.

use plotters::prelude::*;
use std::f64::consts::PI;
use std::path::Path;

const STEELBLUE: RGBColor = RGBColor(70, 130, 180);
const PANEL_WIDTH: u32 = 900;
const PANEL_HEIGHT: u32 = 300;
const TITLE_HEIGHT: u32 = 40;
const KDE_GRID: usize = 200;
/// Density curves extend this many bandwidths past the data range.
const KDE_CUT: f64 = 3.0;

/// Number of unit-width bins shared by every panel: `0..=max(max_count, 10)`.
pub fn shared_bin_count<'a>(distributions: impl IntoIterator<Item = &'a [usize]>) -> usize {
    let max_count = distributions
        .into_iter()
        .flat_map(|d| d.iter().copied())
        .max()
        .unwrap_or(0);
    max_count.max(10) + 1
}

/// Count how many values fall in each unit bin `0..n_bins`; larger values land in the last bin.
pub fn count_histogram(values: &[usize], n_bins: usize) -> Vec<usize> {
    let mut bins = vec![0usize; n_bins];
    if n_bins == 0 {
        return bins;
    }
    for &v in values {
        bins[v.min(n_bins - 1)] += 1;
    }
    bins
}

fn integer_label(v: &f64) -> String {
    format!("{v:.0}")
}

/// Vertically stacked histograms of foci per nucleus, one panel per threshold,
/// with shared x and y axes.
pub fn draw_threshold_panels(
    path: &Path,
    panels: &[(f64, Vec<usize>)],
) -> Result<(), Box<dyn std::error::Error>> {
    if panels.is_empty() {
        return Err("No thresholds to plot".into());
    }
    let n_bins = shared_bin_count(panels.iter().map(|(_, d)| d.as_slice()));
    let histograms: Vec<Vec<usize>> = panels
        .iter()
        .map(|(_, d)| count_histogram(d, n_bins))
        .collect();
    let max_y = histograms
        .iter()
        .flat_map(|h| h.iter().copied())
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let root = BitMapBackend::new(
        path,
        (PANEL_WIDTH, PANEL_HEIGHT * panels.len() as u32 + TITLE_HEIGHT),
    )
    .into_drawing_area();
    root.fill(&WHITE)?;
    let body = root.titled(
        "Foci per Nucleus Distribution Across Thresholds",
        ("sans-serif", 28),
    )?;
    let areas = body.split_evenly((panels.len(), 1));

    for (i, (area, ((threshold, _), bins))) in
        areas.iter().zip(panels.iter().zip(&histograms)).enumerate()
    {
        let mut chart = ChartBuilder::on(area)
            .caption(format!("Threshold = {threshold:.3}"), ("sans-serif", 20))
            .margin(5)
            .x_label_area_size(35)
            .y_label_area_size(45)
            .build_cartesian_2d(0.0..n_bins as f64, 0.0..max_y * 1.1)?;

        let mut mesh = chart.configure_mesh();
        mesh.y_desc("Nuclei")
            .x_label_formatter(&integer_label)
            .y_label_formatter(&integer_label);
        if i + 1 == panels.len() {
            mesh.x_desc("Number of Foci per Nucleus");
        }
        mesh.draw()?;

        chart.draw_series(bins.iter().enumerate().map(|(b, &count)| {
            Rectangle::new(
                [(b as f64, 0.0), (b as f64 + 1.0, count as f64)],
                STEELBLUE.mix(0.7).filled(),
            )
        }))?;
        chart.draw_series(bins.iter().enumerate().filter(|(_, &c)| c > 0).map(|(b, &count)| {
            Rectangle::new([(b as f64, 0.0), (b as f64 + 1.0, count as f64)], BLACK)
        }))?;
    }

    root.present()?;
    Ok(())
}

/// Gaussian kernel density estimate with Scott's bandwidth, evaluated on a
/// grid spanning the data range plus `KDE_CUT` bandwidths on each side.
/// `None` when the data has fewer than two values or no spread.
pub fn gaussian_kde(values: &[f64]) -> Option<Vec<(f64, f64)>> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let std = crate::summary::sample_std(values)?;
    if !(std > 0.0) {
        return None;
    }
    let bw = std * (n as f64).powf(-0.2);
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min) - KDE_CUT * bw;
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + KDE_CUT * bw;
    let norm = 1.0 / (n as f64 * bw * (2.0 * PI).sqrt());

    Some(
        (0..KDE_GRID)
            .map(|i| {
                let x = lo + (hi - lo) * i as f64 / (KDE_GRID - 1) as f64;
                let density: f64 = values
                    .iter()
                    .map(|&v| (-0.5 * ((x - v) / bw).powi(2)).exp())
                    .sum();
                (x, density * norm)
            })
            .collect(),
    )
}

/// Overlaid density curves, one per labelled series. Series without spread are skipped.
pub fn draw_density(
    path: &Path,
    title: &str,
    x_desc: &str,
    series: &[(String, Vec<f64>)],
) -> Result<(), Box<dyn std::error::Error>> {
    let curves: Vec<(&str, Vec<(f64, f64)>)> = series
        .iter()
        .filter_map(|(label, values)| match gaussian_kde(values) {
            Some(curve) => Some((label.as_str(), curve)),
            None => {
                log::warn!("{}: no variance in {}, density not drawn", path.display(), label);
                None
            }
        })
        .collect();

    let (mut x_min, mut x_max, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY, 0.0f64);
    for (_, curve) in &curves {
        for &(x, y) in curve {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
    }
    if !(x_max > x_min) {
        (x_min, x_max) = (0.0, 1.0);
    }
    if !(y_max > 0.0) {
        y_max = 1.0;
    }

    let root = BitMapBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max * 1.05)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Density")
        .axis_desc_style(("sans-serif", 16))
        .draw()?;

    for (i, (label, curve)) in curves.into_iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(curve, color.stroke_width(2)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_bins_cover_at_least_ten_foci() {
        let a = vec![0, 2, 3];
        let b = vec![1];
        assert_eq!(shared_bin_count([a.as_slice(), b.as_slice()]), 11);
        let c = vec![14];
        assert_eq!(shared_bin_count([c.as_slice()]), 15);
        assert_eq!(shared_bin_count(std::iter::empty::<&[usize]>()), 11);
    }

    #[test]
    fn histogram_counts_integer_bins() {
        assert_eq!(count_histogram(&[0, 0, 2, 5, 9], 4), vec![2, 0, 1, 2]);
        assert!(count_histogram(&[1], 0).is_empty());
    }

    #[test]
    fn kde_integrates_to_about_one() {
        let values = [0.0, 1.0, 1.0, 2.0, 3.0, 5.0];
        let curve = gaussian_kde(&values).unwrap();
        assert_eq!(curve.len(), KDE_GRID);
        let dx = curve[1].0 - curve[0].0;
        let area: f64 = curve.iter().map(|(_, y)| y * dx).sum();
        assert!((area - 1.0).abs() < 0.02, "area {area}");
    }

    #[test]
    fn kde_needs_spread() {
        assert!(gaussian_kde(&[2.0, 2.0, 2.0]).is_none());
        assert!(gaussian_kde(&[1.0]).is_none());
    }
}
