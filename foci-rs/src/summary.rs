use clap::Args;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::plots;

#[derive(Args, Clone)]
pub struct SummaryArgs {
    /// Multi-threshold per-nucleus CSV written by `sweep`
    #[arg(long, default_value = "outputs/foci_per_nucleus_multi_threshold.csv")]
    pub input: String,
    /// Output directory for summary tables and density plots
    #[arg(long, default_value = "outputs/analysis")]
    pub output: String,
}

/// Numeric view of a CSV: every cell parsed as `f64`, blanks and text as `None`.
struct Table {
    columns: Vec<String>,
    cells: Vec<Vec<Option<f64>>>,
    n_rows: usize,
}

impl Table {
    fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let columns: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let mut cells = vec![Vec::new(); columns.len()];
        let mut n_rows = 0;
        for record in rdr.records() {
            let record = record?;
            for (i, col) in cells.iter_mut().enumerate() {
                col.push(record.get(i).and_then(|s| s.trim().parse::<f64>().ok()));
            }
            n_rows += 1;
        }
        Ok(Self {
            columns,
            cells,
            n_rows,
        })
    }

    fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.cells[i].as_slice())
    }

    /// Column names starting with `rad51_{metric}` or `prob_{metric}`, in file order.
    fn methods(&self, metric: &str) -> Vec<&str> {
        let (rad51, prob) = (format!("rad51_{metric}"), format!("prob_{metric}"));
        self.columns
            .iter()
            .filter(|c| c.starts_with(&rad51) || c.starts_with(&prob))
            .map(String::as_str)
            .collect()
    }
}

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

#[derive(Debug, Serialize, PartialEq)]
struct Overview {
    #[serde(rename = "Total nuclei analyzed")]
    total: usize,
    #[serde(rename = "Mean area (pixels)")]
    mean_area: Option<f64>,
    #[serde(rename = "Median area (pixels)")]
    median_area: Option<f64>,
    #[serde(rename = "Std area (pixels)")]
    std_area: Option<f64>,
    #[serde(rename = "Min area (pixels)")]
    min_area: Option<f64>,
    #[serde(rename = "Max area (pixels)")]
    max_area: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
struct MethodSummary {
    #[serde(rename = "Method")]
    method: String,
    #[serde(rename = "Avg Foci/Nucleus")]
    mean_count: Option<f64>,
    #[serde(rename = "Median Foci/Nucleus")]
    median_count: Option<f64>,
    #[serde(rename = "Std Foci/Nucleus")]
    std_count: Option<f64>,
    #[serde(rename = "% Nuclei with ≥1 Foci")]
    percent_with_foci: Option<f64>,
    #[serde(rename = "Max Foci Observed")]
    max_count: Option<f64>,
    #[serde(rename = "Avg Foci Area Fraction")]
    mean_area_fraction: Option<f64>,
    #[serde(rename = "Median Foci Area Fraction")]
    median_area_fraction: Option<f64>,
    #[serde(rename = "Std Foci Area Fraction")]
    std_area_fraction: Option<f64>,
}

fn overview(table: &Table) -> Result<Overview, Box<dyn std::error::Error>> {
    let area = present(table.column("area").ok_or("CSV has no 'area' column")?);
    Ok(Overview {
        total: table.n_rows,
        mean_area: mean(&area),
        median_area: median(&area),
        std_area: sample_std(&area),
        min_area: min(&area),
        max_area: max(&area),
    })
}

/// `rad51_count_th0.2` -> `rad51: th0.2`
fn method_label(column: &str, metric: &str) -> String {
    column.replacen(&format!("_{metric}_"), ": ", 1)
}

fn by_method(table: &Table) -> Vec<MethodSummary> {
    table
        .methods("count")
        .into_iter()
        .filter_map(|count_col| {
            let raw = table.column(count_col)?;
            let counts = present(raw);
            let areas = table
                .column(&count_col.replacen("_count_", "_area_", 1))
                .map(present)
                .unwrap_or_default();
            // blanks count as nuclei without foci
            let percent_with_foci = (table.n_rows > 0).then(|| {
                counts.iter().filter(|&&c| c > 0.0).count() as f64 / table.n_rows as f64 * 100.0
            });
            Some(MethodSummary {
                method: method_label(count_col, "count"),
                mean_count: mean(&counts),
                median_count: median(&counts),
                std_count: sample_std(&counts),
                percent_with_foci,
                max_count: max(&counts),
                mean_area_fraction: mean(&areas),
                median_area_fraction: median(&areas),
                std_area_fraction: sample_std(&areas),
            })
        })
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(v: Option<f64>) -> String {
    v.map_or_else(|| "NaN".to_string(), |v| format!("{v:.6}"))
}

fn print_tables(overview: &Overview, methods: &[MethodSummary]) {
    println!("\n===== General Overview =====");
    println!("{:<24}{:>16}", "Total nuclei analyzed", overview.total);
    for (name, v) in [
        ("Mean area (pixels)", overview.mean_area),
        ("Median area (pixels)", overview.median_area),
        ("Std area (pixels)", overview.std_area),
        ("Min area (pixels)", overview.min_area),
        ("Max area (pixels)", overview.max_area),
    ] {
        println!("{:<24}{:>16}", name, cell(v));
    }

    println!("\n===== Summary of Foci Detection by Method =====");
    println!(
        "{:<18}{:>12}{:>12}{:>12}{:>12}{:>12}{:>14}{:>14}{:>14}",
        "Method", "Avg", "Median", "Std", "% >=1", "Max", "Avg area", "Median area", "Std area"
    );
    for m in methods {
        println!(
            "{:<18}{:>12}{:>12}{:>12}{:>12}{:>12}{:>14}{:>14}{:>14}",
            m.method,
            cell(m.mean_count),
            cell(m.median_count),
            cell(m.std_count),
            cell(m.percent_with_foci),
            cell(m.max_count),
            cell(m.mean_area_fraction),
            cell(m.median_area_fraction),
            cell(m.std_area_fraction),
        );
    }
}

fn density_series(table: &Table, metric: &str) -> Vec<(String, Vec<f64>)> {
    table
        .methods(metric)
        .into_iter()
        .filter_map(|col| Some((method_label(col, metric), present(table.column(col)?))))
        .collect()
}

pub fn run(args: SummaryArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    let input = Path::new(&args.input);
    if !input.is_file() {
        return Err(format!("Input CSV not found: {}", input.display()).into());
    }
    let table = Table::read(input)?;
    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;

    let overview = overview(&table)?;
    let methods = by_method(&table);
    write_rows(&out_dir.join("summary_overview.csv"), std::slice::from_ref(&overview))?;
    write_rows(&out_dir.join("summary_by_method.csv"), &methods)?;
    print_tables(&overview, &methods);
    progress(0.5, "Wrote summary tables");

    plots::draw_density(
        &out_dir.join("foci_count_distributions.png"),
        "Distribution of Foci Counts per Nucleus (Biological Scale)",
        "Number of RAD51 Foci per Nucleus",
        &density_series(&table, "count"),
    )?;
    plots::draw_density(
        &out_dir.join("foci_area_distributions.png"),
        "Distribution of RAD51+ Area Fraction per Nucleus",
        "RAD51+ Area Fraction",
        &density_series(&table, "area"),
    )?;

    progress(1.0, &format!("Summaries and plots saved in {}", out_dir.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWEEP: &str = "\
image_id,tile_id,region_id,area,rad51_count_th0.2,rad51_area_th0.2,prob_count_th0.3,prob_area_th0.3
A1,tile_01,1,100,2,0.1,1,0.05
A1,tile_01,2,200,0,0.0,3,0.2
A1,tile_02,1,300,1,0.05,,
A1,tile_02,2,400,3,0.25,,
";

    fn table() -> (tempfile::TempDir, Table) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        fs::write(&path, SWEEP).unwrap();
        let table = Table::read(&path).unwrap();
        (dir, table)
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn statistics_follow_sample_conventions() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert!(close(sample_std(&[1.0, 2.0, 3.0, 4.0]), (5.0f64 / 3.0).sqrt()));
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn overview_describes_nucleus_areas() {
        let (_dir, table) = table();
        let o = overview(&table).unwrap();
        assert_eq!(o.total, 4);
        assert_eq!(o.mean_area, Some(250.0));
        assert_eq!(o.median_area, Some(250.0));
        assert_eq!(o.min_area, Some(100.0));
        assert_eq!(o.max_area, Some(400.0));
        assert!(close(o.std_area, (50000.0f64 / 3.0).sqrt()));
    }

    #[test]
    fn methods_skip_blank_cells() {
        let (_dir, table) = table();
        let methods = by_method(&table);
        assert_eq!(methods.len(), 2);

        let rad51 = &methods[0];
        assert_eq!(rad51.method, "rad51: th0.2");
        assert_eq!(rad51.mean_count, Some(1.5));
        assert_eq!(rad51.percent_with_foci, Some(75.0));
        assert_eq!(rad51.max_count, Some(3.0));
        assert!(close(rad51.mean_area_fraction, 0.1));

        let prob = &methods[1];
        assert_eq!(prob.method, "prob: th0.3");
        assert_eq!(prob.mean_count, Some(2.0));
        assert_eq!(prob.median_count, Some(2.0));
        assert_eq!(prob.percent_with_foci, Some(50.0));
        assert!(close(prob.std_area_fraction, (0.01125f64).sqrt()));
    }

    #[test]
    fn summary_tables_are_written_with_headers() {
        let (dir, table) = table();
        let path = dir.path().join("by_method.csv");
        write_rows(&path, &by_method(&table)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("Method,Avg Foci/Nucleus,Median Foci/Nucleus"));
        assert!(header.contains("% Nuclei with ≥1 Foci"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn density_series_are_labelled_by_method() {
        let (_dir, table) = table();
        let series = density_series(&table, "area");
        assert_eq!(series[0].0, "rad51: th0.2");
        assert_eq!(series[1], ("prob: th0.3".to_string(), vec![0.05, 0.2]));
    }
}
