use clap::Args;
use std::fs;
use std::path::Path;

#[derive(Args, Clone)]
pub struct SplitArgs {
    /// Composite image to split
    #[arg(long)]
    pub input: String,
    /// Grid rows
    #[arg(long, default_value_t = 3)]
    pub rows: u32,
    /// Grid columns
    #[arg(long, default_value_t = 5)]
    pub cols: u32,
    /// Output directory for tile_NN.png files
    #[arg(long, default_value = "split_tiles")]
    pub output: String,
}

pub fn run(args: SplitArgs, progress: impl Fn(f64, &str)) -> Result<(), Box<dyn std::error::Error>> {
    if args.rows == 0 || args.cols == 0 {
        return Err("rows and cols must be positive".into());
    }
    let img = image::open(Path::new(&args.input))?;
    let tile_h = img.height() / args.rows;
    let tile_w = img.width() / args.cols;
    if tile_h == 0 || tile_w == 0 {
        return Err(format!(
            "{}x{} image is too small for a {}x{} grid",
            img.width(),
            img.height(),
            args.rows,
            args.cols
        )
        .into());
    }

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;

    let total = args.rows * args.cols;
    for i in 0..args.rows {
        for j in 0..args.cols {
            let idx = i * args.cols + j;
            let tile = img.crop_imm(j * tile_w, i * tile_h, tile_w, tile_h);
            tile.save(out_dir.join(format!("tile_{:02}.png", idx + 1)))?;
            progress(
                (idx + 1) as f64 / total as f64,
                &format!("Saved tile {}/{}", idx + 1, total),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn splits_row_major_and_drops_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("composite.png");
        // 11 x 7: 5 columns of width 2, 3 rows of height 2
        GrayImage::from_fn(11, 7, |x, y| Luma([(10 * y + x) as u8]))
            .save(&input)
            .unwrap();
        let out = dir.path().join("tiles");

        let args = SplitArgs {
            input: input.to_string_lossy().into_owned(),
            rows: 3,
            cols: 5,
            output: out.to_string_lossy().into_owned(),
        };
        run(args, |_, _| {}).unwrap();

        assert_eq!(fs::read_dir(&out).unwrap().count(), 15);
        let t02 = image::open(out.join("tile_02.png")).unwrap().to_luma8();
        assert_eq!(t02.dimensions(), (2, 2));
        assert_eq!(t02.get_pixel(0, 0), &Luma([2]));
        let t06 = image::open(out.join("tile_06.png")).unwrap().to_luma8();
        assert_eq!(t06.get_pixel(1, 1), &Luma([31]));
        assert!(!out.join("tile_16.png").exists());
    }

    #[test]
    fn too_small_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tiny.png");
        GrayImage::new(3, 3).save(&input).unwrap();
        let args = SplitArgs {
            input: input.to_string_lossy().into_owned(),
            rows: 3,
            cols: 5,
            output: dir.path().join("out").to_string_lossy().into_owned(),
        };
        assert!(run(args, |_, _| {}).is_err());
    }
}
