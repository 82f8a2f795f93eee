//! Image decoding for a tile: fluorescence channels, nucleus label masks and
//! probability maps, normalised into `ndarray` rasters indexed `[[row, col]]`.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, ArrayD};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Luminance weights applied to linear `[0, 1]` RGB channels.
const LUMA_WEIGHTS: [f64; 3] = [0.2125, 0.7154, 0.0721];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode TIFF {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("failed to read npy {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
    #[error("unsupported pixel format in {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },
    #[error("{path}: expected a 2-D raster, found {samples} samples per pixel")]
    NotTwoDimensional { path: PathBuf, samples: usize },
    #[error("{path}: invalid label value {value}")]
    InvalidLabel { path: PathBuf, value: f64 },
}

/// A fluorescence channel ready for detection and display.
pub struct Intensity {
    /// Single-channel intensity: raw values for grayscale input, 0-255 luminance for colour.
    pub gray: Array2<f64>,
    /// 8-bit RGB rendition used as the background of overlays.
    pub display: RgbImage,
}

/// Decoded TIFF samples, interleaved per pixel.
struct Raster {
    width: usize,
    height: usize,
    samples: usize,
    data: Vec<f64>,
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

fn is_npy(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("npy"))
        .unwrap_or(false)
}

fn open_image(path: &Path) -> Result<DynamicImage, LoadError> {
    image::open(path).map_err(|source| LoadError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn read_tiff_raster(path: &Path) -> Result<Raster, LoadError> {
    let tiff_err = |source| LoadError::Tiff {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let data: Vec<f64> = match decoder.read_image().map_err(tiff_err)? {
        tiff::decoder::DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        tiff::decoder::DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        tiff::decoder::DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        tiff::decoder::DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: "unsupported TIFF sample type".to_string(),
            })
        }
    };
    let (width, height) = (width as usize, height as usize);
    let pixels = width * height;
    if pixels == 0 || data.len() % pixels != 0 {
        return Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: format!("{} samples for a {}x{} image", data.len(), width, height),
        });
    }
    Ok(Raster {
        width,
        height,
        samples: data.len() / pixels,
        data,
    })
}

/// Read a fluorescence image and reduce it to one intensity channel.
///
/// Grayscale pixels keep their raw value. Colour pixels are composited onto
/// white (alpha), converted to luminance and scaled to a truncated 0-255 value.
pub fn read_intensity(path: &Path) -> Result<Intensity, LoadError> {
    let img = open_image(path)?;
    let (w, h) = (img.width() as usize, img.height() as usize);

    let gray: Array2<f64> = match &img {
        DynamicImage::ImageLuma8(buf) => {
            Array2::from_shape_fn((h, w), |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as f64)
        }
        DynamicImage::ImageLuma16(buf) => {
            Array2::from_shape_fn((h, w), |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as f64)
        }
        DynamicImage::ImageLumaA8(buf) => {
            Array2::from_shape_fn((h, w), |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as f64)
        }
        DynamicImage::ImageLumaA16(buf) => {
            Array2::from_shape_fn((h, w), |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as f64)
        }
        _ => {
            let rgb = composite_on_white(&img);
            let gray = Array2::from_shape_fn((h, w), |(r, c)| {
                let px = &rgb[r * w + c];
                let lum: f64 = px.iter().zip(LUMA_WEIGHTS).map(|(v, k)| v * k).sum();
                (lum * 255.0) as u8 as f64
            });
            let display = RgbImage::from_fn(w as u32, h as u32, |x, y| {
                let px = &rgb[y as usize * w + x as usize];
                Rgb([
                    (px[0] * 255.0) as u8,
                    (px[1] * 255.0) as u8,
                    (px[2] * 255.0) as u8,
                ])
            });
            return Ok(Intensity { gray, display });
        }
    };

    let display = if matches!(img, DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_)) {
        RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let v = gray[[y as usize, x as usize]] as u8;
            Rgb([v, v, v])
        })
    } else {
        let scaled = to_gray_u8(&gray);
        RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let v = scaled.get_pixel(x, y)[0];
            Rgb([v, v, v])
        })
    };
    Ok(Intensity { gray, display })
}

/// Composite any colour image onto a white background, returning `[0, 1]` RGB per pixel.
fn composite_on_white(img: &DynamicImage) -> Vec<[f64; 3]> {
    let blend = |rgb: [f64; 3], alpha: f64| {
        rgb.map(|v| (alpha * v + (1.0 - alpha)).clamp(0.0, 1.0))
    };
    match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => img
            .to_rgba32f()
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0.map(f64::from);
                blend([r, g, b], a)
            })
            .collect(),
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img
            .to_rgba8()
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0.map(|v| v as f64 / 255.0);
                blend([r, g, b], a)
            })
            .collect(),
        _ => img
            .to_rgba16()
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0.map(|v| v as f64 / 65535.0);
                blend([r, g, b], a)
            })
            .collect(),
    }
}

/// Read a float64 or float32 `.npy` array shaped `(H, W)` or `(H, W, samples)`.
fn read_npy_raster(path: &Path) -> Result<Raster, LoadError> {
    let open = || {
        fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    let npy_err = |source| LoadError::Npy {
        path: path.to_path_buf(),
        source,
    };
    let array: ArrayD<f64> = match ArrayD::<f64>::read_npy(open()?) {
        Ok(a) => a,
        Err(ReadNpyError::WrongDescriptor(_)) => ArrayD::<f32>::read_npy(open()?)
            .map_err(npy_err)?
            .mapv(f64::from),
        Err(e) => return Err(npy_err(e)),
    };

    let (height, width, samples) = match *array.shape() {
        [h, w] => (h, w, 1),
        [h, w, s] => (h, w, s),
        ref shape => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("expected a 2-D or 3-D array, found shape {:?}", shape),
            })
        }
    };
    Ok(Raster {
        width,
        height,
        samples,
        // logical (row, col, sample) order whatever the memory layout
        data: array.iter().copied().collect(),
    })
}

/// Read an integer nucleus label mask (0 = background).
pub fn read_label_mask(path: &Path) -> Result<Array2<u32>, LoadError> {
    if is_tiff(path) {
        let raster = read_tiff_raster(path)?;
        if raster.samples != 1 {
            return Err(LoadError::NotTwoDimensional {
                path: path.to_path_buf(),
                samples: raster.samples,
            });
        }
        if let Some(&bad) = raster
            .data
            .iter()
            .find(|&&v| v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64)
        {
            return Err(LoadError::InvalidLabel {
                path: path.to_path_buf(),
                value: bad,
            });
        }
        let labels: Vec<u32> = raster.data.iter().map(|&v| v as u32).collect();
        return Array2::from_shape_vec((raster.height, raster.width), labels).map_err(|e| {
            LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        });
    }

    let img = open_image(path)?;
    let buf = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => img.to_luma16(),
        other => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("label masks must be grayscale, got {:?}", other.color()),
            })
        }
    };
    let (w, h) = (buf.width() as usize, buf.height() as usize);
    Ok(Array2::from_shape_fn((h, w), |(r, c)| {
        buf.get_pixel(c as u32, r as u32)[0] as u32
    }))
}

/// Read a pixel-classifier probability map from TIFF, PNG or `.npy`. Two-sample
/// maps keep sample 1 (foreground).
pub fn read_probabilities(path: &Path) -> Result<Array2<f64>, LoadError> {
    let raster = if is_tiff(path) {
        read_tiff_raster(path)?
    } else if is_npy(path) {
        read_npy_raster(path)?
    } else {
        let img = open_image(path)?;
        let (width, height) = (img.width() as usize, img.height() as usize);
        let (samples, data): (usize, Vec<f64>) = match &img {
            DynamicImage::ImageLuma8(b) => (1, b.as_raw().iter().map(|&v| v as f64).collect()),
            DynamicImage::ImageLuma16(b) => (1, b.as_raw().iter().map(|&v| v as f64).collect()),
            DynamicImage::ImageLumaA8(b) => (2, b.as_raw().iter().map(|&v| v as f64).collect()),
            DynamicImage::ImageLumaA16(b) => (2, b.as_raw().iter().map(|&v| v as f64).collect()),
            other => (other.color().channel_count() as usize, Vec::new()),
        };
        Raster {
            width,
            height,
            samples,
            data,
        }
    };

    let pick = match raster.samples {
        1 => 0,
        2 => 1,
        samples => {
            return Err(LoadError::NotTwoDimensional {
                path: path.to_path_buf(),
                samples,
            })
        }
    };
    let s = raster.samples;
    let w = raster.width;
    Ok(Array2::from_shape_fn((raster.height, raster.width), |(r, c)| {
        raster.data[(r * w + c) * s + pick]
    }))
}

/// Min-max normalise to `[0, 1]`. A constant raster maps to zeros.
pub fn min_max_normalize(values: &Array2<f64>) -> Array2<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !(range > 0.0) {
        return Array2::zeros(values.raw_dim());
    }
    values.mapv(|v| (v - min) / range)
}

/// Min-max scale to a truncated 8-bit image for visual inspection.
pub fn to_gray_u8(values: &Array2<f64>) -> GrayImage {
    let norm = min_max_normalize(values);
    let (h, w) = norm.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([(norm[[y as usize, x as usize]] * 255.0) as u8])
    })
}
