//! Separable Gaussian derivative filters used to build the LoG scale space.

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

/// Kernels are truncated at this many standard deviations.
const TRUNCATE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Smooth,
    SecondDerivative,
}

/// Sampled Gaussian or its second derivative, radius `floor(TRUNCATE * sigma + 0.5)`.
///
/// The derivative kernel is `(x² / σ⁴ - 1 / σ²) · φ(x)` where `φ` is the
/// Gaussian normalised to unit sum.
pub fn gaussian_kernel_1d(sigma: f64, order: Order) -> Vec<f64> {
    assert!(sigma > 0.0, "Sigma must be positive");
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let sigma2 = sigma * sigma;

    let phi: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 / sigma2 * (x * x) as f64).exp())
        .collect();
    let sum: f64 = phi.iter().sum();

    (-radius..=radius)
        .zip(phi)
        .map(|(x, p)| {
            let p = p / sum;
            match order {
                Order::Smooth => p,
                Order::SecondDerivative => {
                    ((x * x) as f64 / (sigma2 * sigma2) - 1.0 / sigma2) * p
                }
            }
        })
        .collect()
}

/// Map an out-of-range index into `0..n` by mirroring with the edge sample
/// repeated (`d c b a | a b c d | d c b a`).
#[inline]
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - 1 - m }) as usize
}

fn correlate_lane(input: ArrayView1<f64>, mut output: ArrayViewMut1<f64>, kernel: &[f64]) {
    let n = input.len();
    let radius = (kernel.len() / 2) as isize;
    for i in 0..n {
        let mut acc = 0.0;
        for (k, &w) in kernel.iter().enumerate() {
            let j = i as isize + k as isize - radius;
            let j = if j >= 0 && (j as usize) < n {
                j as usize
            } else {
                reflect_index(j, n)
            };
            acc += w * input[j];
        }
        output[i] = acc;
    }
}

/// Correlate every lane along `axis` with a 1-D kernel.
fn correlate_axis(image: &Array2<f64>, axis: Axis, kernel: &[f64]) -> Array2<f64> {
    let mut out = Array2::zeros(image.raw_dim());
    for (src, dst) in image.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        correlate_lane(src, dst, kernel);
    }
    out
}

/// Laplacian of Gaussian: the sum over both axes of the second derivative
/// along that axis, smoothed by the Gaussian along the other.
pub fn gaussian_laplace(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
    let smooth = gaussian_kernel_1d(sigma, Order::Smooth);
    let second = gaussian_kernel_1d(sigma, Order::SecondDerivative);

    let d_rows = correlate_axis(&correlate_axis(image, Axis(0), &second), Axis(1), &smooth);
    let d_cols = correlate_axis(&correlate_axis(image, Axis(0), &smooth), Axis(1), &second);
    d_rows + d_cols
}
