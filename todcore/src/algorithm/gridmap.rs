use ndarray::{s, Array2};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::error::GridmapError;

/// Configuration for the scattered-point re-gridding routine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridmapConfig {
    /// Integer box-downsampling factor applied after smoothing (default: 2)
    pub downsample_factor: usize,
    /// Gaussian smoothing kernel sigma in cells (default: 3.0)
    pub smooth_pix: f64,
}

impl Default for GridmapConfig {
    fn default() -> Self {
        GridmapConfig {
            downsample_factor: 2,
            smooth_pix: 3.0,
        }
    }
}

/// Grid scattered `(x, y, value)` triples into a smoothed raster.
///
/// The raster spans the bounding box of the points plus a 3-cell margin.
/// Values scatter-add into their rounded-to-nearest cell, the raster is
/// convolved cyclically with a circular Gaussian kernel in the frequency
/// domain, re-centered with an fft shift, and box-downsampled.
///
/// Deterministic: identical inputs and configuration produce bit-identical
/// output. Requires at least one point and a positive downsample factor.
pub fn gridmap(
    x: &[f64],
    y: &[f64],
    v: &[f64],
    config: &GridmapConfig,
) -> Result<Array2<f64>, GridmapError> {
    if x.is_empty() {
        return Err(GridmapError::EmptyInput);
    }
    if x.len() != y.len() || x.len() != v.len() {
        return Err(GridmapError::LengthMismatch {
            x: x.len(),
            y: y.len(),
            v: v.len(),
        });
    }
    if config.downsample_factor == 0 {
        return Err(GridmapError::ZeroDownsampleFactor);
    }
    if x.iter().chain(y.iter()).any(|c| !c.is_finite()) {
        return Err(GridmapError::NonFiniteCoordinate);
    }

    let raster = scatter_raster(x, y, v);
    let (rows, cols) = raster.dim();
    let kernel = gaussian_kernel(rows, cols, config.smooth_pix);

    let smoothed = convolve_cyclic(&raster, &kernel);
    let centered = fftshift(&smoothed);
    Ok(downsample(&centered, config.downsample_factor))
}

/// Scatter-add values into a raster sized to the point bounding box plus a
/// 3-cell margin. Colliding points accumulate by addition.
fn scatter_raster(x: &[f64], y: &[f64], v: &[f64]) -> Array2<f64> {
    let (x_min, x_max) = bounds(x);
    let (y_min, y_max) = bounds(y);
    let cols = (x_max - x_min).ceil() as usize + 3;
    let rows = (y_max - y_min).ceil() as usize + 3;

    let mut raster = Array2::<f64>::zeros((rows, cols));
    for ((&xi, &yi), &vi) in x.iter().zip(y.iter()).zip(v.iter()) {
        let col = (xi - x_min).round() as usize;
        let row = (yi - y_min).round() as usize;
        raster[[row, col]] += vi;
    }
    raster
}

fn bounds(coords: &[f64]) -> (f64, f64) {
    coords.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &c| {
        (lo.min(c), hi.max(c))
    })
}

/// Unit-amplitude circular Gaussian centered at `(rows / 2, cols / 2)`.
pub fn gaussian_kernel(rows: usize, cols: usize, sigma: f64) -> Array2<f64> {
    let cy = rows as f64 / 2.0;
    let cx = cols as f64 / 2.0;
    let denom = 2.0 * sigma * sigma;
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let dy = i as f64 - cy;
        let dx = j as f64 - cx;
        (-(dy * dy + dx * dx) / denom).exp()
    })
}

/// Cyclic 2-D convolution by pointwise multiplication in frequency space.
fn convolve_cyclic(raster: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = raster.dim();
    let mut planner = FftPlanner::<f64>::new();

    let mut raster_f = raster.mapv(|r| Complex64::new(r, 0.0));
    let mut kernel_f = kernel.mapv(|k| Complex64::new(k, 0.0));
    fft2(&mut raster_f, &mut planner, false);
    fft2(&mut kernel_f, &mut planner, false);

    let mut product = raster_f * kernel_f;
    fft2(&mut product, &mut planner, true);

    // rustfft leaves the inverse transform unnormalized
    let norm = (rows * cols) as f64;
    product.mapv(|c| c.re / norm)
}

/// In-place 2-D FFT, rows then columns.
fn fft2(data: &mut Array2<Complex64>, planner: &mut FftPlanner<f64>, inverse: bool) {
    let (rows, cols) = data.dim();

    let row_fft = if inverse {
        planner.plan_fft_inverse(cols)
    } else {
        planner.plan_fft_forward(cols)
    };
    for mut row in data.rows_mut() {
        let mut buf: Vec<Complex64> = row.to_vec();
        row_fft.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    let col_fft = if inverse {
        planner.plan_fft_inverse(rows)
    } else {
        planner.plan_fft_forward(rows)
    };
    for j in 0..cols {
        let mut buf: Vec<Complex64> = data.column(j).to_vec();
        col_fft.process(&mut buf);
        for (i, val) in buf.into_iter().enumerate() {
            data[[i, j]] = val;
        }
    }
}

/// Cyclic shift undoing the kernel's implicit origin offset, numpy
/// `fftshift` semantics: each axis rolls by half its length.
fn fftshift(input: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let mut out = Array2::<f64>::zeros((rows, cols));
    for ((i, j), &val) in input.indexed_iter() {
        out[[(i + rows / 2) % rows, (j + cols / 2) % cols]] = val;
    }
    out
}

/// Box-downsample by an integer factor: truncate each axis to a multiple of
/// the factor, then average each factor-by-factor block. A factor of one
/// returns the input unchanged.
pub fn downsample(arr: &Array2<f64>, factor: usize) -> Array2<f64> {
    if factor <= 1 {
        return arr.clone();
    }
    let (rows, cols) = arr.dim();
    let out_rows = rows / factor;
    let out_cols = cols / factor;
    let block_n = (factor * factor) as f64;
    Array2::from_shape_fn((out_rows, out_cols), |(i, j)| {
        let block = arr.slice(s![
            i * factor..(i + 1) * factor,
            j * factor..(j + 1) * factor
        ]);
        block.sum() / block_n
    })
}
