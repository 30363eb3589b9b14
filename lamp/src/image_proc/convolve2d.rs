//! 2D convolution implementation for image processing
//!
//! Provides the zero-padded convolution and pixel-integrated Gaussian kernel
//! used to smooth rasterised source images.

use ndarray::{Array2, ArrayView2};
use scilib::math::basic::erf;
use std::f64::consts::SQRT_2;

use crate::error::LampError;

/// Largest Gaussian sigma (pixels) a kernel is built for; the kernel side is
/// `2 ceil(4 sigma) + 1`.
pub const MAX_KERNEL_SIGMA: f64 = 64.0;

/// Perform 2D convolution of an image with a kernel
///
/// The image is zero-padded so the output keeps the input size, with the
/// kernel centred on each output pixel. Kernels in this crate are symmetric,
/// so correlation and convolution coincide and the kernel is applied without
/// flipping.
///
/// # Arguments
/// * `image` - Input image as a 2D array
/// * `kernel` - Convolution kernel with odd dimensions
///
/// # Returns
/// * Result of the convolution, same shape as `image`
pub fn convolve2d(image: &ArrayView2<f64>, kernel: &ArrayView2<f64>) -> Array2<f64> {
    let (img_rows, img_cols) = image.dim();
    let (ker_rows, ker_cols) = kernel.dim();
    let (pad_rows, pad_cols) = (ker_rows / 2, ker_cols / 2);

    let mut output = Array2::zeros((img_rows, img_cols));
    for ((i, j), out) in output.indexed_iter_mut() {
        let mut sum = 0.0;
        for ki in 0..ker_rows {
            let img_row = i as isize + ki as isize - pad_rows as isize;
            if img_row < 0 || img_row >= img_rows as isize {
                continue;
            }
            for kj in 0..ker_cols {
                let img_col = j as isize + kj as isize - pad_cols as isize;
                if img_col < 0 || img_col >= img_cols as isize {
                    continue;
                }
                sum += image[[img_row as usize, img_col as usize]] * kernel[[ki, kj]];
            }
        }
        *out = sum;
    }

    output
}

/// Fraction of a unit 1D Gaussian falling in `[a, b]`.
fn gaussian_interval(a: f64, b: f64, sigma: f64) -> f64 {
    0.5 * (erf(b / (SQRT_2 * sigma)) - erf(a / (SQRT_2 * sigma)))
}

/// Create a pixel-integrated Gaussian kernel.
///
/// Each weight is the exact integral of an isotropic Gaussian over its pixel,
/// built from the separable 1D erf integrals and normalised to unit sum. The
/// kernel half-width is `ceil(4 sigma)` pixels.
///
/// # Arguments
/// * `sigma` - Standard deviation in pixels, in `(0, MAX_KERNEL_SIGMA]`
///
/// # Returns
/// * Square kernel with odd side length
pub fn gaussian_kernel(sigma: f64) -> Result<Array2<f64>, LampError> {
    if !(sigma > 0.0 && sigma <= MAX_KERNEL_SIGMA) {
        return Err(LampError::config(format!(
            "Gaussian sigma must be in (0, {MAX_KERNEL_SIGMA}] pixels, got {sigma}"
        )));
    }

    let half = (4.0 * sigma).ceil() as usize;
    let size = 2 * half + 1;

    let weights: Vec<f64> = (0..size)
        .map(|k| {
            let offset = k as f64 - half as f64;
            gaussian_interval(offset - 0.5, offset + 0.5, sigma)
        })
        .collect();

    let mut kernel = Array2::from_shape_fn((size, size), |(i, j)| weights[i] * weights[j]);

    let sum = kernel.sum();
    if sum > 0.0 {
        kernel.mapv_inplace(|x| x / sum);
    }

    Ok(kernel)
}
