//! Image processing module for source rendering
//!
//! This module provides the convolution used to smooth rasterised sources and
//! the display stretch used for quick-look previews.

pub mod convolve2d;
pub mod image;

pub use convolve2d::{convolve2d, gaussian_kernel, MAX_KERNEL_SIGMA};
pub use image::asinh_gray_image;
