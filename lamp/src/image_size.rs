//! Image dimensions and size utilities

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of a stamp, render grid or exposure.
///
/// Arrays built from an `ImageSize` are row-major with shape `(height, width)`:
/// rows run along y and columns along x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
}

impl ImageSize {
    /// Create a new ImageSize
    pub fn from_width_height(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Size of an existing array, read from its `(rows, cols)` shape.
    pub fn of_array<T>(arr: &Array2<T>) -> Self {
        let (height, width) = arr.dim();
        Self { width, height }
    }

    /// Create a zero-filled f64 array with shape (height, width).
    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros((self.height, self.width))
    }

    /// Scale both axes by an integer factor.
    pub fn scaled(&self, factor: usize) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Get total number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// True when either axis has zero length.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Array shape tuple `(rows, cols)` for ndarray constructors.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

impl From<(usize, usize)> for ImageSize {
    /// Interprets the tuple as `(width, height)`.
    fn from(dimensions: (usize, usize)) -> Self {
        Self::from_width_height(dimensions.0, dimensions.1)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
