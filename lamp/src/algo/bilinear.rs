//! Bilinear interpolation on regular 2D pixel grids.
//!
//! The sampler treats array element `[row, col]` as a sample located at
//! `(x0 + col * spacing, y0 + row * spacing)`, i.e. the centre of a pixel of
//! side `spacing`. Between sample centres values are blended bilinearly.
//! [`BilinearInterpolator::interpolate`] rejects anything outside the hull of
//! sample centres; [`BilinearInterpolator::interpolate_or_zero`] holds the
//! edge value out to the pixel edges and is zero beyond them.

use ndarray::ArrayView2;
use thiserror::Error;

/// Fractional indices this close to an integer are snapped onto it, so that
/// coordinates regenerated from the same grid hit edge samples exactly.
const INDEX_SNAP: f64 = 1e-9;

/// Neighbouring sample indices along one axis and the weight of the upper one.
type AxisSplit = (usize, usize, f64);

/// Error types for bilinear interpolation operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    /// Coordinate is outside the valid interpolation domain
    #[error("{axis} coordinate {value} is outside valid range [{min}, {max}]")]
    OutOfBounds {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The data grid has no samples
    #[error("Cannot interpolate on an empty grid")]
    EmptyGrid,
    /// Sample spacing must be a positive finite number
    #[error("Grid spacing must be positive and finite, got {0}")]
    InvalidSpacing(f64),
}

/// Bilinear interpolator over a regularly spaced grid.
#[derive(Debug, Clone)]
pub struct BilinearInterpolator<'a> {
    /// 2D data array indexed as [y_index, x_index]
    data: ArrayView2<'a, f64>,
    /// Coordinate of sample [0, 0]
    x0: f64,
    y0: f64,
    /// Distance between neighbouring samples along either axis
    spacing: f64,
}

impl<'a> BilinearInterpolator<'a> {
    /// Create a new interpolator.
    ///
    /// # Arguments
    /// * `data` - Samples indexed as `[row, col]`
    /// * `origin` - `(x, y)` coordinate of sample `[0, 0]`
    /// * `spacing` - Distance between adjacent samples
    pub fn new(
        data: ArrayView2<'a, f64>,
        origin: (f64, f64),
        spacing: f64,
    ) -> Result<Self, InterpolationError> {
        if data.is_empty() {
            return Err(InterpolationError::EmptyGrid);
        }
        if !(spacing > 0.0) || !spacing.is_finite() {
            return Err(InterpolationError::InvalidSpacing(spacing));
        }

        Ok(Self {
            data,
            x0: origin.0,
            y0: origin.1,
            spacing,
        })
    }

    /// Interpolator whose samples sit on pixel centres of a patch centred on
    /// the coordinate origin, i.e. `x = (col - (width-1)/2) * spacing`.
    pub fn centered(data: ArrayView2<'a, f64>, spacing: f64) -> Result<Self, InterpolationError> {
        let (rows, cols) = data.dim();
        let origin = (
            -(cols as f64 - 1.0) / 2.0 * spacing,
            -(rows as f64 - 1.0) / 2.0 * spacing,
        );
        Self::new(data, origin, spacing)
    }

    /// Fractional sample index of a coordinate along one axis.
    fn fractional_index(&self, origin: f64, value: f64) -> f64 {
        let index = (value - origin) / self.spacing;
        let nearest = index.round();
        if (index - nearest).abs() < INDEX_SNAP {
            nearest
        } else {
            index
        }
    }

    /// Split a fractional index into (lower_index, upper_index, weight) where
    /// weight is the fraction of the way from lower to upper.
    fn split_index(index: f64, len: usize) -> Option<AxisSplit> {
        let last = (len - 1) as f64;
        if !(index >= 0.0 && index <= last) {
            return None;
        }

        let low = index.floor() as usize;
        if low == len - 1 {
            return Some((low, low, 0.0));
        }
        Some((low, low + 1, index - low as f64))
    }

    fn find_indices_and_weight(&self, origin: f64, len: usize, value: f64) -> Option<AxisSplit> {
        Self::split_index(self.fractional_index(origin, value), len)
    }

    /// Like [`Self::find_indices_and_weight`], but indices within half a
    /// sample of the outermost centres clamp onto them.
    fn find_indices_in_patch(&self, origin: f64, len: usize, value: f64) -> Option<AxisSplit> {
        let index = self.fractional_index(origin, value);
        let last = (len - 1) as f64;
        if !(index >= -0.5 && index <= last + 0.5) {
            return None;
        }
        Self::split_index(index.clamp(0.0, last), len)
    }

    fn axis_range(&self, origin: f64, len: usize) -> (f64, f64) {
        (origin, origin + (len - 1) as f64 * self.spacing)
    }

    fn blend(&self, x_split: AxisSplit, y_split: AxisSplit) -> f64 {
        let (x_low, x_high, x_weight) = x_split;
        let (y_low, y_high, y_weight) = y_split;
        let q11 = self.data[[y_low, x_low]];
        let q12 = self.data[[y_high, x_low]];
        let q21 = self.data[[y_low, x_high]];
        let q22 = self.data[[y_high, x_high]];

        q11 * (1.0 - x_weight) * (1.0 - y_weight)
            + q21 * x_weight * (1.0 - y_weight)
            + q12 * (1.0 - x_weight) * y_weight
            + q22 * x_weight * y_weight
    }

    /// Perform bilinear interpolation at the given coordinates.
    pub fn interpolate(&self, x: f64, y: f64) -> Result<f64, InterpolationError> {
        let (rows, cols) = self.data.dim();

        let x_split = self
            .find_indices_and_weight(self.x0, cols, x)
            .ok_or_else(|| {
                let (min, max) = self.axis_range(self.x0, cols);
                InterpolationError::OutOfBounds {
                    axis: "X",
                    value: x,
                    min,
                    max,
                }
            })?;

        let y_split = self
            .find_indices_and_weight(self.y0, rows, y)
            .ok_or_else(|| {
                let (min, max) = self.axis_range(self.y0, rows);
                InterpolationError::OutOfBounds {
                    axis: "Y",
                    value: y,
                    min,
                    max,
                }
            })?;

        Ok(self.blend(x_split, y_split))
    }

    /// Interpolate over the full pixel footprint of the grid.
    ///
    /// Between the outermost sample centres and the pixel edges half a sample
    /// further out, the coordinate clamps onto the edge samples. Beyond the
    /// edges, and for non-finite coordinates, the value is zero. Averaged over
    /// a regular sub-grid of each pixel this weights every sample equally, so
    /// the summed value is preserved.
    pub fn interpolate_or_zero(&self, x: f64, y: f64) -> f64 {
        let (rows, cols) = self.data.dim();
        match (
            self.find_indices_in_patch(self.x0, cols, x),
            self.find_indices_in_patch(self.y0, rows, y),
        ) {
            (Some(x_split), Some(y_split)) => self.blend(x_split, y_split),
            _ => 0.0,
        }
    }
}
