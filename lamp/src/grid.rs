//! Coordinate grids for evaluating and resampling light distributions.
//!
//! A grid of `width x height` pixels at `pixel_scale` arcsec/pixel is centred
//! on the patch origin: pixel `(row, col)` sits at
//!
//! ```text
//! x = (col - (width  - 1) / 2) * pixel_scale
//! y = (row - (height - 1) / 2) * pixel_scale
//! ```
//!
//! Coordinates are always computed from their integer indices rather than by
//! accumulating steps, so two grids built from identical parameters agree
//! bit-for-bit.

use crate::error::LampError;
use crate::image_size::ImageSize;

/// Arcsecond coordinate of the centre of pixel `(row, col)`.
pub fn pixel_center(size: ImageSize, pixel_scale: f64, row: usize, col: usize) -> (f64, f64) {
    let x = (col as f64 - (size.width as f64 - 1.0) / 2.0) * pixel_scale;
    let y = (row as f64 - (size.height as f64 - 1.0) / 2.0) * pixel_scale;
    (x, y)
}

/// Lazy, restartable, row-major sequence of pixel-centre coordinates.
///
/// Cloning the iterator (or calling [`GridCoords::restart`]) replays the same
/// sequence from the beginning.
#[derive(Debug, Clone)]
pub struct GridCoords {
    size: ImageSize,
    pixel_scale: f64,
    next: usize,
}

impl GridCoords {
    /// Rewind to the first coordinate.
    pub fn restart(&mut self) {
        self.next = 0;
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }
}

impl Iterator for GridCoords {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.size.width == 0 || self.next >= self.size.pixel_count() {
            return None;
        }
        let row = self.next / self.size.width;
        let col = self.next % self.size.width;
        self.next += 1;
        Some(pixel_center(self.size, self.pixel_scale, row, col))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.size.pixel_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridCoords {}

/// Produce the coordinate grid covering `size` pixels at `pixel_scale` spacing.
pub fn make_grid(size: ImageSize, pixel_scale: f64) -> GridCoords {
    GridCoords {
        size,
        pixel_scale,
        next: 0,
    }
}

/// Output grid geometry plus the supersampling used while rendering onto it.
///
/// Rendering happens on the supersampled grid, whose pixels are
/// `supersample_factor` times smaller along each axis than the output pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderGrid {
    size: ImageSize,
    pixel_scale: f64,
    supersample_factor: usize,
}

impl RenderGrid {
    /// Validate and build a render grid.
    ///
    /// # Errors
    /// `LampError::Configuration` for an empty shape, a non-positive or
    /// non-finite pixel scale, or a supersample factor of zero.
    pub fn new(
        size: ImageSize,
        pixel_scale: f64,
        supersample_factor: usize,
    ) -> Result<Self, LampError> {
        if size.is_empty() {
            return Err(LampError::config(format!(
                "render grid shape {size} has no pixels"
            )));
        }
        if !(pixel_scale > 0.0) || !pixel_scale.is_finite() {
            return Err(LampError::config(format!(
                "render grid pixel scale must be positive and finite, got {pixel_scale}"
            )));
        }
        if supersample_factor < 1 {
            return Err(LampError::config("supersample factor must be at least 1"));
        }

        Ok(Self {
            size,
            pixel_scale,
            supersample_factor,
        })
    }

    /// Output (image-plane) shape.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Output pixel scale in arcsec/pixel.
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    pub fn supersample_factor(&self) -> usize {
        self.supersample_factor
    }

    /// `(width * factor, height * factor)`
    pub fn supersampled_shape(&self) -> ImageSize {
        self.size.scaled(self.supersample_factor)
    }

    /// Pixel scale of the supersampled grid.
    pub fn supersampled_pixel_scale(&self) -> f64 {
        self.pixel_scale / self.supersample_factor as f64
    }

    /// Coordinates of every supersampled pixel centre, row-major.
    pub fn coordinates(&self) -> GridCoords {
        make_grid(self.supersampled_shape(), self.supersampled_pixel_scale())
    }
}
