//! Compositing lensed stamps into exposures.
//!
//! Injection happens in two steps. [`resample_to_exposure`] maps every stamp
//! pixel onto the exposure pixel grid through the local linear approximation
//! of the exposure WCS at the injection point, splitting stamp pixels into
//! sub-pixels when the stamp is coarser than the exposure and depositing each
//! sub-pixel with cloud-in-cell weights. Because every deposit distributes its
//! flux with weights summing to one, the placed stamp carries exactly the flux
//! of the input up to rounding. [`composite`] then adds the placed stamp into
//! a copy of each band's exposure, clipping at the exposure edges.

use log::{debug, info};
use nalgebra::Vector2;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use starfield::Equatorial;

use crate::error::LampError;
use crate::source::ScaledImage;
use crate::wcs::{warn_if_anisotropic, WorldCoordinateSystem};

/// Extra exposure pixels around the transformed stamp footprint.
const FOOTPRINT_MARGIN: f64 = 2.0;

/// Meaning of the per-band spectrum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxNormalization {
    /// Spectrum values multiply the lensed image as rendered.
    #[default]
    Scale,
    /// The lensed image is first normalised to unit flux, so spectrum values
    /// are the absolute injected flux per band.
    Total,
}

/// Stamp resampled onto an exposure's pixel grid.
///
/// `data[[r, c]]` belongs to exposure pixel `(x0 + c, y0 + r)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedStamp {
    pub x0: i64,
    pub y0: i64,
    pub data: Array2<f64>,
}

impl PlacedStamp {
    pub fn total_flux(&self) -> f64 {
        self.data.sum()
    }

    /// Whether any pixel of the stamp lands on an exposure of `shape` (rows, cols).
    pub fn overlaps(&self, shape: (usize, usize)) -> bool {
        let (rows, cols) = self.data.dim();
        let (h, w) = (shape.0 as i64, shape.1 as i64);
        self.x0 < w && self.y0 < h && self.x0 + cols as i64 > 0 && self.y0 + rows as i64 > 0
    }
}

/// Most sub-pixels per stamp pixel axis when resampling, which caps the stamp
/// to exposure pixel-scale ratio at half this.
pub const MAX_SUBDIVISION: usize = 64;

/// Resample a stamp centred on `sky` onto the pixel grid of an exposure.
///
/// Stamp `+x` points West and `+y` North. Returns `Ok(None)` when `sky` cannot
/// be projected by `wcs`.
///
/// # Errors
/// `LampError::Configuration` if the WCS is singular at the injection point or
/// the stamp would need more than [`MAX_SUBDIVISION`] sub-pixels per axis.
pub fn resample_to_exposure(
    stamp: &ScaledImage,
    wcs: &dyn WorldCoordinateSystem,
    sky: &Equatorial,
) -> Result<Option<PlacedStamp>, LampError> {
    let Some((px, py)) = wcs.sky_to_pixel(sky) else {
        return Ok(None);
    };
    if !px.is_finite() || !py.is_finite() {
        return Ok(None);
    }

    let jacobian = wcs.local_jacobian(px, py);
    warn_if_anisotropic(&jacobian, "exposure WCS");
    let inverse = jacobian
        .try_inverse()
        .filter(|m| m.iter().all(|v| v.is_finite()))
        .ok_or_else(|| {
            LampError::config(format!(
                "exposure WCS is singular at pixel ({px:.2}, {py:.2})"
            ))
        })?;

    let exposure_scale = jacobian.determinant().abs().sqrt();
    let stamp_scale = stamp.pixel_scale();
    let subdivision = (2.0 * stamp_scale / exposure_scale).ceil();
    if !(subdivision <= MAX_SUBDIVISION as f64) {
        return Err(LampError::config(format!(
            "stamp pixels ({stamp_scale}\"/px) are too coarse for exposure pixels \
             ({exposure_scale:.4}\"/px)"
        )));
    }
    let sub = (subdivision as usize).max(1);

    let (rows, cols) = stamp.data().dim();
    let half_w = (cols as f64 - 1.0) / 2.0;
    let half_h = (rows as f64 - 1.0) / 2.0;

    // Stamp offset (arcsec, +x West) -> exposure pixel
    let to_pixel = |x: f64, y: f64| -> (f64, f64) {
        let p = inverse * Vector2::new(-x, y);
        (px + p.x, py + p.y)
    };

    let (x0, y0, width, height) = footprint(
        &to_pixel,
        cols as f64 / 2.0 * stamp_scale,
        rows as f64 / 2.0 * stamp_scale,
    );
    debug!(
        "Resampling {cols}x{rows} stamp at {stamp_scale:.4}\"/px onto exposure at \
         {exposure_scale:.4}\"/px ({sub}x{sub} sub-pixels), footprint {width}x{height} \
         at ({x0}, {y0})"
    );

    let mut data = Array2::zeros((height, width));
    let sub_weight = 1.0 / (sub * sub) as f64;
    for ((row, col), &value) in stamp.data().indexed_iter() {
        if value == 0.0 {
            continue;
        }
        let flux = value * sub_weight;
        for a in 0..sub {
            let y = (row as f64 - half_h + (a as f64 + 0.5) / sub as f64 - 0.5) * stamp_scale;
            for b in 0..sub {
                let x = (col as f64 - half_w + (b as f64 + 0.5) / sub as f64 - 0.5) * stamp_scale;
                let (ex, ey) = to_pixel(x, y);
                deposit(&mut data, ex - x0 as f64, ey - y0 as f64, flux);
            }
        }
    }

    Ok(Some(PlacedStamp { x0, y0, data }))
}

/// Integer bounding box `(x0, y0, width, height)` of the stamp footprint.
fn footprint<F>(to_pixel: &F, half_width: f64, half_height: f64) -> (i64, i64, usize, usize)
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let corners = [
        to_pixel(-half_width, -half_height),
        to_pixel(half_width, -half_height),
        to_pixel(-half_width, half_height),
        to_pixel(half_width, half_height),
    ];
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    let x0 = (min_x - FOOTPRINT_MARGIN).floor() as i64;
    let y0 = (min_y - FOOTPRINT_MARGIN).floor() as i64;
    let x1 = (max_x + FOOTPRINT_MARGIN).ceil() as i64;
    let y1 = (max_y + FOOTPRINT_MARGIN).ceil() as i64;
    (x0, y0, (x1 - x0 + 1) as usize, (y1 - y0 + 1) as usize)
}

/// Cloud-in-cell deposit of `flux` at fractional position `(x, y)` of `grid`.
fn deposit(grid: &mut Array2<f64>, x: f64, y: f64, flux: f64) {
    let (fx, fy) = (x.floor(), y.floor());
    let (tx, ty) = (x - fx, y - fy);
    let (ix, iy) = (fx as i64, fy as i64);

    let cells = [
        (ix, iy, (1.0 - tx) * (1.0 - ty)),
        (ix + 1, iy, tx * (1.0 - ty)),
        (ix, iy + 1, (1.0 - tx) * ty),
        (ix + 1, iy + 1, tx * ty),
    ];
    for (cx, cy, weight) in cells {
        if weight == 0.0 || cx < 0 || cy < 0 {
            continue;
        }
        if let Some(cell) = grid.get_mut((cy as usize, cx as usize)) {
            *cell += flux * weight;
        }
    }
}

/// Add `scale * placed` into `target`, dropping pixels outside its bounds.
pub fn composite(target: &mut Array2<f64>, placed: &PlacedStamp, scale: f64) {
    let (h, w) = target.dim();
    for ((r, c), &value) in placed.data.indexed_iter() {
        let ty = placed.y0 + r as i64;
        let tx = placed.x0 + c as i64;
        if ty < 0 || tx < 0 || ty >= h as i64 || tx >= w as i64 {
            continue;
        }
        target[[ty as usize, tx as usize]] += scale * value;
    }
}

/// Multi-band injection of a lensed stamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectrumInjector {
    normalization: FluxNormalization,
}

impl SpectrumInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalization(normalization: FluxNormalization) -> Self {
        Self { normalization }
    }

    pub fn normalization(&self) -> FluxNormalization {
        self.normalization
    }

    /// Inject `lensed` at `sky` into copies of `exposures`, scaling band `i`
    /// by `spectrum[i]`. All bands share `wcs`.
    ///
    /// The input exposures are never modified.
    ///
    /// # Errors
    /// - `LampError::Configuration` if `spectrum.len() != exposures.len()`, a
    ///   spectrum value is non-finite, or the WCS is singular at `sky`
    /// - `LampError::Numerical` if the lensed image holds non-finite values
    pub fn inject(
        &self,
        lensed: &ScaledImage,
        spectrum: &[f64],
        wcs: &dyn WorldCoordinateSystem,
        sky: &Equatorial,
        exposures: &[Array2<f64>],
    ) -> Result<Vec<Array2<f64>>, LampError> {
        let scales = self.band_scales(lensed, spectrum, exposures.len())?;
        let placed = match &scales {
            Some(_) => resample_to_exposure(lensed, wcs, sky)?,
            None => None,
        };

        let injected: Vec<Array2<f64>> = exposures
            .par_iter()
            .enumerate()
            .map(|(band, exposure)| {
                let mut copy = exposure.clone();
                if let (Some(placed), Some(scales)) = (&placed, &scales) {
                    composite(&mut copy, placed, scales[band]);
                }
                copy
            })
            .collect();

        log_summary(&injected, exposures.iter());
        Ok(injected)
    }

    /// Like [`SpectrumInjector::inject`], with an individual WCS per band.
    pub fn inject_bands(
        &self,
        lensed: &ScaledImage,
        spectrum: &[f64],
        sky: &Equatorial,
        bands: &[(&dyn WorldCoordinateSystem, &Array2<f64>)],
    ) -> Result<Vec<Array2<f64>>, LampError> {
        let scales = self.band_scales(lensed, spectrum, bands.len())?;

        let injected = bands
            .par_iter()
            .enumerate()
            .map(|(band, (wcs, exposure))| {
                let mut copy = (*exposure).clone();
                if let Some(scales) = &scales {
                    if let Some(placed) = resample_to_exposure(lensed, *wcs, sky)? {
                        composite(&mut copy, &placed, scales[band]);
                    }
                }
                Ok(copy)
            })
            .collect::<Result<Vec<_>, LampError>>()?;

        log_summary(&injected, bands.iter().map(|(_, e)| *e));
        Ok(injected)
    }

    /// Validate inputs and resolve the multiplicative factor for each band.
    ///
    /// `None` means nothing is injected (a zero-flux image under `Total`).
    fn band_scales(
        &self,
        lensed: &ScaledImage,
        spectrum: &[f64],
        bands: usize,
    ) -> Result<Option<Vec<f64>>, LampError> {
        check_spectrum(spectrum, bands)?;
        if !lensed.is_finite() {
            return Err(LampError::numerical(
                "lensed image contains non-finite values",
            ));
        }

        match self.normalization {
            FluxNormalization::Scale => Ok(Some(spectrum.to_vec())),
            FluxNormalization::Total => {
                let total = lensed.total_flux();
                if total == 0.0 {
                    debug!("Lensed image carries no flux, nothing to inject");
                    return Ok(None);
                }
                Ok(Some(spectrum.iter().map(|s| s / total).collect()))
            }
        }
    }
}

/// One finite spectrum value per band.
pub(crate) fn check_spectrum(spectrum: &[f64], bands: usize) -> Result<(), LampError> {
    if spectrum.len() != bands {
        return Err(LampError::config(format!(
            "spectrum has {} value(s) but there are {} exposure(s)",
            spectrum.len(),
            bands
        )));
    }
    if let Some(bad) = spectrum.iter().find(|v| !v.is_finite()) {
        return Err(LampError::config(format!(
            "spectrum values must be finite, got {bad}"
        )));
    }
    Ok(())
}

fn log_summary<'a>(injected: &[Array2<f64>], originals: impl Iterator<Item = &'a Array2<f64>>) {
    for (band, (after, before)) in injected.iter().zip(originals).enumerate() {
        info!(
            "Band {band}: injected flux {:.6}",
            after.sum() - before.sum()
        );
    }
}
