//! Sky coordinates and world-coordinate systems.
//!
//! Exposures arrive from the archive with a world-coordinate system (WCS) that
//! maps between pixel positions and celestial coordinates. The injection stage
//! only needs three things from it: the pixel position of a sky coordinate, and
//! the local linear transform between pixel offsets and tangent-plane arcseconds
//! at that position. [`WorldCoordinateSystem`] captures exactly that, and
//! [`TanWcs`] implements it for the gnomonic (`TAN`) projection used by coadds.
//!
//! # Conventions
//! - Pixel coordinates are zero-based with integer values at pixel centres;
//!   `x` runs along array columns and `y` along array rows.
//! - Tangent-plane offsets are `(xi, eta)` with `xi` towards East (increasing
//!   right ascension) and `eta` towards North.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use log::warn;
use starfield::framelib::inertial::InertialFrame;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use starfield::Equatorial;

use crate::error::LampError;
use crate::image_size::ImageSize;

const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// Principal pixel scales differing by more than this fraction trigger a warning.
const ANISOTROPY_WARN: f64 = 0.01;

pub(crate) fn is_finite_sky(sky: &Equatorial) -> bool {
    sky.ra.is_finite() && sky.dec.is_finite()
}

/// Gnomonic projection onto the plane tangent to the sphere at `center`.
///
/// Offsets are `(xi, eta)` in radians with `xi` towards East and `eta`
/// towards North; `center` sits on the local `z` axis.
#[derive(Clone, Copy)]
pub struct TangentPlane {
    center: Equatorial,
    rotation: Matrix3<f64>,
}

impl TangentPlane {
    pub fn new(center: &Equatorial) -> Self {
        let (sin_ra, cos_ra) = center.ra.sin_cos();
        let (sin_dec, cos_dec) = center.dec.sin_cos();

        let z = Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec);
        let north = Vector3::new(0.0, 0.0, 1.0);
        // At the poles any east direction will do
        let east = north
            .cross(&z)
            .try_normalize(1e-15)
            .unwrap_or_else(|| Vector3::new(-sin_ra, cos_ra, 0.0));
        let y = z.cross(&east).normalize();
        let x = y.cross(&z).normalize();

        Self {
            center: *center,
            rotation: Matrix3::from_columns(&[x, y, z]),
        }
    }

    pub fn center(&self) -> Equatorial {
        self.center
    }

    /// Tangent-plane offset of `sky`, or `None` when it lies on the far
    /// hemisphere where the projection is undefined.
    pub fn project(&self, sky: &Equatorial) -> Option<(f64, f64)> {
        let cartesian = sky.to_cartesian().to_vector3();
        let local = self.rotation.transpose() * cartesian;
        if local.z <= 0.0 {
            return None;
        }
        Some((local.x / local.z, local.y / local.z))
    }

    /// Sky position of a tangent-plane offset (radians).
    pub fn deproject(&self, xi: f64, eta: f64) -> Equatorial {
        if xi == 0.0 && eta == 0.0 {
            return self.center;
        }
        let v = (self.rotation * Vector3::new(xi, eta, 1.0)).normalize();
        let ra = v.y.atan2(v.x).rem_euclid(TAU);
        let dec = v.z.clamp(-1.0, 1.0).asin();
        Equatorial::from_degrees(ra.to_degrees(), dec.to_degrees())
    }
}

/// Pixel <-> sky mapping of an exposure.
///
/// Implementors only need the two conversions; the local linear transform and
/// the isotropic pixel scale derive from them.
pub trait WorldCoordinateSystem: Send + Sync {
    /// Zero-based pixel position of a sky coordinate, `None` when it cannot be
    /// projected.
    fn sky_to_pixel(&self, sky: &Equatorial) -> Option<(f64, f64)>;

    /// Sky coordinate of a zero-based pixel position.
    fn pixel_to_sky(&self, x: f64, y: f64) -> Equatorial;

    /// Jacobian from pixel offsets `(dx, dy)` to tangent-plane arcseconds
    /// `(xi, eta)` around pixel `(x, y)`.
    fn local_jacobian(&self, x: f64, y: f64) -> Matrix2<f64> {
        const H: f64 = 0.5;
        let plane = TangentPlane::new(&self.pixel_to_sky(x, y));
        let offset = |px: f64, py: f64| {
            let (xi, eta) = plane
                .project(&self.pixel_to_sky(px, py))
                .unwrap_or((0.0, 0.0));
            Vector2::new(xi, eta) * (180.0 / std::f64::consts::PI) * ARCSEC_PER_DEGREE
        };

        let d_dx = (offset(x + H, y) - offset(x - H, y)) / (2.0 * H);
        let d_dy = (offset(x, y + H) - offset(x, y - H)) / (2.0 * H);
        Matrix2::from_columns(&[d_dx, d_dy])
    }

    /// Isotropic pixel scale (arcsec/pixel) at a pixel position: the geometric
    /// mean of the two principal axis scales of the local Jacobian.
    fn pixel_scale_at(&self, x: f64, y: f64) -> f64 {
        self.local_jacobian(x, y).determinant().abs().sqrt()
    }
}

/// Fractional difference between the two principal scales of a Jacobian.
pub fn anisotropy(jacobian: &Matrix2<f64>) -> f64 {
    let sv = jacobian.singular_values();
    let (hi, lo) = (sv[0].max(sv[1]), sv[0].min(sv[1]));
    if lo > 0.0 {
        hi / lo - 1.0
    } else {
        f64::INFINITY
    }
}

/// Emit a warning for pixel grids whose axes differ noticeably in scale.
pub(crate) fn warn_if_anisotropic(jacobian: &Matrix2<f64>, context: &str) {
    let a = anisotropy(jacobian);
    if a > ANISOTROPY_WARN {
        warn!(
            "{context}: pixel grid is anisotropic ({:.1}% scale difference), \
             using geometric-mean scale",
            a * 100.0
        );
    }
}

/// Gnomonic (`TAN`) world-coordinate system with a linear CD matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TanWcs {
    /// Zero-based reference pixel `(x, y)`
    crpix: [f64; 2],
    /// Sky position of the reference pixel, `(ra, dec)` in degrees
    crval: [f64; 2],
    /// Degrees of `(xi, eta)` per pixel offset, row-major `[[cd1_1, cd1_2], [cd2_1, cd2_2]]`
    cd: [[f64; 2]; 2],
}

impl TanWcs {
    /// Build a TAN WCS from a reference pixel, its sky position and a CD matrix
    /// in degrees per pixel.
    ///
    /// # Errors
    /// `LampError::Configuration` when any element is non-finite or the CD
    /// matrix is singular.
    pub fn new(crpix: (f64, f64), crval: Equatorial, cd: Matrix2<f64>) -> Result<Self, LampError> {
        if !crpix.0.is_finite() || !crpix.1.is_finite() || !is_finite_sky(&crval) {
            return Err(LampError::config(
                "WCS reference pixel and value must be finite",
            ));
        }
        if cd.iter().any(|v| !v.is_finite()) || cd.determinant() == 0.0 {
            return Err(LampError::config(
                "WCS CD matrix must be finite and invertible",
            ));
        }

        Ok(Self {
            crpix: [crpix.0, crpix.1],
            crval: [crval.ra_degrees(), crval.dec_degrees()],
            cd: [[cd[(0, 0)], cd[(0, 1)]], [cd[(1, 0)], cd[(1, 1)]]],
        })
    }

    /// North-up, East-left WCS centred on an image of the given size.
    pub fn centered(
        size: ImageSize,
        center: Equatorial,
        pixel_scale_arcsec: f64,
    ) -> Result<Self, LampError> {
        let s = pixel_scale_arcsec / ARCSEC_PER_DEGREE;
        Self::new(
            ((size.width as f64 - 1.0) / 2.0, (size.height as f64 - 1.0) / 2.0),
            center,
            Matrix2::new(-s, 0.0, 0.0, s),
        )
    }

    /// Parse the linear TAN keywords of a FITS-style header.
    ///
    /// Reads `CRPIX1/2` (one-based, converted to zero-based), `CRVAL1/2` and
    /// either the `CD1_1..CD2_2` matrix or `CDELT1/2` with an optional `PC`
    /// matrix. `CTYPE` values are not checked; only numeric cards are consumed.
    pub fn from_header(header: &BTreeMap<String, f64>) -> Result<Self, LampError> {
        let card = |key: &str| {
            header
                .get(key)
                .copied()
                .ok_or_else(|| LampError::config(format!("WCS header is missing {key}")))
        };
        let optional = |key: &str, default: f64| header.get(key).copied().unwrap_or(default);

        let crpix = (card("CRPIX1")? - 1.0, card("CRPIX2")? - 1.0);
        let crval = Equatorial::from_degrees(card("CRVAL1")?, card("CRVAL2")?);

        let cd = if header.contains_key("CD1_1") {
            Matrix2::new(
                card("CD1_1")?,
                optional("CD1_2", 0.0),
                optional("CD2_1", 0.0),
                card("CD2_2")?,
            )
        } else {
            let pc = Matrix2::new(
                optional("PC1_1", 1.0),
                optional("PC1_2", 0.0),
                optional("PC2_1", 0.0),
                optional("PC2_2", 1.0),
            );
            Matrix2::from_diagonal(&Vector2::new(card("CDELT1")?, card("CDELT2")?)) * pc
        };

        Self::new(crpix, crval, cd)
    }

    pub fn crpix(&self) -> (f64, f64) {
        (self.crpix[0], self.crpix[1])
    }

    pub fn crval(&self) -> Equatorial {
        Equatorial::from_degrees(self.crval[0], self.crval[1])
    }

    /// CD matrix in degrees per pixel.
    pub fn cd(&self) -> Matrix2<f64> {
        Matrix2::new(self.cd[0][0], self.cd[0][1], self.cd[1][0], self.cd[1][1])
    }

    /// WCS of a sub-image whose pixel `(0, 0)` is pixel `(x0, y0)` of this one.
    pub fn cropped(&self, x0: i64, y0: i64) -> TanWcs {
        TanWcs {
            crpix: [self.crpix[0] - x0 as f64, self.crpix[1] - y0 as f64],
            ..*self
        }
    }
}

impl WorldCoordinateSystem for TanWcs {
    fn sky_to_pixel(&self, sky: &Equatorial) -> Option<(f64, f64)> {
        let (xi, eta) = TangentPlane::new(&self.crval()).project(sky)?;
        let inv = self.cd().try_inverse()?;
        let offset = inv * Vector2::new(xi.to_degrees(), eta.to_degrees());
        Some((offset.x + self.crpix[0], offset.y + self.crpix[1]))
    }

    fn pixel_to_sky(&self, x: f64, y: f64) -> Equatorial {
        let world = self.cd() * Vector2::new(x - self.crpix[0], y - self.crpix[1]);
        TangentPlane::new(&self.crval()).deproject(world.x.to_radians(), world.y.to_radians())
    }
}
