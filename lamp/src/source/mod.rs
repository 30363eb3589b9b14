//! Background source models.
//!
//! A [`SourceModel`] always carries a discretised flux image at a known pixel
//! scale. Parametric sources additionally remember the profile, shear and shift
//! they were rasterised from; raw-image sources are authoritative as pixels.

pub mod profile;

use log::debug;
use ndarray::Array2;

use crate::error::LampError;
use crate::image_proc::{convolve2d, gaussian_kernel};
use crate::image_size::ImageSize;
use crate::wcs::{warn_if_anisotropic, WorldCoordinateSystem};

pub use profile::{Profile, ProfileKind, ProfileSpec, RadialShape, Shear};

/// Flux-per-pixel image with its pixel scale in arcsec/pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledImage {
    data: Array2<f64>,
    pixel_scale: f64,
}

impl ScaledImage {
    pub fn new(data: Array2<f64>, pixel_scale: f64) -> Result<Self, LampError> {
        check_pixel_scale(pixel_scale)?;
        Ok(Self { data, pixel_scale })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::of_array(&self.data)
    }

    pub fn total_flux(&self) -> f64 {
        self.data.sum()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

pub(crate) fn check_pixel_scale(pixel_scale: f64) -> Result<(), LampError> {
    if pixel_scale > 0.0 && pixel_scale.is_finite() {
        Ok(())
    } else {
        Err(LampError::config(format!(
            "pixel scale must be positive and finite, got {pixel_scale}"
        )))
    }
}

/// How the current image of a [`SourceModel`] was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDefinition {
    /// Pixels supplied directly by the caller.
    RawImage,
    /// Rasterised from a parametric profile.
    Parametric {
        profile: Profile,
        shear: Shear,
        /// Profile centre in arcsec relative to the patch centre
        shift: (f64, f64),
    },
}

/// A background galaxy on its own pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceModel {
    image: ScaledImage,
    definition: SourceDefinition,
    smoothing_sigma: f64,
}

impl SourceModel {
    /// Build a source from a discretised flux image.
    ///
    /// The pixel scale is taken from `pixel_scale` when given, otherwise from
    /// the geometric-mean scale of `wcs` at the image centre.
    ///
    /// # Errors
    /// `LampError::Configuration` when neither a scale nor a WCS is supplied,
    /// or the image is empty or holds negative or non-finite values.
    pub fn from_image(
        image: Array2<f64>,
        pixel_scale: Option<f64>,
        wcs: Option<&dyn WorldCoordinateSystem>,
    ) -> Result<Self, LampError> {
        let size = ImageSize::of_array(&image);
        if size.is_empty() {
            return Err(LampError::config("source image is empty"));
        }
        if image.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(LampError::config(
                "source image must hold finite, non-negative surface brightness",
            ));
        }

        let pixel_scale = match (pixel_scale, wcs) {
            (Some(scale), _) => scale,
            (None, Some(wcs)) => {
                let (cx, cy) = ((size.width as f64 - 1.0) / 2.0, (size.height as f64 - 1.0) / 2.0);
                let jacobian = wcs.local_jacobian(cx, cy);
                warn_if_anisotropic(&jacobian, "source image");
                jacobian.determinant().abs().sqrt()
            }
            (None, None) => {
                return Err(LampError::config(
                    "source image needs an explicit pixel scale or a world-coordinate system",
                ))
            }
        };

        debug!("Raw source image {size} at {pixel_scale:.4}\"/px");
        Ok(Self {
            image: ScaledImage::new(image, pixel_scale)?,
            definition: SourceDefinition::RawImage,
            smoothing_sigma: 0.0,
        })
    }

    /// Build a source by rasterising a parametric profile.
    ///
    /// `shift` is the profile centre in arcsec relative to the patch centre.
    pub fn from_profile(
        spec: &ProfileSpec,
        size: ImageSize,
        pixel_scale: f64,
        shift: (f64, f64),
        shear: Shear,
    ) -> Result<Self, LampError> {
        let profile = Profile::from_spec(spec)?;
        if size.is_empty() {
            return Err(LampError::config(
                "source patch must have at least one pixel",
            ));
        }
        if !shift.0.is_finite() || !shift.1.is_finite() {
            return Err(LampError::config("source shift must be finite"));
        }
        check_pixel_scale(pixel_scale)?;

        let data = profile.rasterize(size, pixel_scale, &shear, shift)?;
        debug!(
            "Rasterised {} source on {size} at {pixel_scale:.4}\"/px, flux {:.4}",
            profile.kind(),
            profile.flux()
        );

        Ok(Self {
            image: ScaledImage::new(data, pixel_scale)?,
            definition: SourceDefinition::Parametric {
                profile,
                shear,
                shift,
            },
            smoothing_sigma: 0.0,
        })
    }

    /// Convolve the image with an isotropic Gaussian of `sigma` pixels.
    ///
    /// `sigma == 0` returns the source unchanged. Convolution is zero-padded,
    /// so flux within `4 sigma` of the edge partially leaves the patch. Sigmas
    /// above [`crate::image_proc::MAX_KERNEL_SIGMA`] are rejected.
    pub fn smoothed(mut self, sigma: f64) -> Result<Self, LampError> {
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(LampError::config(format!(
                "smoothing sigma must be finite and non-negative, got {sigma}"
            )));
        }
        if sigma == 0.0 {
            return Ok(self);
        }

        let kernel = gaussian_kernel(sigma)?;
        let smoothed = convolve2d(&self.image.data.view(), &kernel.view());
        self.image = ScaledImage::new(smoothed, self.image.pixel_scale)?;
        self.smoothing_sigma += sigma;
        Ok(self)
    }

    pub fn kind(&self) -> ProfileKind {
        match &self.definition {
            SourceDefinition::RawImage => ProfileKind::RawImage,
            SourceDefinition::Parametric { profile, .. } => profile.kind(),
        }
    }

    pub fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    pub fn image(&self) -> &ScaledImage {
        &self.image
    }

    pub fn pixel_scale(&self) -> f64 {
        self.image.pixel_scale
    }

    pub fn size(&self) -> ImageSize {
        self.image.size()
    }

    pub fn total_flux(&self) -> f64 {
        self.image.total_flux()
    }

    /// Total Gaussian smoothing applied so far, in pixels (summed linearly).
    pub fn smoothing_sigma(&self) -> f64 {
        self.smoothing_sigma
    }
}
