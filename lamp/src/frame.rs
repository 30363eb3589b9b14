//! End-to-end orchestration: one source, one render grid, cached lensing.
//!
//! A [`Frame`] moves through three states:
//!
//! ```text
//! Empty --set_source--> SourceSet --lens_source--> Rendered
//!                          ^                          |
//!                          +---- set_source / reconfigure
//! ```
//!
//! Mutation never renders. `lens_source` renders on demand and memoises the
//! result against the source generation and the lens mapping it was made
//! with; a repeated call with the same lens returns the cached image.

use std::collections::BTreeMap;

use log::debug;
use ndarray::Array2;
use starfield::Equatorial;

use crate::error::LampError;
use crate::grid::RenderGrid;
use crate::image_size::ImageSize;
use crate::inject::{check_spectrum, SpectrumInjector};
use crate::lens::LensMapping;
use crate::source::{ScaledImage, SourceModel};
use crate::wcs::WorldCoordinateSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Empty,
    SourceSet,
    Rendered,
}

#[derive(Debug, Clone)]
struct RenderCache {
    generation: u64,
    lens: LensMapping,
    image: ScaledImage,
}

#[derive(Debug, Clone)]
pub struct Frame {
    grid: RenderGrid,
    source: Option<SourceModel>,
    generation: u64,
    cache: Option<RenderCache>,
}

impl Frame {
    pub fn new(
        size: ImageSize,
        pixel_scale: f64,
        supersample_factor: usize,
    ) -> Result<Self, LampError> {
        Ok(Self::from_grid(RenderGrid::new(
            size,
            pixel_scale,
            supersample_factor,
        )?))
    }

    pub fn from_grid(grid: RenderGrid) -> Self {
        Self {
            grid,
            source: None,
            generation: 0,
            cache: None,
        }
    }

    pub fn grid(&self) -> &RenderGrid {
        &self.grid
    }

    pub fn state(&self) -> FrameState {
        match (&self.source, &self.cache) {
            (None, _) => FrameState::Empty,
            (Some(_), None) => FrameState::SourceSet,
            (Some(_), Some(_)) => FrameState::Rendered,
        }
    }

    /// Assign a new source, discarding any cached rendering.
    pub fn set_source(&mut self, source: SourceModel) {
        self.source = Some(source);
        self.generation += 1;
        self.cache = None;
    }

    pub fn source(&self) -> Option<&SourceModel> {
        self.source.as_ref()
    }

    /// Replace the render grid, discarding any cached rendering.
    pub fn reconfigure(
        &mut self,
        size: ImageSize,
        pixel_scale: f64,
        supersample_factor: usize,
    ) -> Result<(), LampError> {
        self.grid = RenderGrid::new(size, pixel_scale, supersample_factor)?;
        self.cache = None;
        Ok(())
    }

    /// Most recent rendering, if still valid.
    pub fn cached(&self) -> Option<&ScaledImage> {
        self.cache.as_ref().map(|c| &c.image)
    }

    /// Lensed image of the current source through `lens`.
    ///
    /// # Errors
    /// `LampError::Precondition` if no source has been set; otherwise any
    /// error from [`LensMapping::render`].
    pub fn lens_source(&mut self, lens: &LensMapping) -> Result<&ScaledImage, LampError> {
        let source = self.source.as_ref().ok_or_else(|| {
            LampError::Precondition("lens_source called before a source was set".into())
        })?;

        let hit = matches!(
            &self.cache,
            Some(c) if c.generation == self.generation && c.lens == *lens
        );
        if hit {
            debug!(
                "Reusing cached lensed image (generation {})",
                self.generation
            );
        } else {
            let image = lens.render(source, &self.grid)?;
            self.cache = Some(RenderCache {
                generation: self.generation,
                lens: lens.clone(),
                image,
            });
        }

        self.cache
            .as_ref()
            .map(|c| &c.image)
            .ok_or_else(|| LampError::Precondition("no lensed image available".into()))
    }

    /// Build a [`LensMapping`] from kind names and parameter maps, then lens.
    pub fn lens_source_with<S: AsRef<str>>(
        &mut self,
        kinds: &[S],
        params: &[BTreeMap<String, f64>],
    ) -> Result<&ScaledImage, LampError> {
        let lens = LensMapping::new(kinds, params)?;
        self.lens_source(&lens)
    }

    /// Lens the current source and inject it into copies of `exposures`.
    ///
    /// The spectrum is checked against the exposures before anything is
    /// rendered, so a mismatch leaves the cache untouched.
    pub fn inject(
        &mut self,
        lens: &LensMapping,
        spectrum: &[f64],
        wcs: &dyn WorldCoordinateSystem,
        sky: &Equatorial,
        exposures: &[Array2<f64>],
        injector: &SpectrumInjector,
    ) -> Result<Vec<Array2<f64>>, LampError> {
        check_spectrum(spectrum, exposures.len())?;
        let lensed = self.lens_source(lens)?;
        injector.inject(lensed, spectrum, wcs, sky, exposures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::param_map;
    use crate::wcs::TanWcs;

    fn point_source(value: f64) -> SourceModel {
        let mut image = Array2::zeros((10, 10));
        image[[4, 4]] = value;
        SourceModel::from_image(image, Some(0.05), None).unwrap()
    }

    fn frame() -> Frame {
        Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap()
    }

    #[test]
    fn test_empty_frame_precondition() {
        let mut frame = frame();
        assert_eq!(frame.state(), FrameState::Empty);
        let err = frame.lens_source(&LensMapping::identity()).unwrap_err();
        assert!(matches!(err, LampError::Precondition(_)));
    }

    #[test]
    fn test_state_transitions() {
        let mut frame = frame();
        frame.set_source(point_source(1.0));
        assert_eq!(frame.state(), FrameState::SourceSet);
        assert!(frame.cached().is_none());

        frame.lens_source(&LensMapping::identity()).unwrap();
        assert_eq!(frame.state(), FrameState::Rendered);

        frame.set_source(point_source(2.0));
        assert_eq!(frame.state(), FrameState::SourceSet);
        assert_eq!(
            frame
                .lens_source(&LensMapping::identity())
                .unwrap()
                .total_flux(),
            2.0
        );

        frame
            .reconfigure(ImageSize::from_width_height(20, 20), 0.05, 2)
            .unwrap();
        assert_eq!(frame.state(), FrameState::SourceSet);
        assert_eq!(
            frame.lens_source(&LensMapping::identity()).unwrap().size(),
            ImageSize::from_width_height(20, 20)
        );
    }

    #[test]
    fn test_repeat_render_is_identical() {
        let mut frame = frame();
        frame.set_source(point_source(1.0));
        let kinds = ["sis"];
        let params = [param_map(&[("theta_E", 0.1), ("center_x", 0.013)])];

        let first = frame.lens_source_with(&kinds, &params).unwrap().clone();
        let second = frame.lens_source_with(&kinds, &params).unwrap().clone();
        assert_eq!(first, second);

        let other = frame
            .lens_source_with(
                &kinds,
                &[param_map(&[("theta_E", 0.2), ("center_x", 0.013)])],
            )
            .unwrap()
            .clone();
        assert_ne!(first, other);
    }

    #[test]
    fn test_bad_lens_keeps_previous_cache() {
        let mut frame = frame();
        frame.set_source(point_source(1.0));
        frame.lens_source(&LensMapping::identity()).unwrap();

        let err = frame
            .lens_source_with(&["sis"], &[param_map(&[("theta", 1.0)])])
            .unwrap_err();
        assert!(matches!(err, LampError::Configuration(_)));
        assert_eq!(frame.state(), FrameState::Rendered);
    }

    #[test]
    fn test_spectrum_checked_before_rendering() {
        let mut frame = frame();
        frame.set_source(point_source(1.0));
        let size = ImageSize::from_width_height(30, 30);
        let sky = Equatorial::from_degrees(30.0, -20.0);
        let wcs = TanWcs::centered(size, sky, 0.2).unwrap();
        let exposures = vec![size.zeros(); 3];
        let injector = SpectrumInjector::new();

        let lens = LensMapping::identity();

        let err = frame
            .inject(&lens, &[1.0, 1.0], &wcs, &sky, &exposures, &injector)
            .unwrap_err();
        assert!(matches!(err, LampError::Configuration(_)));
        assert_eq!(frame.state(), FrameState::SourceSet);

        let err = frame
            .inject(
                &lens,
                &[1.0, f64::NAN, 1.0],
                &wcs,
                &sky,
                &exposures,
                &injector,
            )
            .unwrap_err();
        assert!(matches!(err, LampError::Configuration(_)));
        assert!(frame.cached().is_none());

        frame
            .inject(&lens, &[1.0, 2.0, 3.0], &wcs, &sky, &exposures, &injector)
            .unwrap();
        assert_eq!(frame.state(), FrameState::Rendered);
    }
}
