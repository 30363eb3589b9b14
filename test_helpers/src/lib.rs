//! Shared fixtures for lamp integration tests.
//!
//! Provides reproducible inputs (blank exposure stacks, north-up tangent-plane
//! WCSs, point-source and profile sources) and a workspace-level
//! `test_output/` directory for artifacts worth inspecting by eye, such as
//! PNG previews of lensed stamps.
//!
//! ```rust
//! use test_helpers::{blank_exposures, dc2_field, tan_wcs_centered};
//!
//! let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
//! let exposures = blank_exposures(3, 100);
//! assert_eq!(exposures.len(), 3);
//! ```

use lamp::{param_map, Equatorial, ImageSize, ProfileSpec, Shear, SourceModel, TanWcs};
use ndarray::Array2;
use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

pub const DC2_RA_DEG: f64 = 56.9955;
pub const DC2_DEC_DEG: f64 = -31.2074;

/// A field centre inside the DC2 simulated survey footprint.
pub fn dc2_field() -> Equatorial {
    Equatorial::from_degrees(DC2_RA_DEG, DC2_DEC_DEG)
}

#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find workspace root: {0}")]
    WorkspaceRootNotFound(String),
}

/// Walk up from the current directory to the Cargo workspace root.
pub fn find_workspace_root() -> Result<PathBuf, TestHelperError> {
    let mut dir = env::current_dir().map_err(|e| {
        TestHelperError::WorkspaceRootNotFound(format!("no current directory: {e}"))
    })?;

    loop {
        let manifest = dir.join("Cargo.toml");
        if manifest.exists() {
            let content = std::fs::read_to_string(&manifest).map_err(|e| {
                let message = format!("cannot read {}: {e}", manifest.display());
                TestHelperError::WorkspaceRootNotFound(message)
            })?;
            if content.contains("[workspace]") {
                return Ok(dir);
            }
        }
        if !dir.pop() {
            return Err(TestHelperError::WorkspaceRootNotFound(
                "no Cargo.toml with a [workspace] section above the current directory".to_string(),
            ));
        }
    }
}

static WORKSPACE_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_workspace_root().expect("Failed to find workspace root"));

/// `<workspace>/test_output`, created on first use.
pub fn get_output_dir() -> PathBuf {
    let dir = WORKSPACE_ROOT.join("test_output");
    std::fs::create_dir_all(&dir).expect("Failed to create test_output directory");
    dir
}

/// Path of an artifact inside the test output directory.
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// `bands` zero-valued square exposures of `side` pixels.
pub fn blank_exposures(bands: usize, side: usize) -> Vec<Array2<f64>> {
    vec![Array2::zeros((side, side)); bands]
}

/// North-up, East-left TAN WCS with `center` on the middle of a `side`-pixel square.
pub fn tan_wcs_centered(side: usize, center: Equatorial, pixel_scale: f64) -> TanWcs {
    TanWcs::centered(
        ImageSize::from_width_height(side, side),
        center,
        pixel_scale,
    )
    .expect("valid fixture WCS")
}

/// `side`-square image with `value` in pixel `(row, col)` and zero elsewhere.
pub fn point_source_image(side: usize, row: usize, col: usize, value: f64) -> Array2<f64> {
    let mut image = Array2::zeros((side, side));
    image[[row, col]] = value;
    image
}

/// Raw-image source holding a single unit pixel at `(4, 4)` of a 10x10 patch.
pub fn unit_point_source(pixel_scale: f64) -> SourceModel {
    SourceModel::from_image(point_source_image(10, 4, 4, 1.0), Some(pixel_scale), None)
        .expect("valid point source")
}

/// Centred, unsheared Sersic source of the given flux.
pub fn sersic_source(
    side: usize,
    pixel_scale: f64,
    n: f64,
    half_light_radius: f64,
    flux: f64,
) -> SourceModel {
    let spec = ProfileSpec::new(
        "sersic",
        param_map(&[
            ("n", n),
            ("half_light_radius", half_light_radius),
            ("flux", flux),
        ]),
    );
    SourceModel::from_profile(
        &spec,
        ImageSize::from_width_height(side, side),
        pixel_scale,
        (0.0, 0.0),
        Shear::default(),
    )
    .expect("valid Sersic source")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root() {
        let root = find_workspace_root().unwrap();
        assert!(root.join("lamp").exists());
        assert!(root.join("test_helpers").exists());
    }

    #[test]
    fn test_output_path() {
        let path = output_path("preview.png");
        assert_eq!(path, get_output_dir().join("preview.png"));
        assert!(get_output_dir().is_dir());
    }

    #[test]
    fn test_fixtures() {
        let image = point_source_image(10, 4, 4, 1.0);
        assert_eq!(image.sum(), 1.0);
        assert_eq!(unit_point_source(0.05).total_flux(), 1.0);

        let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
        assert_eq!(wcs.crpix(), (49.5, 49.5));
    }
}
