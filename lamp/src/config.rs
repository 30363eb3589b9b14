//! JSON description of one complete render-and-inject run.
//!
//! ```json
//! {
//!   "size": {"width": 64, "height": 64},
//!   "pixel_scale": 0.05,
//!   "supersample": 2,
//!   "source": {
//!     "profile": {"kind": "sersic", "params": {"n": 1.0, "half_light_radius": 0.2}},
//!     "size": {"width": 64, "height": 64},
//!     "pixel_scale": 0.025
//!   },
//!   "lens": [{"kind": "sis", "params": {"theta_E": 0.8}}],
//!   "spectrum": [1.0, 0.8, 0.5],
//!   "sky": {"ra_deg": 56.9955, "dec_deg": -31.2074}
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use starfield::Equatorial;

use crate::error::LampError;
use crate::frame::Frame;
use crate::image_size::ImageSize;
use crate::inject::{FluxNormalization, SpectrumInjector};
use crate::lens::{LensComponentSpec, LensMapping};
use crate::source::{ProfileSpec, Shear, SourceModel};

fn default_supersample() -> usize {
    1
}

/// Injection position as written in config files, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyPosition {
    pub fn to_equatorial(self) -> Equatorial {
        Equatorial::from_degrees(self.ra_deg, self.dec_deg)
    }
}

/// Parametric source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub profile: ProfileSpec,
    pub size: ImageSize,
    pub pixel_scale: f64,
    /// Profile centre offset in arcsec
    #[serde(default)]
    pub shift: (f64, f64),
    #[serde(default)]
    pub shear: Shear,
    /// Gaussian smoothing in source pixels, 0 disables
    #[serde(default)]
    pub smoothing_sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Output (image-plane) grid
    pub size: ImageSize,
    pub pixel_scale: f64,
    #[serde(default = "default_supersample")]
    pub supersample: usize,
    pub source: SourceConfig,
    /// Lens components, empty for no lensing
    #[serde(default)]
    pub lens: Vec<LensComponentSpec>,
    /// One flux value per band
    pub spectrum: Vec<f64>,
    #[serde(default)]
    pub normalization: FluxNormalization,
    /// Injection position
    pub sky: SkyPosition,
}

impl InjectionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LampError> {
        serde_json::from_str(json)
            .map_err(|e| LampError::config(format!("invalid injection config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, LampError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LampError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, LampError> {
        serde_json::to_string_pretty(self).map_err(|e| LampError::config(e.to_string()))
    }

    /// Rasterise (and optionally smooth) the configured source.
    pub fn build_source(&self) -> Result<SourceModel, LampError> {
        let s = &self.source;
        SourceModel::from_profile(&s.profile, s.size, s.pixel_scale, s.shift, s.shear)?
            .smoothed(s.smoothing_sigma)
    }

    /// Frame on the configured grid with the configured source already set.
    pub fn build_frame(&self) -> Result<Frame, LampError> {
        let mut frame = Frame::new(self.size, self.pixel_scale, self.supersample)?;
        frame.set_source(self.build_source()?);
        Ok(frame)
    }

    pub fn build_lens(&self) -> Result<LensMapping, LampError> {
        LensMapping::from_specs(&self.lens)
    }

    pub fn injector(&self) -> SpectrumInjector {
        SpectrumInjector::with_normalization(self.normalization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameState;
    use crate::source::ProfileKind;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "size": {"width": 32, "height": 32},
        "pixel_scale": 0.05,
        "supersample": 2,
        "source": {
            "profile": {"kind": "exponential", "params": {"half_light_radius": 0.2, "flux": 3.0}},
            "size": {"width": 40, "height": 40},
            "pixel_scale": 0.03,
            "shear": {"g1": 0.1, "g2": 0.0},
            "smoothing_sigma": 0.5
        },
        "lens": [
            {"kind": "sis", "params": {"theta_E": 0.4}},
            {"kind": "shear", "params": {"gamma1": 0.02, "gamma2": -0.01}}
        ],
        "spectrum": [1.0, 0.5],
        "normalization": "total",
        "sky": {"ra_deg": 56.9955, "dec_deg": -31.2074}
    }"#;

    #[test]
    fn test_parse_and_build() {
        let config = InjectionConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.supersample, 2);
        assert_eq!(config.normalization, FluxNormalization::Total);
        assert_eq!(config.source.shift, (0.0, 0.0));
        let sky = config.sky.to_equatorial();
        assert!((sky.ra_degrees() - 56.9955).abs() < 1e-12);
        assert!((sky.dec_degrees() + 31.2074).abs() < 1e-12);

        let frame = config.build_frame().unwrap();
        assert_eq!(frame.state(), FrameState::SourceSet);
        let source = frame.source().unwrap();
        assert_eq!(source.kind(), ProfileKind::Exponential);
        assert_eq!(source.smoothing_sigma(), 0.5);

        let lens = config.build_lens().unwrap();
        assert_eq!(lens.components().len(), 2);
        assert_eq!(config.injector().normalization(), FluxNormalization::Total);
    }

    #[test]
    fn test_defaults() {
        let json = r#"{
            "size": {"width": 8, "height": 8},
            "pixel_scale": 0.1,
            "source": {
                "profile": {"kind": "sersic", "params": {"n": 2.0, "half_light_radius": 0.1}},
                "size": {"width": 8, "height": 8},
                "pixel_scale": 0.1
            },
            "spectrum": [1.0],
            "sky": {"ra_deg": 10.0, "dec_deg": 0.0}
        }"#;
        let config = InjectionConfig::from_json_str(json).unwrap();
        assert_eq!(config.supersample, 1);
        assert!(config.lens.is_empty());
        assert_eq!(config.normalization, FluxNormalization::Scale);
        assert!(config.build_lens().unwrap().is_identity());
    }

    #[test]
    fn test_malformed_is_configuration_error() {
        assert!(matches!(
            InjectionConfig::from_json_str("{\"size\": 3}"),
            Err(LampError::Configuration(_))
        ));

        let bad_lens = CONFIG.replace("\"theta_E\"", "\"einstein\"");
        let config = InjectionConfig::from_json_str(&bad_lens).unwrap();
        assert!(matches!(
            config.build_lens(),
            Err(LampError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = InjectionConfig::from_json_str(CONFIG).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = config.to_json_string().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = InjectionConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
