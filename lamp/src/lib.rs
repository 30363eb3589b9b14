//! Lensed-source rendering and injection.
//!
//! The pipeline runs in four stages:
//!
//! 1. [`source::SourceModel`] holds a background galaxy as a flux image, either
//!    supplied directly or rasterised from a parametric profile.
//! 2. [`grid::RenderGrid`] fixes the image-plane grid and its supersampling.
//! 3. [`lens::LensMapping`] ray-traces that grid back to the source plane and
//!    produces the lensed image.
//! 4. [`inject::SpectrumInjector`] resamples the lensed image onto each band of
//!    an exposure through its world-coordinate system and adds it to a copy.
//!
//! [`frame::Frame`] ties the stages together and caches the lensed image, and
//! [`postage`] extracts catalog cutouts to inject into.

pub mod algo;
pub mod config;
pub mod error;
pub mod frame;
pub mod grid;
pub mod image_proc;
pub mod image_size;
pub mod inject;
pub mod lens;
pub mod params;
pub mod postage;
pub mod source;
pub mod wcs;

pub use config::{InjectionConfig, SkyPosition};
pub use error::LampError;
pub use frame::{Frame, FrameState};
pub use grid::{make_grid, RenderGrid};
pub use image_size::ImageSize;
pub use inject::{FluxNormalization, PlacedStamp, SpectrumInjector};
pub use lens::{LensComponent, LensComponentSpec, LensMapping};
pub use params::param_map;
pub use postage::{Candidates, CatalogRecord, Cutout, Exposure};
pub use source::{ProfileKind, ProfileSpec, ScaledImage, Shear, SourceModel};
pub use starfield::Equatorial;
pub use wcs::{TanWcs, TangentPlane, WorldCoordinateSystem};
