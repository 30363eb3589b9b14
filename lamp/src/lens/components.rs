//! Individual deflection-field components.
//!
//! Every component returns its deflection `alpha(x, y)` in arcsec for an
//! image-plane position in arcsec. Components are combined additively by
//! [`crate::lens::LensMapping`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LampError;
use crate::params::ParamSet;

const CENTER_KEYS: [&str; 2] = ["center_x", "center_y"];

/// Lens component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensKind {
    Sis,
    PointMass,
    Nfw,
    Shear,
    Convergence,
}

impl LensKind {
    pub const ALL: [LensKind; 5] = [
        LensKind::Sis,
        LensKind::PointMass,
        LensKind::Nfw,
        LensKind::Shear,
        LensKind::Convergence,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LensKind::Sis => "sis",
            LensKind::PointMass => "point_mass",
            LensKind::Nfw => "nfw",
            LensKind::Shear => "shear",
            LensKind::Convergence => "convergence",
        }
    }

    pub fn valid_kinds() -> String {
        Self::ALL
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `(required, optional)` parameter keys.
    fn schema(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            LensKind::Sis | LensKind::PointMass => (&["theta_E"], &CENTER_KEYS),
            LensKind::Nfw => (&["Rs", "alpha_Rs"], &CENTER_KEYS),
            LensKind::Shear => (&["gamma1", "gamma2"], &[]),
            LensKind::Convergence => (&["kappa"], &[]),
        }
    }
}

impl fmt::Display for LensKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LensKind {
    type Err = LampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sis" => Ok(LensKind::Sis),
            "point_mass" | "pointmass" => Ok(LensKind::PointMass),
            "nfw" => Ok(LensKind::Nfw),
            "shear" => Ok(LensKind::Shear),
            "convergence" => Ok(LensKind::Convergence),
            _ => Err(LampError::InvalidProfile {
                kind: s.to_string(),
                valid: Self::valid_kinds(),
            }),
        }
    }
}

/// Caller-facing lens component description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensComponentSpec {
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

/// A validated deflection component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LensComponent {
    /// Singular isothermal sphere with Einstein radius `theta_e`.
    Sis { theta_e: f64, center: (f64, f64) },
    /// Point mass with Einstein radius `theta_e`.
    PointMass { theta_e: f64, center: (f64, f64) },
    /// Navarro-Frenk-White halo with scale radius `rs` and deflection `alpha_rs` at `rs`.
    Nfw { rs: f64, alpha_rs: f64, center: (f64, f64) },
    /// External shear.
    ExternalShear { gamma1: f64, gamma2: f64 },
    /// Uniform mass sheet.
    Convergence { kappa: f64 },
}

fn non_negative(params: &ParamSet, key: &str, owner: &str) -> Result<f64, LampError> {
    let value = params.get(key)?;
    if value < 0.0 {
        return Err(LampError::config(format!(
            "{owner}: {key} must be non-negative, got {value}"
        )));
    }
    Ok(value)
}

impl LensComponent {
    /// Validate `params` against the schema of `kind`.
    pub fn from_parts(kind: &str, params: &BTreeMap<String, f64>) -> Result<Self, LampError> {
        let kind: LensKind = kind.parse()?;
        let owner = kind.name();
        let (required, optional) = kind.schema();
        let p = ParamSet::validate(owner, params, required, optional)?;
        let center = (p.get_or("center_x", 0.0), p.get_or("center_y", 0.0));

        Ok(match kind {
            LensKind::Sis => LensComponent::Sis {
                theta_e: non_negative(&p, "theta_E", owner)?,
                center,
            },
            LensKind::PointMass => LensComponent::PointMass {
                theta_e: non_negative(&p, "theta_E", owner)?,
                center,
            },
            LensKind::Nfw => LensComponent::Nfw {
                rs: p.positive("Rs")?,
                alpha_rs: p.get("alpha_Rs")?,
                center,
            },
            LensKind::Shear => LensComponent::ExternalShear {
                gamma1: p.get("gamma1")?,
                gamma2: p.get("gamma2")?,
            },
            LensKind::Convergence => LensComponent::Convergence {
                kappa: p.get("kappa")?,
            },
        })
    }

    pub fn from_spec(spec: &LensComponentSpec) -> Result<Self, LampError> {
        Self::from_parts(&spec.kind, &spec.params)
    }

    pub fn kind(&self) -> LensKind {
        match self {
            LensComponent::Sis { .. } => LensKind::Sis,
            LensComponent::PointMass { .. } => LensKind::PointMass,
            LensComponent::Nfw { .. } => LensKind::Nfw,
            LensComponent::ExternalShear { .. } => LensKind::Shear,
            LensComponent::Convergence { .. } => LensKind::Convergence,
        }
    }

    /// Deflection in arcsec at image-plane position `(x, y)` arcsec.
    ///
    /// A point mass evaluated exactly at its centre returns infinite
    /// components; callers treat any non-finite result as a numerical failure.
    pub fn deflection(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            LensComponent::Sis { theta_e, center } => {
                let (dx, dy) = (x - center.0, y - center.1);
                let r = dx.hypot(dy);
                if r == 0.0 {
                    return (0.0, 0.0);
                }
                (theta_e * dx / r, theta_e * dy / r)
            }
            LensComponent::PointMass { theta_e, center } => {
                let (dx, dy) = (x - center.0, y - center.1);
                let r2 = dx * dx + dy * dy;
                if r2 == 0.0 {
                    return (f64::INFINITY, f64::INFINITY);
                }
                let scale = theta_e * theta_e / r2;
                (scale * dx, scale * dy)
            }
            LensComponent::Nfw { rs, alpha_rs, center } => {
                let (dx, dy) = (x - center.0, y - center.1);
                let r = dx.hypot(dy);
                if r == 0.0 {
                    return (0.0, 0.0);
                }
                let magnitude = alpha_rs * nfw_mass_term(r / rs) / nfw_mass_term(1.0);
                (magnitude * dx / r, magnitude * dy / r)
            }
            LensComponent::ExternalShear { gamma1, gamma2 } => {
                (gamma1 * x + gamma2 * y, gamma2 * x - gamma1 * y)
            }
            LensComponent::Convergence { kappa } => (kappa * x, kappa * y),
        }
    }
}

/// Below this `r / Rs` the closed form of `h(x)` cancels badly; a series is used.
const NFW_SERIES_BELOW: f64 = 1e-3;

/// `h(x) / x` for the projected NFW profile, proportional to the deflection
/// magnitude at `r = x Rs`.
fn nfw_mass_term(x: f64) -> f64 {
    if x < NFW_SERIES_BELOW {
        let l = std::f64::consts::LN_2 - x.ln();
        return x / 4.0 * (2.0 * l - 1.0) + x.powi(3) * (3.0 * l / 8.0 - 7.0 / 32.0);
    }

    let tail = if x < 1.0 {
        2.0 / (1.0 - x * x).sqrt() * ((1.0 - x) / (1.0 + x)).sqrt().atanh()
    } else if x > 1.0 {
        2.0 / (x * x - 1.0).sqrt() * ((x - 1.0) / (x + 1.0)).sqrt().atan()
    } else {
        1.0
    };
    ((x / 2.0).ln() + tail) / x
}
