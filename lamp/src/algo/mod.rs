//! Numerical building blocks shared by the source, lens and injection stages
//!
//! This module provides regular-grid bilinear interpolation, trapezoidal
//! quadrature and the modified Bessel function used by the Spergel profile.

pub mod bessel;
pub mod bilinear;
pub mod trapezoid;

pub use bessel::bessel_k;
pub use bilinear::{BilinearInterpolator, InterpolationError};
pub use trapezoid::{trap_integrate, TrapezoidError};
