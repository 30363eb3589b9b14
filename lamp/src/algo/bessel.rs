//! Modified Bessel function of the second kind for real order.
//!
//! Evaluated from the integral representation
//!
//! ```text
//! K_nu(x) = ∫₀^∞ exp(-x cosh t) cosh(nu t) dt,   x > 0
//! ```
//!
//! The integrand is smooth, even in `t` and decays double-exponentially, so the
//! plain trapezoidal rule converges geometrically in the step size. Every term
//! is positive, so relative accuracy holds at large `x` where the
//! `(I_-nu - I_nu) / sin(nu pi)` form cancels.

use super::trapezoid::{trap_integrate, uniform_corners, TrapezoidError};

/// Quadrature step in `t`.
const STEP: f64 = 0.05;

/// Integrand is truncated once `x cosh t - |nu| t` exceeds this many e-folds.
const TAIL_EFOLDS: f64 = 50.0;

/// Hard cap on the truncation point, reached only for absurdly small `x`.
const MAX_T: f64 = 60.0;

fn truncation_point(nu: f64, x: f64) -> f64 {
    let mut t = 0.0;
    while t < MAX_T && x * t.cosh() - nu.abs() * t < x + TAIL_EFOLDS {
        t += 0.5;
    }
    t.max(STEP)
}

/// Evaluate `K_nu(x)`.
///
/// Returns infinity at `x == 0` (the function diverges there for every order)
/// and for negative `x`, where it is undefined on the real line.
pub fn bessel_k(nu: f64, x: f64) -> Result<f64, TrapezoidError> {
    if !(x > 0.0) {
        return Ok(f64::INFINITY);
    }

    let corners = uniform_corners(0.0, truncation_point(nu, x), STEP);
    trap_integrate(&corners, |t| (-x * t.cosh()).exp() * (nu * t).cosh())
}
