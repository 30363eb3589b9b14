//! Trapezoidal integration utility

use thiserror::Error;

/// Errors that can occur during trapezoidal integration
#[derive(Debug, Error)]
pub enum TrapezoidError {
    #[error("Insufficient points for integration, need at least 2 points")]
    InsufficientPoints,

    #[error("Points must be in ascending order")]
    NotAscending,
}

/// Performs trapezoidal integration of a function over a set of points.
///
/// # Arguments
///
/// * `corners` - The x coordinates of the trapezoid corners in ascending order
/// * `to_integrate` - The function to integrate
///
/// # Returns
///
/// The result of the trapezoidal integration or an error if the input is invalid.
pub fn trap_integrate<F>(corners: &[f64], to_integrate: F) -> Result<f64, TrapezoidError>
where
    F: Fn(f64) -> f64,
{
    if corners.len() < 2 {
        return Err(TrapezoidError::InsufficientPoints);
    }

    for i in 1..corners.len() {
        if corners[i] <= corners[i - 1] {
            return Err(TrapezoidError::NotAscending);
        }
    }

    let mut integral_sum = 0.0;
    let mut y_left = to_integrate(corners[0]);

    // Each interior sample is evaluated once and reused for the next interval
    for window in corners.windows(2) {
        let y_right = to_integrate(window[1]);
        integral_sum += (window[1] - window[0]) * (y_left + y_right) / 2.0;
        y_left = y_right;
    }

    Ok(integral_sum)
}

/// Evenly spaced corners covering `[start, end]` with the given step.
///
/// The last corner is always exactly `end`, so the final interval may be
/// shorter than `step`.
pub fn uniform_corners(start: f64, end: f64, step: f64) -> Vec<f64> {
    let mut corners = Vec::new();
    if !(step > 0.0) || !(end > start) {
        return corners;
    }

    let n = ((end - start) / step).floor() as usize;
    corners.extend((0..=n).map(|i| start + i as f64 * step));
    if corners.last().map_or(true, |&last| last < end) {
        corners.push(end);
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trap_integrate() {
        // (1-0)(0^2+1^2)/2 + (2-1)(1^2+2^2)/2 + (3-2)(2^2+3^2)/2 = 9.5
        let corners = vec![0.0, 1.0, 2.0, 3.0];
        let result = trap_integrate(&corners, |x| x * x).unwrap();

        assert_relative_eq!(result, 9.5, epsilon = 1e-12);
    }

    #[test]
    fn test_insufficient_points() {
        let result = trap_integrate(&[1.0], |x| x);
        assert!(matches!(result, Err(TrapezoidError::InsufficientPoints)));
    }

    #[test]
    fn test_not_ascending() {
        let result = trap_integrate(&[0.0, 2.0, 1.0, 3.0], |x| x);
        assert!(matches!(result, Err(TrapezoidError::NotAscending)));
    }

    #[test]
    fn test_uniform_corners_hits_end() {
        let corners = uniform_corners(0.0, 1.05, 0.1);
        assert_eq!(corners.first().copied(), Some(0.0));
        assert_eq!(corners.last().copied(), Some(1.05));
        assert!(corners.windows(2).all(|w| w[1] > w[0]));
        assert!(uniform_corners(1.0, 0.0, 0.1).is_empty());
    }
}
