//! Error taxonomy for the rendering and injection pipeline.
//!
//! Every fallible public operation in this crate returns [`LampError`]. The
//! variants separate caller mistakes (bad configuration, out-of-order calls)
//! from numerical breakdowns inside a lens or profile model, so callers can
//! decide which failures are worth retrying with different inputs.
//!
//! Degenerate inputs that still have a well-defined answer (a source with zero
//! flux, a sky position that lands entirely off an exposure) are not errors.

use thiserror::Error;

use crate::algo::bilinear::InterpolationError;
use crate::algo::trapezoid::TrapezoidError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LampError {
    /// Malformed or inconsistent caller-supplied configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An unrecognised source profile or lens component kind.
    #[error("Invalid profile kind '{kind}', expected one of: {valid}")]
    InvalidProfile { kind: String, valid: String },

    /// An operation that needs prior state was called out of order.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A model produced non-finite values.
    #[error("Numerical error: {0}")]
    Numerical(String),
}

impl LampError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        LampError::Configuration(msg.into())
    }

    pub(crate) fn numerical(msg: impl Into<String>) -> Self {
        LampError::Numerical(msg.into())
    }
}

impl From<TrapezoidError> for LampError {
    fn from(err: TrapezoidError) -> Self {
        LampError::Numerical(err.to_string())
    }
}

impl From<InterpolationError> for LampError {
    fn from(err: InterpolationError) -> Self {
        match err {
            InterpolationError::OutOfBounds { .. } => LampError::Numerical(err.to_string()),
            _ => LampError::Configuration(err.to_string()),
        }
    }
}
