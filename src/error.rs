use thiserror::Error;

/// Invalid construction parameters. Always detected before any work begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Box dimension {axis} must be positive and finite, got {value}")]
    NonPositiveDimension { axis: &'static str, value: f64 },
    #[error("Box matrix is not invertible")]
    NotInvertible,
    #[error("Box geometry is inconsistent with 2D operation: {0}")]
    Inconsistent2D(&'static str),
    #[error("Cutoff {cutoff} exceeds half the smallest box width ({max})")]
    CutoffTooLarge { cutoff: f64, max: f64 },
    #[error("{name} must be positive and finite, got {value}")]
    InvalidRadius { name: &'static str, value: f64 },
    #[error("Harmonic degree must be even and greater than zero, got {0}")]
    InvalidDegree(u32),
    #[error("{name} must be non-negative, got {value}")]
    NegativeThreshold { name: &'static str, value: f64 },
    #[error("Coordination number k must be positive, got {0}")]
    InvalidCoordination(f64),
    #[error("Invalid binning: {0}")]
    InvalidBinning(String),
    #[error("Query radius {radius} exceeds the index cutoff {cutoff}")]
    QueryRadiusTooLarge { radius: f64, cutoff: f64 },
    #[error("{0} requires at least one particle")]
    EmptyInput(&'static str),
    #[error("Could not build a worker pool: {0}")]
    ThreadPool(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Length of {what} ({got}) does not match the expected length {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Rejects radii that are non-positive, NaN or infinite.
pub(crate) fn check_radius(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidRadius { name, value });
    }
    Ok(())
}

pub(crate) fn check_threshold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < 0.0 {
        return Err(ConfigError::NegativeThreshold { name, value });
    }
    Ok(())
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::SizeMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_validation() {
        assert!(check_radius("r_max", 1.0).is_ok());
        assert!(check_radius("r_max", 0.0).is_err());
        assert!(check_radius("r_max", -2.0).is_err());
        assert!(check_radius("r_max", f64::NAN).is_err());
        assert!(check_radius("r_max", f64::INFINITY).is_err());
    }

    #[test]
    fn test_threshold_validation() {
        assert!(check_threshold("q_threshold", 0.0).is_ok());
        assert!(check_threshold("q_threshold", 0.7).is_ok());
        assert_eq!(
            check_threshold("q_threshold", -0.1),
            Err(ConfigError::NegativeThreshold {
                name: "q_threshold",
                value: -0.1
            })
        );
    }

    #[test]
    fn test_size_mismatch_is_not_config() {
        let err = check_len("orientations", 3, 2).unwrap_err();
        assert!(!err.is_config());
        assert_eq!(
            err.to_string(),
            "Length of orientations (2) does not match the expected length 3"
        );
        let err: Error = ConfigError::InvalidDegree(3).into();
        assert!(err.is_config());
    }
}
