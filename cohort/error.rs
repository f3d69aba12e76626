use thiserror::Error;

use crate::tables::TableError;

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("{name} = {value} is not a probability in [0, 1]")]
    InvalidProbability { name: String, value: f64 },
    #[error("severity score {0} is not a finite NIHSS value")]
    InvalidSeverity(f64),
    #[error("start age {start_age} is beyond the terminal age {terminal_age}")]
    InvalidStartAge { start_age: u32, terminal_age: u32 },
    #[error("horizon of {0} years is not positive")]
    InvalidHorizon(i64),
    #[error("snapshot sequence is empty")]
    EmptySeries,
    #[error(transparent)]
    Table(#[from] TableError),
}

impl CohortError {
    pub(crate) fn probability(name: impl Into<String>, value: f64) -> Self {
        CohortError::InvalidProbability {
            name: name.into(),
            value,
        }
    }
}

/// Fail unless `value` lies in `[0, 1]`.
pub(crate) fn check_probability(name: &str, value: f64) -> Result<f64, CohortError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(CohortError::probability(name, value))
    }
}
