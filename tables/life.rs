//! Baseline mortality and the state-specific adjustment applied by the cohort simulator.
//!
//! A life table supplies the annual probability that a member of the general population of a
//! given sex dies between age `a` and `a + 1`. State-specific mortality is obtained by scaling
//! the baseline hazard, not the probability:
//!
//! ```text
//! q'(a) = 1 - (1 - q(a))^HR
//! ```
//!
//! Scaling the cumulative hazard `-ln(1 - q)` by the hazard ratio keeps `q'` inside `[0, 1]`
//! for any `q` in `[0, 1]` and any positive ratio, and preserves monotonicity in age.

use serde::Deserialize;
use std::path::Path;

use super::TableError;
use crate::states::Sex;

/// Oldest age a life table must cover; the simulator stops at 100.
pub const TERMINAL_AGE: u32 = 100;

pub trait MortalityTable: Send + Sync {
    /// Annual baseline probability of death at `age` for `sex`.
    fn baseline(&self, sex: Sex, age: u32) -> f64;

    /// Annual probability of death for someone whose mortality hazard is `hazard_ratio` times
    /// the baseline.
    fn adjusted_mortality(&self, sex: Sex, age: u32, hazard_ratio: f64) -> f64 {
        scale_hazard(self.baseline(sex, age), hazard_ratio)
    }
}

/// Hazard-scale an annual death probability.
#[inline]
pub fn scale_hazard(probability: f64, hazard_ratio: f64) -> f64 {
    let survival = (1.0 - probability).clamp(0.0, 1.0);
    1.0 - survival.powf(hazard_ratio)
}

/// Gompertz-Makeham force of mortality `mu(x) = lambda + alpha * exp(beta * x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GompertzMakeham {
    pub lambda: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl GompertzMakeham {
    /// Probability of dying within `[age, age + 1)` given alive at `age`.
    pub fn annual_probability(&self, age: u32) -> f64 {
        let x = f64::from(age);
        let cumulative =
            self.lambda + self.alpha * (self.beta * x).exp() * (self.beta.exp() - 1.0) / self.beta;
        1.0 - (-cumulative).exp()
    }
}

/// Parametric life table fitted to US period mortality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GompertzLifeTable {
    pub male: GompertzMakeham,
    pub female: GompertzMakeham,
}

impl Default for GompertzLifeTable {
    fn default() -> Self {
        Self {
            male: GompertzMakeham {
                lambda: 7.0e-4,
                alpha: 4.61e-5,
                beta: 0.09,
            },
            female: GompertzMakeham {
                lambda: 5.0e-4,
                alpha: 2.08e-5,
                beta: 0.095,
            },
        }
    }
}

impl MortalityTable for GompertzLifeTable {
    fn baseline(&self, sex: Sex, age: u32) -> f64 {
        match sex {
            Sex::Male => self.male.annual_probability(age),
            Sex::Female => self.female.annual_probability(age),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LifeTableRow {
    age: u32,
    male: f64,
    female: f64,
}

/// Life table read from a CSV file with `age,male,female` columns, one row per age from 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedLifeTable {
    male: Vec<f64>,
    female: Vec<f64>,
}

impl TabulatedLifeTable {
    pub fn new(male: Vec<f64>, female: Vec<f64>) -> Result<Self, TableError> {
        if male.len() != female.len() {
            return Err(TableError::LifeTableShape {
                male: male.len(),
                female: female.len(),
            });
        }
        let required = TERMINAL_AGE as usize;
        if male.len() < required {
            return Err(TableError::LifeTableTooShort {
                covered: male.len(),
                required,
            });
        }
        for (sex, column) in [(Sex::Male, &male), (Sex::Female, &female)] {
            if let Some((age, &value)) = column
                .iter()
                .enumerate()
                .find(|(_, q)| !(0.0..=1.0).contains(*q))
            {
                return Err(TableError::InvalidLifeTableProbability { sex, age, value });
            }
        }
        Ok(Self { male, female })
    }

    pub fn from_csv(path: &Path) -> Result<Self, TableError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut male = Vec::new();
        let mut female = Vec::new();
        for (expected_age, row) in reader.deserialize::<LifeTableRow>().enumerate() {
            let row = row?;
            if row.age as usize != expected_age {
                return Err(TableError::NonContiguousAges {
                    expected: expected_age,
                    found: row.age,
                });
            }
            male.push(row.male);
            female.push(row.female);
        }
        log::info!(
            "Loaded life table with {} ages from {}",
            male.len(),
            path.display()
        );
        Self::new(male, female)
    }
}

impl MortalityTable for TabulatedLifeTable {
    fn baseline(&self, sex: Sex, age: u32) -> f64 {
        let column = match sex {
            Sex::Male => &self.male,
            Sex::Female => &self.female,
        };
        // Ages past the table reuse its oldest row.
        let index = (age as usize).min(column.len() - 1);
        column[index]
    }
}
