use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, Index, IndexMut};

/// Tolerance used when checking that a distribution still describes a unit cohort.
pub const MASS_TOLERANCE: f64 = 1e-9;

/// Health states of the cohort model. The discriminant is the table ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    GeneralPopulation = 0,
    ModifiedRankin0 = 1,
    ModifiedRankin1 = 2,
    ModifiedRankin2 = 3,
    ModifiedRankin3 = 4,
    ModifiedRankin4 = 5,
    ModifiedRankin5 = 6,
    Death = 7,
}

impl HealthState {
    pub const COUNT: usize = 8;

    pub const ALL: [HealthState; Self::COUNT] = [
        HealthState::GeneralPopulation,
        HealthState::ModifiedRankin0,
        HealthState::ModifiedRankin1,
        HealthState::ModifiedRankin2,
        HealthState::ModifiedRankin3,
        HealthState::ModifiedRankin4,
        HealthState::ModifiedRankin5,
        HealthState::Death,
    ];

    /// Every state a living cohort member can occupy.
    pub const ALIVE: [HealthState; Self::COUNT - 1] = [
        HealthState::GeneralPopulation,
        HealthState::ModifiedRankin0,
        HealthState::ModifiedRankin1,
        HealthState::ModifiedRankin2,
        HealthState::ModifiedRankin3,
        HealthState::ModifiedRankin4,
        HealthState::ModifiedRankin5,
    ];

    #[inline]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_absorbing(self) -> bool {
        matches!(self, HealthState::Death)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::GeneralPopulation => write!(f, "general population"),
            HealthState::Death => write!(f, "death"),
            other => write!(f, "mRS {}", other.ordinal() - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// Fraction of a unit cohort occupying each health state.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortDistribution(Array1<f64>);

impl CohortDistribution {
    pub fn empty() -> Self {
        Self(Array1::zeros(HealthState::COUNT))
    }

    /// The whole cohort in a single state.
    pub fn concentrated(state: HealthState) -> Self {
        let mut distribution = Self::empty();
        distribution[state] = 1.0;
        distribution
    }

    pub fn from_masses(masses: [f64; HealthState::COUNT]) -> Self {
        Self(Array1::from_vec(masses.to_vec()))
    }

    pub fn total(&self) -> f64 {
        self.0.sum()
    }

    pub fn alive(&self) -> f64 {
        self.total() - self[HealthState::Death]
    }

    /// True when every mass is nonnegative and the masses sum to one.
    pub fn is_unit_cohort(&self) -> bool {
        self.0.iter().all(|&mass| mass >= -MASS_TOLERANCE)
            && (self.total() - 1.0).abs() <= MASS_TOLERANCE
    }

    pub fn by_state(&self) -> impl Iterator<Item = (HealthState, f64)> + '_ {
        HealthState::ALL.iter().map(move |&state| (state, self[state]))
    }
}

impl Deref for CohortDistribution {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Index<HealthState> for CohortDistribution {
    type Output = f64;

    fn index(&self, state: HealthState) -> &f64 {
        &self.0[state.ordinal()]
    }
}

impl IndexMut<HealthState> for CohortDistribution {
    fn index_mut(&mut self, state: HealthState) -> &mut f64 {
        &mut self.0[state.ordinal()]
    }
}

impl From<CohortDistribution> for Array1<f64> {
    fn from(distribution: CohortDistribution) -> Self {
        distribution.0
    }
}
