//! Constant model inputs: per-state hazard ratios, utility weights, unit costs, population mix,
//! and the baseline life table. Everything here is built once and then only read.

pub mod costs;
pub mod inflation;
pub mod life;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::states::{HealthState, Sex};
pub use costs::{CostRecord, CostTable, RawCosts, StateCostRecord};
pub use life::{GompertzLifeTable, MortalityTable, TabulatedLifeTable, TERMINAL_AGE};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("currency year {year} is outside the CPI table ({first}-{last})")]
    CurrencyYearOutOfRange { year: u16, first: u16, last: u16 },
    #[error("life table columns differ in length (male {male}, female {female})")]
    LifeTableShape { male: usize, female: usize },
    #[error("life table covers {covered} ages but {required} are required")]
    LifeTableTooShort { covered: usize, required: usize },
    #[error("life table probability {value} for {sex:?} at age {age} is outside [0, 1]")]
    InvalidLifeTableProbability { sex: Sex, age: usize, value: f64 },
    #[error("life table ages must start at 0 and be contiguous (expected {expected}, found {found})")]
    NonContiguousAges { expected: usize, found: u32 },
    #[error("population mix {mimic} + {hemorrhagic} + {ischemic} does not describe a unit cohort")]
    InvalidPopulationMix {
        mimic: f64,
        hemorrhagic: f64,
        ischemic: f64,
    },
    #[error("life table I/O error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeType {
    Ischemic,
    Hemorrhagic,
}

/// Mortality hazard ratio relative to the general population, per living state.
pub fn hazard_ratio(state: HealthState) -> f64 {
    match state {
        HealthState::GeneralPopulation => 1.0,
        HealthState::ModifiedRankin0 => 1.53,
        HealthState::ModifiedRankin1 => 1.52,
        HealthState::ModifiedRankin2 => 2.17,
        HealthState::ModifiedRankin3 => 3.18,
        HealthState::ModifiedRankin4 => 4.55,
        HealthState::ModifiedRankin5 => 6.55,
        HealthState::Death => f64::INFINITY,
    }
}

/// Utility weight of one year lived in `state`.
pub fn utility(state: HealthState) -> f64 {
    match state {
        HealthState::GeneralPopulation | HealthState::ModifiedRankin0 => 1.0,
        HealthState::ModifiedRankin1 => 0.84,
        HealthState::ModifiedRankin2 => 0.78,
        HealthState::ModifiedRankin3 => 0.71,
        HealthState::ModifiedRankin4 => 0.44,
        HealthState::ModifiedRankin5 => 0.18,
        HealthState::Death => 0.0,
    }
}

/// Share of emergency calls that are stroke mimics, hemorrhagic strokes, and ischemic strokes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationMix {
    pub mimic: f64,
    pub hemorrhagic: f64,
    pub ischemic: f64,
}

impl PopulationMix {
    /// Build a mix whose ischemic share is whatever the other two leave over.
    pub fn from_mimic_and_hemorrhagic(mimic: f64, hemorrhagic: f64) -> Result<Self, TableError> {
        let mix = Self {
            mimic,
            hemorrhagic,
            ischemic: 1.0 - mimic - hemorrhagic,
        };
        mix.validate()?;
        Ok(mix)
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let fractions = [self.mimic, self.hemorrhagic, self.ischemic];
        let in_range = fractions.iter().all(|f| (0.0..=1.0).contains(f));
        let total: f64 = fractions.iter().sum();
        if !in_range || (total - 1.0).abs() > crate::states::MASS_TOLERANCE {
            return Err(TableError::InvalidPopulationMix {
                mimic: self.mimic,
                hemorrhagic: self.hemorrhagic,
                ischemic: self.ischemic,
            });
        }
        Ok(())
    }
}

impl Default for PopulationMix {
    /// PLUMBER study: mimics include TIA, hemorrhagic includes ICH and SAH.
    fn default() -> Self {
        let calls = 2402.0;
        let mimic = (1635.0 + 191.0) / calls;
        let hemorrhagic = (16.0 + 85.0) / calls;
        Self {
            mimic,
            hemorrhagic,
            ischemic: 1.0 - mimic - hemorrhagic,
        }
    }
}

/// Convert a RACE scale score to the NIHSS used for outcome stratification.
pub fn race_to_nihss(race: f64) -> f64 {
    if race == 0.0 { 1.0 } else { -0.39 + 2.39 * race }
}

pub fn nihss_to_race(nihss: f64) -> f64 {
    if nihss == 1.0 { 0.0 } else { (nihss + 0.39) / 2.39 }
}

/// Every read-only table the cohort pipeline consults.
#[derive(Clone)]
pub struct ModelTables {
    pub costs: CostTable,
    pub mix: PopulationMix,
    pub mortality: Arc<dyn MortalityTable>,
}

impl ModelTables {
    pub fn new(
        costs: CostTable,
        mix: PopulationMix,
        mortality: Arc<dyn MortalityTable>,
    ) -> Result<Self, TableError> {
        mix.validate()?;
        Ok(Self {
            costs,
            mix,
            mortality,
        })
    }

    /// Published defaults: PLUMBER mix, Gompertz life table, costs in `currency_year` dollars.
    pub fn standard(currency_year: u16) -> Result<Self, TableError> {
        Self::new(
            CostTable::new(&RawCosts::default(), currency_year)?,
            PopulationMix::default(),
            Arc::new(GompertzLifeTable::default()),
        )
    }
}

impl std::fmt::Debug for ModelTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTables")
            .field("costs", &self.costs)
            .field("mix", &self.mix)
            .finish_non_exhaustive()
    }
}
