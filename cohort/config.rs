//! Analysis settings shared by every trial of a run.
//!
//! Settings live in a small, human-editable TOML file; anything omitted falls back to the
//! published base case.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::aggregate::{
    AggregationSettings, DEFAULT_CONTINUOUS_DISCOUNT, DeathCostPolicy, Discounting, Horizon,
    Quadrature,
};
use crate::error::CohortError;
use crate::tables::inflation::LAST_CPI_YEAR;
use crate::tables::{
    CostTable, GompertzLifeTable, ModelTables, MortalityTable, PopulationMix, RawCosts,
    TabulatedLifeTable, TableError,
};

pub const DEFAULT_ICER_THRESHOLD: f64 = 100_000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("unknown horizon '{0}'; use \"lifetime\" or a number of years")]
    UnknownHorizon(String),
    #[error("ICER threshold must be positive and finite, got {0}")]
    InvalidThreshold(f64),
    #[error("discount rate must be finite and nonnegative, got {0}")]
    InvalidDiscountRate(f64),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Horizon as written in the file: `"lifetime"` or a number of years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HorizonSetting {
    Years(i64),
    Named(String),
}

impl Default for HorizonSetting {
    fn default() -> Self {
        HorizonSetting::Named("lifetime".to_string())
    }
}

impl HorizonSetting {
    pub fn resolve(&self) -> Result<Horizon, ConfigError> {
        match self {
            HorizonSetting::Named(name) if name.eq_ignore_ascii_case("lifetime") => {
                Ok(Horizon::Lifetime)
            }
            HorizonSetting::Named(name) => match name.trim().parse::<i64>() {
                Ok(years) => Ok(Self::clamp_years(years)),
                Err(_) => Err(ConfigError::UnknownHorizon(name.clone())),
            },
            HorizonSetting::Years(years) => Ok(Self::clamp_years(*years)),
        }
    }

    fn clamp_years(years: i64) -> Horizon {
        if years <= 0 {
            log::warn!(
                "{}; integrating the full lifetime instead",
                CohortError::InvalidHorizon(years)
            );
            return Horizon::Lifetime;
        }
        u32::try_from(years).map_or(Horizon::Lifetime, Horizon::Years)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Willingness to pay per QALY.
    pub icer_threshold: f64,
    pub horizon: HorizonSetting,
    pub continuous_discount_rate: f64,
    /// Currency year every cost is inflated to.
    pub currency_year: u16,
    pub death_cost_policy: DeathCostPolicy,
    pub quadrature: Quadrature,
    /// Optional `age,male,female` CSV replacing the built-in Gompertz life table.
    pub life_table: Option<PathBuf>,
    pub population_mix: PopulationMix,
    pub costs: RawCosts,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            icer_threshold: DEFAULT_ICER_THRESHOLD,
            horizon: HorizonSetting::default(),
            continuous_discount_rate: DEFAULT_CONTINUOUS_DISCOUNT,
            currency_year: LAST_CPI_YEAR,
            death_cost_policy: DeathCostPolicy::default(),
            quadrature: Quadrature::default(),
            life_table: None,
            population_mix: PopulationMix::default(),
            costs: RawCosts::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded analysis settings from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.icer_threshold.is_finite() || self.icer_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.icer_threshold));
        }
        if !self.continuous_discount_rate.is_finite() || self.continuous_discount_rate < 0.0 {
            return Err(ConfigError::InvalidDiscountRate(self.continuous_discount_rate));
        }
        self.population_mix.validate()?;
        self.horizon.resolve()?;
        Ok(())
    }

    pub fn aggregation_settings(&self) -> Result<AggregationSettings, ConfigError> {
        Ok(AggregationSettings {
            discounting: Discounting::continuous(self.continuous_discount_rate),
            death_cost: self.death_cost_policy,
            horizon: self.horizon.resolve()?,
            quadrature: self.quadrature,
        })
    }

    /// Build the read-only tables, performing the single currency inflation pass.
    pub fn build_tables(&self) -> Result<ModelTables, ConfigError> {
        let mortality: Arc<dyn MortalityTable> = match &self.life_table {
            Some(path) => Arc::new(TabulatedLifeTable::from_csv(path)?),
            None => Arc::new(GompertzLifeTable::default()),
        };
        let costs = CostTable::new(&self.costs, self.currency_year)?;
        Ok(ModelTables::new(costs, self.population_mix, mortality)?)
    }
}
