#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod aggregate;
pub mod config;
pub mod distributor;
pub mod error;
pub mod markov;
pub mod pipeline;
pub mod states;

#[path = "../tables/mod.rs"]
pub mod tables;

#[path = "../frontier/mod.rs"]
pub mod frontier;

pub use aggregate::{AggregationSettings, DeathCostPolicy, DiscountedOutcome, Horizon, Quadrature};
pub use config::{AnalysisConfig, ConfigError};
pub use distributor::{InitialCohort, StrategyOutcome};
pub use error::CohortError;
pub use frontier::{FrontierAnalysis, FrontierError, FrontierPoint, Icer};
pub use markov::SnapshotSequence;
pub use pipeline::{
    BatchSummary, Evaluator, PipelineError, Scenario, StrategySpec, Trial, TrialParameters,
    TrialResult, TrialSet,
};
pub use states::{CohortDistribution, HealthState, Sex};
