//! Per-trial evaluation: allocate, simulate and aggregate every strategy, then pick the
//! cost-effective one on the efficiency frontier. A batch of trials runs in parallel.

use ahash::AHashMap;
use indicatif::ProgressBar;
use itertools::Itertools;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::aggregate::{AggregationSettings, aggregate};
use crate::config::{AnalysisConfig, ConfigError};
use crate::distributor::{StrategyOutcome, distribute};
use crate::error::CohortError;
use crate::frontier::{FrontierAnalysis, FrontierError, FrontierPoint, analyze};
use crate::markov::simulate;
use crate::states::Sex;
use crate::tables::{ModelTables, TableError, race_to_nihss};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("patient profile must give exactly one of `nihss` or `race`")]
    AmbiguousSeverity,
    #[error("trial has no strategies to compare")]
    NoStrategies,
    #[error("every strategy failed to evaluate")]
    AllStrategiesFailed,
    #[error(transparent)]
    Cohort(#[from] CohortError),
    #[error(transparent)]
    Frontier(#[from] FrontierError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Patient description as written in scenario files; severity is given on either scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientProfile {
    pub sex: Sex,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nihss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<f64>,
}

impl PatientProfile {
    pub fn to_parameters(&self) -> Result<TrialParameters, PipelineError> {
        let nihss = match (self.nihss, self.race) {
            (Some(nihss), None) => nihss,
            (None, Some(race)) => race_to_nihss(race),
            _ => return Err(PipelineError::AmbiguousSeverity),
        };
        Ok(TrialParameters {
            sex: self.sex,
            age: self.age,
            nihss,
        })
    }
}

/// Everything that varies between trials. Passed by value; never stored globally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialParameters {
    pub sex: Sex,
    pub age: u32,
    pub nihss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub label: String,
    #[serde(flatten)]
    pub outcome: StrategyOutcome,
}

/// One patient and the strategies competing for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub patient: PatientProfile,
    pub strategies: Vec<StrategySpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: String,
    pub scenario: Scenario,
}

/// A file of `[[trials]]` tables, one per sampled parameter set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialSet {
    #[serde(default)]
    pub trials: Vec<Trial>,
}

impl TrialSet {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let set: Self = toml::from_str(&text)?;
        log::info!("Loaded {} trials from {}", set.trials.len(), path.display());
        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEvaluation {
    pub label: String,
    pub cost: f64,
    pub qalys: f64,
    pub yearly_costs: Array1<f64>,
    pub yearly_qalys: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub evaluations: Vec<StrategyEvaluation>,
    pub failures: Vec<StrategyFailure>,
    pub frontier: FrontierAnalysis,
    /// Strategy with the greatest discounted QALYs, irrespective of cost.
    pub max_benefit: String,
}

impl TrialResult {
    pub fn selected(&self) -> &str {
        &self.frontier.selected
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSummary {
    pub trials: usize,
    /// Number of completed trials in which each strategy was selected.
    pub selections: AHashMap<String, usize>,
    pub max_benefit: AHashMap<String, usize>,
    pub failed_trials: Vec<String>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.trials - self.failed_trials.len()
    }

    /// Fraction of completed trials that selected `label`.
    pub fn selection_share(&self, label: &str) -> f64 {
        match self.completed() {
            0 => 0.0,
            completed => *self.selections.get(label).unwrap_or(&0) as f64 / completed as f64,
        }
    }

    /// Every label that was selected or gave the maximum benefit, with its selection share,
    /// most often selected first.
    pub fn ranked_shares(&self) -> Vec<(String, f64)> {
        let mut shares: Vec<(String, f64)> = self
            .selections
            .keys()
            .chain(self.max_benefit.keys())
            .unique()
            .map(|label| (label.clone(), self.selection_share(label)))
            .collect();
        shares.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        shares
    }
}

/// Shared, read-only context for evaluating any number of trials.
#[derive(Debug, Clone)]
pub struct Evaluator {
    tables: ModelTables,
    settings: AggregationSettings,
    threshold: f64,
}

impl Evaluator {
    pub fn new(tables: ModelTables, settings: AggregationSettings, threshold: f64) -> Self {
        Self {
            tables,
            settings,
            threshold,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::new(
            config.build_tables()?,
            config.aggregation_settings()?,
            config.icer_threshold,
        ))
    }

    pub fn tables(&self) -> &ModelTables {
        &self.tables
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Distribute, simulate and aggregate one strategy for one patient.
    pub fn evaluate_strategy(
        &self,
        params: &TrialParameters,
        strategy: &StrategySpec,
    ) -> Result<StrategyEvaluation, CohortError> {
        let initial = distribute(
            &self.tables.mix,
            params.nihss,
            &strategy.outcome,
            &self.tables.costs,
        )?;
        let sequence = simulate(
            initial.distribution,
            params.age,
            params.sex,
            self.tables.mortality.as_ref(),
        )?;
        let outcome = aggregate(
            &sequence,
            initial.first_year_cost,
            &self.tables.costs,
            &self.settings,
        );
        log::debug!(
            "{}: {:.4} QALYs at ${:.2}",
            strategy.label,
            outcome.qalys,
            outcome.cost
        );
        Ok(StrategyEvaluation {
            label: strategy.label.clone(),
            cost: outcome.cost,
            qalys: outcome.qalys,
            yearly_costs: outcome.yearly_costs,
            yearly_qalys: outcome.yearly_qalys,
        })
    }

    /// Evaluate every strategy, drop the ones that fail, and run the frontier on the rest.
    pub fn evaluate_trial(
        &self,
        params: &TrialParameters,
        strategies: &[StrategySpec],
    ) -> Result<TrialResult, PipelineError> {
        if strategies.is_empty() {
            return Err(PipelineError::NoStrategies);
        }

        let mut evaluations = Vec::with_capacity(strategies.len());
        let mut failures = Vec::new();
        for strategy in strategies {
            match self.evaluate_strategy(params, strategy) {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(err) => {
                    log::warn!("Excluding strategy '{}': {err}", strategy.label);
                    failures.push(StrategyFailure {
                        label: strategy.label.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let max_benefit = evaluations
            .iter()
            .reduce(|best, next| if next.qalys > best.qalys { next } else { best })
            .map(|evaluation| evaluation.label.clone())
            .ok_or(PipelineError::AllStrategiesFailed)?;

        let points = evaluations
            .iter()
            .map(|e| FrontierPoint::new(e.label.clone(), e.qalys, e.cost))
            .collect();
        let frontier = analyze(points, self.threshold)?;

        Ok(TrialResult {
            evaluations,
            failures,
            frontier,
            max_benefit,
        })
    }

    pub fn evaluate_scenario(&self, scenario: &Scenario) -> Result<TrialResult, PipelineError> {
        let params = scenario.patient.to_parameters()?;
        self.evaluate_trial(&params, &scenario.strategies)
    }

    /// Evaluate all trials in parallel and tally which strategy each one selects.
    pub fn run_batch(&self, trials: &[Trial], progress: Option<&ProgressBar>) -> BatchSummary {
        let outcomes: Vec<(&str, Result<TrialResult, PipelineError>)> = trials
            .par_iter()
            .map(|trial| {
                let result = self.evaluate_scenario(&trial.scenario);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                (trial.id.as_str(), result)
            })
            .collect();

        let mut summary = BatchSummary {
            trials: trials.len(),
            ..BatchSummary::default()
        };
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    *summary
                        .selections
                        .entry(result.selected().to_string())
                        .or_insert(0) += 1;
                    *summary.max_benefit.entry(result.max_benefit).or_insert(0) += 1;
                }
                Err(err) => {
                    log::warn!("Trial '{id}' failed: {err}");
                    summary.failed_trials.push(id.to_string());
                }
            }
        }
        log::info!(
            "Batch finished: {} of {} trials completed",
            summary.completed(),
            summary.trials
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Horizon;
    use approx::assert_relative_eq;

    fn evaluator() -> Evaluator {
        Evaluator::from_config(&AnalysisConfig::default()).unwrap()
    }

    fn strategy(label: &str, p_good: f64, p_thrombectomy: f64) -> StrategySpec {
        StrategySpec {
            label: label.to_string(),
            outcome: StrategyOutcome {
                p_good,
                p_thrombolysis: 0.3,
                p_thrombectomy,
                p_transfer: 0.0,
            },
        }
    }

    fn patient() -> TrialParameters {
        TrialParameters {
            sex: Sex::Male,
            age: 70,
            nihss: 16.0,
        }
    }

    #[test]
    fn profile_requires_exactly_one_severity_scale() {
        let mut profile = PatientProfile {
            sex: Sex::Female,
            age: 65,
            nihss: None,
            race: Some(7.0),
        };
        assert_relative_eq!(profile.to_parameters().unwrap().nihss, 16.34, epsilon = 1e-12);
        profile.nihss = Some(10.0);
        assert!(matches!(
            profile.to_parameters(),
            Err(PipelineError::AmbiguousSeverity)
        ));
        profile.nihss = None;
        profile.race = None;
        assert!(profile.to_parameters().is_err());
    }

    #[test]
    fn better_outcomes_yield_more_qalys() {
        let evaluator = evaluator();
        let worse = evaluator
            .evaluate_strategy(&patient(), &strategy("worse", 0.2, 0.0))
            .unwrap();
        let better = evaluator
            .evaluate_strategy(&patient(), &strategy("better", 0.4, 0.0))
            .unwrap();
        assert!(better.qalys > worse.qalys);
        assert_eq!(better.yearly_qalys.len(), 31);
    }

    #[test]
    fn failing_strategy_is_excluded_not_fatal() {
        let evaluator = evaluator();
        let strategies = vec![strategy("ok", 0.3, 0.1), strategy("broken", 1.4, 0.1)];
        let result = evaluator.evaluate_trial(&patient(), &strategies).unwrap();
        assert_eq!(result.evaluations.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].label, "broken");
        assert_eq!(result.selected(), "ok");
        assert_eq!(result.max_benefit, "ok");
    }

    #[test]
    fn trial_with_only_failures_is_an_error() {
        let evaluator = evaluator();
        let result = evaluator.evaluate_trial(&patient(), &[strategy("broken", -0.5, 0.0)]);
        assert!(matches!(result, Err(PipelineError::AllStrategiesFailed)));
        assert!(matches!(
            evaluator.evaluate_trial(&patient(), &[]),
            Err(PipelineError::NoStrategies)
        ));
    }

    #[test]
    fn selection_comes_from_the_frontier() {
        let evaluator = evaluator();
        let strategies = vec![strategy("mothership", 0.35, 0.2), strategy("drip", 0.25, 0.2)];
        let result = evaluator.evaluate_trial(&patient(), &strategies).unwrap();
        assert_eq!(result.max_benefit, "mothership");
        assert!(
            result
                .frontier
                .frontier
                .iter()
                .any(|entry| entry.point.label == result.selected())
        );
        assert_eq!(result.frontier.frontier.len() + result.frontier.dominated.len(), 2);
    }

    #[test]
    fn horizon_limits_the_integrated_years() {
        let config = AnalysisConfig {
            horizon: crate::config::HorizonSetting::Years(5),
            ..AnalysisConfig::default()
        };
        let short = Evaluator::from_config(&config).unwrap();
        assert_eq!(short.settings.horizon, Horizon::Years(5));
        let lifetime = evaluator();
        let s = strategy("s", 0.3, 0.1);
        let five = short.evaluate_strategy(&patient(), &s).unwrap();
        let all = lifetime.evaluate_strategy(&patient(), &s).unwrap();
        assert!(five.qalys < all.qalys);
    }

    #[test]
    fn batch_tallies_selection_shares_and_failures() {
        let evaluator = evaluator();
        let good = Scenario {
            patient: PatientProfile {
                sex: Sex::Female,
                age: 75,
                nihss: Some(12.0),
                race: None,
            },
            strategies: vec![strategy("a", 0.3, 0.1)],
        };
        let mut bad = good.clone();
        bad.patient.race = Some(3.0);
        let trials = vec![
            Trial {
                id: "t1".to_string(),
                scenario: good.clone(),
            },
            Trial {
                id: "t2".to_string(),
                scenario: bad,
            },
            Trial {
                id: "t3".to_string(),
                scenario: good,
            },
        ];
        let summary = evaluator.run_batch(&trials, None);
        assert_eq!(summary.trials, 3);
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failed_trials, vec!["t2".to_string()]);
        assert_relative_eq!(summary.selection_share("a"), 1.0);
        assert_eq!(summary.selection_share("missing"), 0.0);
        assert_eq!(summary.ranked_shares(), vec![("a".to_string(), 1.0)]);
    }

    #[test]
    fn ranked_shares_include_strategies_that_only_gave_maximum_benefit() {
        let summary = BatchSummary {
            trials: 2,
            selections: AHashMap::from_iter([("a".to_string(), 2)]),
            max_benefit: AHashMap::from_iter([("b".to_string(), 2)]),
            failed_trials: Vec::new(),
        };
        assert_eq!(
            summary.ranked_shares(),
            vec![("a".to_string(), 1.0), ("b".to_string(), 0.0)]
        );
    }

    #[test]
    fn scenario_parses_from_toml() {
        let text = r#"
            [patient]
            sex = "female"
            age = 80
            race = 5.0

            [[strategies]]
            label = "drip-and-ship"
            p_good = 0.28
            p_thrombolysis = 0.4
            p_thrombectomy = 0.15
            p_transfer = 0.3
        "#;
        let scenario: Scenario = toml::from_str(text).unwrap();
        assert_eq!(scenario.strategies.len(), 1);
        assert_eq!(scenario.strategies[0].label, "drip-and-ship");
        assert_relative_eq!(scenario.strategies[0].outcome.p_transfer, 0.3);
        let result = evaluator().evaluate_scenario(&scenario).unwrap();
        assert_eq!(result.selected(), "drip-and-ship");
    }
}
