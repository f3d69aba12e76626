//! Discounted quality-adjusted survival and cost from a snapshot sequence.
//!
//! Yearly values are discounted at the effective annual rate equivalent to a continuous rate
//! (`exp(r) - 1`) and then integrated over the retained years with composite Simpson weights.

use ndarray::{Array1, s};
use serde::{Deserialize, Serialize};

use crate::markov::SnapshotSequence;
use crate::states::{CohortDistribution, HealthState};
use crate::tables::{CostTable, utility};

/// Continuous annual discount rate used for both costs and QALYs.
pub const DEFAULT_CONTINUOUS_DISCOUNT: f64 = 0.03;

/// How the death cost is charged after the first model year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCostPolicy {
    /// Every cycle charges the death cost for all mass currently in `Death`.
    #[default]
    EveryCycle,
    /// Only mass that entered `Death` during the cycle is charged.
    OnEntry,
}

/// Number of post-stroke years the decision is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Horizon {
    #[default]
    Lifetime,
    Years(u32),
}

impl Horizon {
    /// Last series index included in the integral for a series of `len` points.
    pub fn last_index(self, len: usize) -> usize {
        let full = len.saturating_sub(1);
        match self {
            Horizon::Lifetime => full,
            Horizon::Years(0) => {
                log::warn!("Horizon of 0 years is not positive; integrating the full lifetime");
                full
            }
            Horizon::Years(years) => (years as usize).min(full),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discounting {
    continuous_rate: f64,
}

impl Discounting {
    pub fn continuous(rate: f64) -> Self {
        Self {
            continuous_rate: rate,
        }
    }

    /// Effective annual rate equivalent to the continuous one.
    pub fn discrete_rate(&self) -> f64 {
        self.continuous_rate.exp() - 1.0
    }

    pub fn factor(&self, cycle: usize) -> f64 {
        let exponent = i32::try_from(cycle).unwrap_or(i32::MAX);
        (1.0 + self.discrete_rate()).powi(exponent).recip()
    }
}

impl Default for Discounting {
    fn default() -> Self {
        Self::continuous(DEFAULT_CONTINUOUS_DISCOUNT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregationSettings {
    pub discounting: Discounting,
    pub death_cost: DeathCostPolicy,
    pub horizon: Horizon,
    pub quadrature: Quadrature,
}

/// Discounted yearly series and their integrals over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountedOutcome {
    pub qalys: f64,
    pub cost: f64,
    pub yearly_qalys: Array1<f64>,
    pub yearly_costs: Array1<f64>,
}

fn living_utility(cohort: &CohortDistribution) -> f64 {
    HealthState::ALIVE
        .iter()
        .map(|&state| cohort[state] * utility(state))
        .sum()
}

fn living_cost(cohort: &CohortDistribution, costs: &CostTable) -> f64 {
    HealthState::ALIVE
        .iter()
        .map(|&state| cohort[state] * costs.annual(state))
        .sum()
}

/// Discounted quality-adjusted life-years lived in each snapshot year.
pub fn yearly_qalys(sequence: &SnapshotSequence, discounting: &Discounting) -> Array1<f64> {
    sequence
        .snapshots()
        .iter()
        .enumerate()
        .map(|(cycle, cohort)| living_utility(cohort) * discounting.factor(cycle))
        .collect()
}

/// Discounted cost of each snapshot year; index 0 is the supplied first-year cost.
pub fn yearly_costs(
    sequence: &SnapshotSequence,
    first_year_cost: f64,
    costs: &CostTable,
    policy: DeathCostPolicy,
    discounting: &Discounting,
) -> Array1<f64> {
    let snapshots = sequence.snapshots();
    let mut series = Array1::zeros(snapshots.len());
    series[0] = first_year_cost;
    for cycle in 1..snapshots.len() {
        let cohort = &snapshots[cycle];
        let charged_dead = match policy {
            DeathCostPolicy::EveryCycle => cohort[HealthState::Death],
            DeathCostPolicy::OnEntry => {
                cohort[HealthState::Death] - snapshots[cycle - 1][HealthState::Death]
            }
        };
        let cost = living_cost(cohort, costs) + charged_dead * costs.death();
        series[cycle] = cost * discounting.factor(cycle);
    }
    series
}

/// Weighting rule used to integrate a yearly series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrature {
    /// 1/3 at the first and last retained index, 4/3 at odd and 2/3 at even interior indices.
    #[default]
    Simpson,
    /// Simpson's 1/3 rule over pairs of intervals; an odd interval count closes its last three
    /// intervals with Simpson's 3/8 rule and a single interval uses the trapezoid rule.
    SimpsonWithClosure,
}

impl Quadrature {
    /// Weights for `points` equally spaced yearly values.
    pub fn weights(self, points: usize) -> Array1<f64> {
        match self {
            Quadrature::Simpson => simpson_weights(points),
            Quadrature::SimpsonWithClosure => closed_simpson_weights(points),
        }
    }
}

fn simpson_weights(points: usize) -> Array1<f64> {
    let Some(last) = points.checked_sub(1) else {
        return Array1::zeros(0);
    };
    Array1::from_shape_fn(points, |i| {
        if i == 0 || i == last {
            1.0 / 3.0
        } else if i % 2 == 1 {
            4.0 / 3.0
        } else {
            2.0 / 3.0
        }
    })
}

fn closed_simpson_weights(points: usize) -> Array1<f64> {
    let mut weights = Array1::zeros(points);
    let intervals = points.saturating_sub(1);
    match intervals {
        0 => {}
        1 => weights.fill(0.5),
        _ => {
            let simpson_end = if intervals % 2 == 0 {
                intervals
            } else {
                intervals - 3
            };
            for start in (0..simpson_end).step_by(2) {
                weights[start] += 1.0 / 3.0;
                weights[start + 1] += 4.0 / 3.0;
                weights[start + 2] += 1.0 / 3.0;
            }
            if simpson_end < intervals {
                let start = simpson_end;
                weights[start] += 3.0 / 8.0;
                weights[start + 1] += 9.0 / 8.0;
                weights[start + 2] += 9.0 / 8.0;
                weights[start + 3] += 3.0 / 8.0;
            }
        }
    }
    weights
}

/// Integrate a yearly series up to the horizon, inclusive.
pub fn integrate(series: &Array1<f64>, horizon: Horizon, quadrature: Quadrature) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let last = horizon.last_index(series.len());
    let retained = series.slice(s![..=last]);
    quadrature.weights(retained.len()).dot(&retained)
}

/// Discounted lifetime or horizon-limited QALYs and cost of a simulated cohort.
pub fn aggregate(
    sequence: &SnapshotSequence,
    first_year_cost: f64,
    costs: &CostTable,
    settings: &AggregationSettings,
) -> DiscountedOutcome {
    let yearly_qalys = yearly_qalys(sequence, &settings.discounting);
    let yearly_costs = yearly_costs(
        sequence,
        first_year_cost,
        costs,
        settings.death_cost,
        &settings.discounting,
    );
    DiscountedOutcome {
        qalys: integrate(&yearly_qalys, settings.horizon, settings.quadrature),
        cost: integrate(&yearly_costs, settings.horizon, settings.quadrature),
        yearly_qalys,
        yearly_costs,
    }
}
