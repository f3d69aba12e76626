//! Initial allocation of a unit cohort of emergency calls across health states.
//!
//! Mimics stay in the general population. Ischemic and hemorrhagic strokes are split across
//! mRS 0-5 and death using a severity-conditioned breakdown: the death share depends only on
//! NIHSS, good outcomes (mRS 0-2) come from the strategy's `p_good`, and whatever remains is
//! spread over mRS 3-5. Hemorrhagic strokes conservatively reuse the ischemic breakdown.
//!
//! The first model year is charged here rather than in the aggregator because it depends on
//! stroke type: 90 days at the acute cost schedule plus 270 days at the annual schedule, plus
//! one-off treatment and transfer costs for the ischemic population.

use serde::{Deserialize, Serialize};

use crate::error::{CohortError, check_probability};
use crate::states::{CohortDistribution, HealthState, MASS_TOLERANCE};
use crate::tables::{CostTable, PopulationMix, StrokeType};

/// Share of good outcomes landing in mRS 0 and mRS 1; mRS 2 takes the remainder.
const GOOD_OUTCOME_SPLIT: [f64; 2] = [0.205627706, 0.341991342];

/// Share of poor, non-fatal outcomes landing in mRS 3, 4 and 5.
const POOR_OUTCOME_SPLIT: [f64; 3] = [0.35678392, 0.432160804, 0.211055276];

const ACUTE_DAYS: f64 = 90.0;
const DAYS_PER_YEAR: f64 = 360.0;

/// Treatment and outcome probabilities for the ischemic population under one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    /// Probability of mRS 0-2 at 90 days.
    pub p_good: f64,
    /// Probability of receiving intravenous thrombolysis.
    pub p_thrombolysis: f64,
    /// Probability of receiving endovascular thrombectomy.
    pub p_thrombectomy: f64,
    /// Probability of an inter-hospital transfer.
    pub p_transfer: f64,
}

impl StrategyOutcome {
    pub fn validate(&self) -> Result<(), CohortError> {
        check_probability("p_good", self.p_good)?;
        check_probability("p_thrombolysis", self.p_thrombolysis)?;
        check_probability("p_thrombectomy", self.p_thrombectomy)?;
        check_probability("p_transfer", self.p_transfer)?;
        Ok(())
    }
}

/// A freshly allocated cohort and what its first year costs.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialCohort {
    pub distribution: CohortDistribution,
    pub first_year_cost: f64,
}

/// Probability of death at 90 days by NIHSS stratum, independent of treatment timing.
pub fn death_fraction(nihss: f64) -> f64 {
    if nihss < 7.0 {
        0.042
    } else if nihss < 13.0 {
        0.139
    } else if nihss < 21.0 {
        0.316
    } else {
        0.535
    }
}

/// mRS breakdown for a unit population of strokes with good-outcome probability `p_good`.
pub fn stroke_outcome_breakdown(p_good: f64, nihss: f64) -> Result<CohortDistribution, CohortError> {
    check_probability("p_good", p_good)?;
    if !nihss.is_finite() {
        return Err(CohortError::InvalidSeverity(nihss));
    }
    let dead = death_fraction(nihss);
    let poor = 1.0 - p_good - dead;
    if poor < -MASS_TOLERANCE {
        return Err(CohortError::probability("p_good + death fraction", p_good + dead));
    }
    let poor = poor.max(0.0);

    let mrs0 = GOOD_OUTCOME_SPLIT[0] * p_good;
    let mrs1 = GOOD_OUTCOME_SPLIT[1] * p_good;
    let mut breakdown = CohortDistribution::empty();
    breakdown[HealthState::ModifiedRankin0] = mrs0;
    breakdown[HealthState::ModifiedRankin1] = mrs1;
    breakdown[HealthState::ModifiedRankin2] = p_good - mrs0 - mrs1;
    breakdown[HealthState::ModifiedRankin3] = POOR_OUTCOME_SPLIT[0] * poor;
    breakdown[HealthState::ModifiedRankin4] = POOR_OUTCOME_SPLIT[1] * poor;
    breakdown[HealthState::ModifiedRankin5] = POOR_OUTCOME_SPLIT[2] * poor;
    breakdown[HealthState::Death] = dead;
    Ok(breakdown)
}

/// First-year cost of `mass` of the cohort with a stroke of `kind` ending in `state`.
fn first_year_state_cost(costs: &CostTable, kind: StrokeType, state: HealthState, mass: f64) -> f64 {
    if state.is_absorbing() {
        return mass * costs.death();
    }
    let acute = ACUTE_DAYS / DAYS_PER_YEAR;
    let remainder = (DAYS_PER_YEAR - ACUTE_DAYS) / DAYS_PER_YEAR;
    mass * (acute * costs.ninety_day(kind, state) + remainder * costs.annual(state))
}

/// Allocate a unit cohort across states and compute its first-year cost.
pub fn distribute(
    mix: &PopulationMix,
    nihss: f64,
    outcome: &StrategyOutcome,
    costs: &CostTable,
) -> Result<InitialCohort, CohortError> {
    check_probability("mimic fraction", mix.mimic)?;
    check_probability("hemorrhagic fraction", mix.hemorrhagic)?;
    check_probability("ischemic fraction", mix.ischemic)?;
    let mix_total = mix.mimic + mix.hemorrhagic + mix.ischemic;
    if (mix_total - 1.0).abs() > MASS_TOLERANCE {
        return Err(CohortError::probability("population mix total", mix_total));
    }
    outcome.validate()?;

    let breakdown = stroke_outcome_breakdown(outcome.p_good, nihss)?;
    let mut distribution = CohortDistribution::empty();
    distribution[HealthState::GeneralPopulation] = mix.mimic;

    let mut first_year_cost = mix.mimic * costs.annual(HealthState::GeneralPopulation);
    for (kind, fraction) in [
        (StrokeType::Ischemic, mix.ischemic),
        (StrokeType::Hemorrhagic, mix.hemorrhagic),
    ] {
        for (state, share) in breakdown.by_state() {
            let mass = fraction * share;
            distribution[state] += mass;
            first_year_cost += first_year_state_cost(costs, kind, state, mass);
        }
    }

    first_year_cost += mix.ischemic
        * (costs.thrombolysis() * outcome.p_thrombolysis
            + costs.thrombectomy() * outcome.p_thrombectomy
            + costs.transfer() * outcome.p_transfer);

    let total = distribution.total();
    if (total - 1.0).abs() > MASS_TOLERANCE {
        return Err(CohortError::probability("sum of state fractions", total));
    }
    log::trace!("Initial cohort {distribution:?}, first-year cost {first_year_cost:.2}");

    Ok(InitialCohort {
        distribution,
        first_year_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::RawCosts;
    use approx::assert_relative_eq;

    fn outcome(p_good: f64) -> StrategyOutcome {
        StrategyOutcome {
            p_good,
            p_thrombolysis: 0.2,
            p_thrombectomy: 0.1,
            p_transfer: 0.0,
        }
    }

    fn costs() -> CostTable {
        CostTable::new(&RawCosts::default(), 2016).unwrap()
    }

    #[test]
    fn death_fraction_follows_severity_strata() {
        assert_eq!(death_fraction(1.0), 0.042);
        assert_eq!(death_fraction(7.0), 0.139);
        assert_eq!(death_fraction(12.9), 0.139);
        assert_eq!(death_fraction(20.0), 0.316);
        assert_eq!(death_fraction(21.0), 0.535);
    }

    #[test]
    fn breakdown_splits_good_and_poor_outcomes() {
        let breakdown = stroke_outcome_breakdown(0.4, 10.0).unwrap();
        assert!(breakdown.is_unit_cohort());
        assert_eq!(breakdown[HealthState::GeneralPopulation], 0.0);
        assert_relative_eq!(breakdown[HealthState::ModifiedRankin0], 0.4 * 0.205627706);
        assert_relative_eq!(
            breakdown[HealthState::ModifiedRankin2],
            0.4 * 0.452380952,
            epsilon = 1e-9
        );
        let poor = 1.0 - 0.4 - 0.139;
        assert_relative_eq!(breakdown[HealthState::ModifiedRankin4], 0.432160804 * poor);
        assert_relative_eq!(breakdown[HealthState::Death], 0.139);
    }

    #[test]
    fn breakdown_rejects_impossible_good_outcome() {
        // 0.6 good plus 0.535 dead leaves negative poor-outcome mass.
        assert!(matches!(
            stroke_outcome_breakdown(0.6, 25.0),
            Err(CohortError::InvalidProbability { .. })
        ));
        assert!(stroke_outcome_breakdown(1.2, 3.0).is_err());
        assert!(matches!(
            stroke_outcome_breakdown(0.3, f64::NAN),
            Err(CohortError::InvalidSeverity(_))
        ));
    }

    #[test]
    fn mimics_enter_general_population() {
        let mix = PopulationMix::default();
        let cohort = distribute(&mix, 10.0, &outcome(0.5), &costs()).unwrap();
        assert!(cohort.distribution.is_unit_cohort());
        assert_relative_eq!(cohort.distribution[HealthState::GeneralPopulation], mix.mimic);
        let stroke_dead = (mix.ischemic + mix.hemorrhagic) * 0.139;
        assert_relative_eq!(cohort.distribution[HealthState::Death], stroke_dead, epsilon = 1e-12);
    }

    #[test]
    fn all_mimic_cohort_costs_nothing() {
        let mix = PopulationMix {
            mimic: 1.0,
            hemorrhagic: 0.0,
            ischemic: 0.0,
        };
        let cohort = distribute(&mix, 10.0, &outcome(0.5), &costs()).unwrap();
        assert_eq!(cohort.first_year_cost, 0.0);
        assert_relative_eq!(cohort.distribution[HealthState::GeneralPopulation], 1.0);
    }

    #[test]
    fn first_year_cost_charges_treatments_to_ischemic_share() {
        let table = costs();
        let mix = PopulationMix {
            mimic: 0.0,
            hemorrhagic: 0.0,
            ischemic: 1.0,
        };
        let base = distribute(&mix, 10.0, &outcome(0.5), &table).unwrap();
        let mut transferred = outcome(0.5);
        transferred.p_transfer = 1.0;
        let with_transfer = distribute(&mix, 10.0, &transferred, &table).unwrap();
        assert_relative_eq!(
            with_transfer.first_year_cost - base.first_year_cost,
            table.transfer(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn first_year_cost_blends_acute_and_annual_schedules() {
        let table = costs();
        let mix = PopulationMix {
            mimic: 0.0,
            hemorrhagic: 1.0,
            ischemic: 0.0,
        };
        let no_treatment = StrategyOutcome {
            p_good: 0.5,
            p_thrombolysis: 0.0,
            p_thrombectomy: 0.0,
            p_transfer: 0.0,
        };
        let cohort = distribute(&mix, 3.0, &no_treatment, &table).unwrap();
        let expected: f64 = cohort
            .distribution
            .by_state()
            .map(|(state, mass)| match state {
                HealthState::Death => mass * table.death(),
                _ => {
                    mass * (0.25 * table.ninety_day(StrokeType::Hemorrhagic, state)
                        + 0.75 * table.annual(state))
                }
            })
            .sum();
        assert_relative_eq!(cohort.first_year_cost, expected, epsilon = 1e-9);
    }

    #[test]
    fn invalid_outcome_probability_is_rejected() {
        let mut bad = outcome(0.5);
        bad.p_thrombectomy = -0.1;
        let err = distribute(&PopulationMix::default(), 10.0, &bad, &costs()).unwrap_err();
        assert!(matches!(
            err,
            CohortError::InvalidProbability { ref name, .. } if name == "p_thrombectomy"
        ));
    }

    #[test]
    fn invalid_mix_is_rejected() {
        let mix = PopulationMix {
            mimic: 0.5,
            hemorrhagic: 0.5,
            ischemic: 0.5,
        };
        let err = distribute(&mix, 10.0, &outcome(0.5), &costs()).unwrap_err();
        assert!(matches!(
            err,
            CohortError::InvalidProbability { ref name, value }
                if name == "population mix total" && (value - 1.5).abs() < 1e-12
        ));
    }
}
