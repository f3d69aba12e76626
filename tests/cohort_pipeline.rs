use std::fs;
use std::sync::Arc;

use approx::assert_relative_eq;
use rankin::aggregate::{AggregationSettings, DeathCostPolicy, Horizon, aggregate};
use rankin::config::AnalysisConfig;
use rankin::distributor::{StrategyOutcome, distribute};
use rankin::markov::simulate;
use rankin::pipeline::{Evaluator, PatientProfile, Scenario, StrategySpec, Trial, TrialSet};
use rankin::states::{CohortDistribution, HealthState, MASS_TOLERANCE, Sex};
use rankin::tables::{
    CostTable, ModelTables, MortalityTable, PopulationMix, RawCosts, TERMINAL_AGE,
    TabulatedLifeTable,
};
use tempfile::tempdir;

fn outcome(p_good: f64) -> StrategyOutcome {
    StrategyOutcome {
        p_good,
        p_thrombolysis: 0.25,
        p_thrombectomy: 0.12,
        p_transfer: 0.2,
    }
}

#[test]
fn full_chain_conserves_mass_and_produces_finite_outcomes() {
    let tables = ModelTables::standard(2016).expect("standard tables");
    let initial = distribute(&tables.mix, 14.0, &outcome(0.3), &tables.costs).expect("distribute");
    assert!(initial.distribution.is_unit_cohort());

    let sequence = simulate(
        initial.distribution,
        68,
        Sex::Female,
        tables.mortality.as_ref(),
    )
    .expect("simulate");
    assert_eq!(sequence.len(), (TERMINAL_AGE - 68 + 1) as usize);
    for snapshot in sequence.snapshots() {
        assert!((snapshot.total() - 1.0).abs() <= MASS_TOLERANCE);
    }

    let result = aggregate(
        &sequence,
        initial.first_year_cost,
        &tables.costs,
        &AggregationSettings::default(),
    );
    assert!(result.qalys.is_finite() && result.qalys > 0.0);
    assert!(result.cost.is_finite() && result.cost > 0.0);
    assert_relative_eq!(result.yearly_costs[0], initial.first_year_cost);
}

#[test]
fn cohort_dead_at_start_only_pays_for_death_once() {
    let costs = CostTable::new(&RawCosts::default(), 2016).expect("costs");
    let tables = ModelTables::standard(2016).expect("tables");
    let dead = CohortDistribution::concentrated(HealthState::Death);
    let sequence = simulate(dead, 75, Sex::Male, tables.mortality.as_ref()).expect("simulate");
    let settings = AggregationSettings {
        death_cost: DeathCostPolicy::OnEntry,
        ..AggregationSettings::default()
    };
    let result = aggregate(&sequence, costs.death(), &costs, &settings);

    assert_eq!(result.qalys, 0.0);
    let nonzero: Vec<usize> = result
        .yearly_costs
        .iter()
        .enumerate()
        .filter(|(_, c)| **c != 0.0)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(nonzero, vec![0]);
    assert_relative_eq!(result.yearly_costs[0], costs.death());
}

#[test]
fn younger_patients_accrue_more_qalys() {
    let evaluator = Evaluator::from_config(&AnalysisConfig::default()).expect("evaluator");
    let strategy = StrategySpec {
        label: "local".to_string(),
        outcome: outcome(0.3),
    };
    let young = evaluator
        .evaluate_strategy(
            &rankin::TrialParameters {
                sex: Sex::Male,
                age: 55,
                nihss: 10.0,
            },
            &strategy,
        )
        .expect("young");
    let old = evaluator
        .evaluate_strategy(
            &rankin::TrialParameters {
                sex: Sex::Male,
                age: 85,
                nihss: 10.0,
            },
            &strategy,
        )
        .expect("old");
    assert!(young.qalys > old.qalys);
}

#[test]
fn tabulated_life_table_drives_the_evaluator() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("life.csv");
    let mut csv = String::from("age,male,female\n");
    for age in 0..=100 {
        csv.push_str(&format!("{age},0.02,0.01\n"));
    }
    fs::write(&path, csv).expect("write life table");

    let config = AnalysisConfig {
        life_table: Some(path.clone()),
        ..AnalysisConfig::default()
    };
    let evaluator = Evaluator::from_config(&config).expect("evaluator");
    let table = TabulatedLifeTable::from_csv(&path).expect("life table");
    let tables = ModelTables::new(
        evaluator.tables().costs.clone(),
        PopulationMix::default(),
        Arc::new(table),
    )
    .expect("tables");
    assert_eq!(tables.mortality.baseline(Sex::Male, 40), 0.02);
    assert_eq!(evaluator.tables().mortality.baseline(Sex::Female, 40), 0.01);
}

#[test]
fn shorter_horizon_never_increases_qalys() {
    let tables = ModelTables::standard(2016).expect("tables");
    let initial = distribute(&tables.mix, 8.0, &outcome(0.4), &tables.costs).expect("distribute");
    let sequence = simulate(
        initial.distribution,
        60,
        Sex::Male,
        tables.mortality.as_ref(),
    )
    .expect("simulate");
    let mut previous = f64::INFINITY;
    for horizon in [Horizon::Lifetime, Horizon::Years(20), Horizon::Years(10), Horizon::Years(2)] {
        let settings = AggregationSettings {
            horizon,
            ..AggregationSettings::default()
        };
        let result = aggregate(&sequence, initial.first_year_cost, &tables.costs, &settings);
        assert!(result.qalys <= previous);
        previous = result.qalys;
    }
}

#[test]
fn trial_file_round_trips_through_batch() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("trials.toml");
    let strategies = vec![
        StrategySpec {
            label: "drip-and-ship".to_string(),
            outcome: outcome(0.28),
        },
        StrategySpec {
            label: "mothership".to_string(),
            outcome: outcome(0.32),
        },
    ];
    let set = TrialSet {
        trials: (0..6)
            .map(|i| Trial {
                id: format!("trial-{i}"),
                scenario: Scenario {
                    patient: PatientProfile {
                        sex: if i % 2 == 0 { Sex::Male } else { Sex::Female },
                        age: 60 + i,
                        nihss: None,
                        race: Some(5.0),
                    },
                    strategies: strategies.clone(),
                },
            })
            .collect(),
    };
    fs::write(&path, toml::to_string(&set).expect("serialize")).expect("write trials");

    let loaded = TrialSet::load(&path).expect("load trials");
    assert_eq!(loaded, set);

    let evaluator = Evaluator::from_config(&AnalysisConfig::default()).expect("evaluator");
    let summary = evaluator.run_batch(&loaded.trials, None);
    assert_eq!(summary.trials, 6);
    assert!(summary.failed_trials.is_empty());
    let total: f64 = summary.ranked_shares().iter().map(|(_, share)| share).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    assert_eq!(summary.max_benefit.get("mothership"), Some(&6));
}
