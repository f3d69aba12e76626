//! Annual-cycle Markov cohort simulation.
//!
//! The only transitions are from each living state into the absorbing death state. Each cycle
//! reads a single snapshot of the prior distribution, so the per-state transfers are
//! independent of evaluation order and the mass leaving every state arrives in `Death`.

use crate::error::CohortError;
use crate::states::{CohortDistribution, HealthState, Sex};
use crate::tables::{MortalityTable, TERMINAL_AGE, hazard_ratio};

/// Distribution at the start of every simulated year plus the final one at the terminal age.
///
/// Index 0 is the allocated cohort at `start_age`, the last index the cohort at age 100.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSequence {
    start_age: u32,
    snapshots: Vec<CohortDistribution>,
}

impl SnapshotSequence {
    pub fn new(start_age: u32, snapshots: Vec<CohortDistribution>) -> Result<Self, CohortError> {
        if snapshots.is_empty() {
            return Err(CohortError::EmptySeries);
        }
        Ok(Self {
            start_age,
            snapshots,
        })
    }

    pub fn start_age(&self) -> u32 {
        self.start_age
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[CohortDistribution] {
        &self.snapshots
    }

    pub fn last(&self) -> &CohortDistribution {
        // Construction guarantees at least one snapshot.
        &self.snapshots[self.snapshots.len() - 1]
    }
}

/// Advance `cohort` by one year at `age`, returning the next distribution.
pub fn step(
    cohort: &CohortDistribution,
    mortality: &dyn MortalityTable,
    sex: Sex,
    age: u32,
) -> Result<CohortDistribution, CohortError> {
    let mut next = cohort.clone();
    let mut deaths = 0.0;
    for state in HealthState::ALIVE {
        let p_dead = mortality.adjusted_mortality(sex, age, hazard_ratio(state));
        if !(0.0..=1.0).contains(&p_dead) {
            return Err(CohortError::probability(
                format!("mortality in {state} at age {age}"),
                p_dead,
            ));
        }
        let leaving = cohort[state] * p_dead;
        next[state] = cohort[state] - leaving;
        deaths += leaving;
    }
    next[HealthState::Death] = cohort[HealthState::Death] + deaths;
    Ok(next)
}

/// Run the cohort from `start_age` to the terminal age, one snapshot per year.
pub fn simulate(
    initial: CohortDistribution,
    start_age: u32,
    sex: Sex,
    mortality: &dyn MortalityTable,
) -> Result<SnapshotSequence, CohortError> {
    if start_age > TERMINAL_AGE {
        return Err(CohortError::InvalidStartAge {
            start_age,
            terminal_age: TERMINAL_AGE,
        });
    }

    let cycles = (TERMINAL_AGE - start_age) as usize;
    let mut snapshots = Vec::with_capacity(cycles + 1);
    let mut current = initial;
    for age in start_age..TERMINAL_AGE {
        let next = step(&current, mortality, sex, age)?;
        snapshots.push(current);
        current = next;
    }
    snapshots.push(current);

    log::debug!(
        "Simulated {} cycles from age {start_age}; {:.4} of the cohort alive at {TERMINAL_AGE}",
        cycles,
        snapshots[cycles].alive()
    );
    SnapshotSequence::new(start_age, snapshots)
}
