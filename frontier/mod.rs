//! Cost-effectiveness frontier over competing strategies.
//!
//! Strategies are ordered by effect, a strategy that buys no more effect than its predecessor
//! at no lower cost is dropped, and then strategies that are extendedly dominated (a blend of
//! their neighbours would buy the same effect more cheaply) are dropped until the incremental
//! cost-effectiveness ratios along the frontier are non-decreasing. A cheaper, more effective
//! successor keeps its predecessor on the frontier and shows up as a negative ICER. The chosen
//! strategy is the most effective one whose ICER against its frontier predecessor is below the
//! willingness-to-pay threshold.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FrontierError {
    #[error("no strategies were supplied to the frontier")]
    EmptyFrontier,
    #[error("strategy '{label}' has a non-finite effect ({effect}) or cost ({cost})")]
    NonFiniteValue { label: String, effect: f64, cost: f64 },
    #[error("decision threshold must be positive and finite, got {0}")]
    InvalidThreshold(f64),
    #[error("extended dominance elimination did not converge after {0} iterations")]
    NonConvergentIcerElimination(usize),
}

/// One strategy's position in the cost-effectiveness plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub label: String,
    /// Discounted QALYs.
    pub effect: f64,
    pub cost: f64,
}

impl FrontierPoint {
    pub fn new(label: impl Into<String>, effect: f64, cost: f64) -> Self {
        Self {
            label: label.into(),
            effect,
            cost,
        }
    }
}

/// Incremental cost-effectiveness ratio against the previous frontier strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Icer {
    /// The least effective frontier strategy has nothing to be compared with.
    NotApplicable,
    Ratio(f64),
}

impl fmt::Display for Icer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Icer::NotApplicable => write!(f, "N/A"),
            Icer::Ratio(value) => write!(f, "{value:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dominance {
    /// Another strategy is at least as effective and no more costly.
    Simple { by: String },
    /// Removed while restoring non-decreasing ICERs.
    Extended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub point: FrontierPoint,
    pub icer: Icer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierAnalysis {
    pub selected: String,
    pub selected_icer: Icer,
    /// Surviving strategies in increasing order of effect.
    pub frontier: Vec<FrontierEntry>,
    /// Removed strategies in the order they were eliminated.
    pub dominated: Vec<(FrontierPoint, Dominance)>,
}

fn validate(points: &[FrontierPoint], threshold: f64) -> Result<(), FrontierError> {
    if points.is_empty() {
        return Err(FrontierError::EmptyFrontier);
    }
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(FrontierError::InvalidThreshold(threshold));
    }
    if let Some(bad) = points
        .iter()
        .find(|p| !p.effect.is_finite() || !p.cost.is_finite())
    {
        return Err(FrontierError::NonFiniteValue {
            label: bad.label.clone(),
            effect: bad.effect,
            cost: bad.cost,
        });
    }
    Ok(())
}

/// Stable sort by effect, then cost. Inputs must already be finite.
fn sort_points(points: &mut [FrontierPoint]) {
    points.sort_by(|a, b| {
        a.effect
            .total_cmp(&b.effect)
            .then_with(|| a.cost.total_cmp(&b.cost))
    });
}

/// Remove simply dominated strategies from an effect-sorted list in a single pass.
///
/// A strategy with no more effect and no less cost than the last strategy kept is dropped, so
/// of two identical strategies the earlier one survives.
pub fn eliminate_dominated(
    sorted: Vec<FrontierPoint>,
) -> (Vec<FrontierPoint>, Vec<(FrontierPoint, Dominance)>) {
    let mut kept: Vec<FrontierPoint> = Vec::with_capacity(sorted.len());
    let mut removed = Vec::new();
    for point in sorted {
        match kept.last() {
            Some(top) if point.effect <= top.effect && point.cost >= top.cost => {
                let by = top.label.clone();
                removed.push((point, Dominance::Simple { by }));
            }
            _ => kept.push(point),
        }
    }
    (kept, removed)
}

/// ICERs between consecutive strategies of an effect-sorted list.
pub fn icers(points: &[FrontierPoint]) -> Vec<f64> {
    points
        .iter()
        .tuple_windows()
        .map(|(previous, next)| (next.cost - previous.cost) / (next.effect - previous.effect))
        .collect()
}

/// Drop extendedly dominated strategies until ICERs are non-decreasing along the frontier.
pub fn eliminate_extended(
    mut frontier: Vec<FrontierPoint>,
    removed: &mut Vec<(FrontierPoint, Dominance)>,
) -> Result<Vec<FrontierPoint>, FrontierError> {
    // Each pass removes one strategy, so a well-formed frontier finishes within its length.
    let limit = frontier.len() + 1;
    for _ in 0..limit {
        let ratios = icers(&frontier);
        match ratios.windows(2).position(|pair| pair[0] > pair[1]) {
            None => return Ok(frontier),
            Some(index) => {
                // ICER `index` joins strategies index and index + 1, ICER index + 1 joins
                // index + 1 and index + 2; the shared strategy is the one blended away.
                let point = frontier.remove(index + 1);
                log::debug!(
                    "Removing '{}' by extended dominance (ICER {:.2} > {:.2})",
                    point.label,
                    ratios[index],
                    ratios[index + 1]
                );
                removed.push((point, Dominance::Extended));
            }
        }
    }
    Err(FrontierError::NonConvergentIcerElimination(limit))
}

/// Build the efficiency frontier and choose the cost-effective strategy at `threshold`.
pub fn analyze(
    mut points: Vec<FrontierPoint>,
    threshold: f64,
) -> Result<FrontierAnalysis, FrontierError> {
    validate(&points, threshold)?;
    sort_points(&mut points);

    let (kept, mut dominated) = eliminate_dominated(points);
    for (point, dominance) in &dominated {
        if let Dominance::Simple { by } = dominance {
            log::debug!("Removing '{}' as dominated by '{by}'", point.label);
        }
    }
    let frontier = eliminate_extended(kept, &mut dominated)?;

    let ratios = icers(&frontier);
    let entries: Vec<FrontierEntry> = frontier
        .into_iter()
        .enumerate()
        .map(|(index, point)| FrontierEntry {
            icer: match index {
                0 => Icer::NotApplicable,
                _ => Icer::Ratio(ratios[index - 1]),
            },
            point,
        })
        .collect();

    let chosen = entries
        .iter()
        .rev()
        .find(|entry| match entry.icer {
            Icer::NotApplicable => true,
            Icer::Ratio(ratio) => ratio < threshold,
        })
        .ok_or(FrontierError::EmptyFrontier)?;

    Ok(FrontierAnalysis {
        selected: chosen.point.label.clone(),
        selected_icer: chosen.icer,
        frontier: entries,
        dominated,
    })
}
