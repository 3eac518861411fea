//! Turning solved variable values back into domain results.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{Model, VarId};
use crate::solver::{SolveOutcome, SolvedValues};

/// Slack per unit of coefficient magnitude when re-checking rounded values.
pub(crate) const FEASIBILITY_TOLERANCE: f64 = 1e-5;

/// Relative gap above which the recomputed objective is reported as a mismatch.
const OBJECTIVE_TOLERANCE: f64 = 1e-6;

/// Result of a solve call. Solver failures are errors, not outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Outcome<T> {
    Optimal(T),
    /// Feasible but not proven optimal: the time limit expired first.
    BestEffort(T),
    Infeasible,
}

impl<T> Outcome<T> {
    pub fn is_optimal(&self) -> bool {
        matches!(self, Outcome::Optimal(_))
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, Outcome::Infeasible)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Optimal(v) | Outcome::BestEffort(v) => Some(v),
            Outcome::Infeasible => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Optimal(v) | Outcome::BestEffort(v) => Some(v),
            Outcome::Infeasible => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Optimal(v) => Outcome::Optimal(f(v)),
            Outcome::BestEffort(v) => Outcome::BestEffort(f(v)),
            Outcome::Infeasible => Outcome::Infeasible,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Optimal(_) => "optimal",
            Outcome::BestEffort(_) => "best_effort",
            Outcome::Infeasible => "infeasible",
        }
    }
}

/// The provider a requester was matched to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub provider: String,
    pub score: f64,
}

/// One row of the tabular view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRow {
    pub provider: String,
    pub requester: String,
    pub score: f64,
}

/// Compatibility score of every matched `(requester, provider)` pair.
pub type PairScores = BTreeMap<(String, String), f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchingResult {
    /// Objective value reported by the solver.
    pub objective: f64,
    /// Objective recomputed from `assignments`.
    pub recomputed_objective: f64,
    /// Requester id to its provider.
    pub assignments: BTreeMap<String, Assignment>,
    /// Matched requesters per provider, including providers with none.
    pub provider_loads: BTreeMap<String, usize>,
    /// Matched requesters per group.
    pub group_loads: BTreeMap<String, usize>,
}

impl MatchingResult {
    /// Rows ordered by provider, then requester.
    pub fn rows(&self) -> Vec<AssignmentRow> {
        let mut rows: Vec<AssignmentRow> = self
            .assignments
            .iter()
            .map(|(requester, a)| AssignmentRow {
                provider: a.provider.clone(),
                requester: requester.clone(),
                score: a.score,
            })
            .collect();
        rows.sort_by(|a, b| {
            (a.provider.as_str(), a.requester.as_str())
                .cmp(&(b.provider.as_str(), b.requester.as_str()))
        });
        rows
    }

    pub fn pair_scores(&self) -> PairScores {
        self.assignments
            .iter()
            .map(|(requester, a)| ((requester.clone(), a.provider.clone()), a.score))
            .collect()
    }

    pub fn provider_of(&self, requester: &str) -> Option<&str> {
        self.assignments.get(requester).map(|a| a.provider.as_str())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// The flat view returned by the minimal matching variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalResult {
    pub objective: f64,
    pub pairs: PairScores,
}

impl From<MatchingResult> for MinimalResult {
    fn from(result: MatchingResult) -> Self {
        MinimalResult {
            pairs: result.pair_scores(),
            objective: result.objective,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityLoad {
    pub facility: String,
    pub load: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionResult {
    /// `max_load - min_load` as reported by the solver.
    pub spread: f64,
    /// Realised load of every facility, in input order.
    pub loads: Vec<FacilityLoad>,
    /// Block id to facility id.
    pub assignment: BTreeMap<String, String>,
}

impl PartitionResult {
    pub fn max_load(&self) -> f64 {
        self.loads.iter().map(|l| l.load).fold(0.0, f64::max)
    }

    pub fn min_load(&self) -> f64 {
        self.loads
            .iter()
            .map(|l| l.load)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Spread recomputed from the realised loads.
    pub fn realised_spread(&self) -> f64 {
        self.max_load() - self.min_load()
    }

    pub fn total_load(&self) -> f64 {
        self.loads.iter().map(|l| l.load).sum()
    }

    pub fn facility_of(&self, block: &str) -> Option<&str> {
        self.assignment.get(block).map(String::as_str)
    }
}

/// Variables keyed by `(row id, column id)`, e.g. `(requester, provider)`.
pub(crate) type PairVariables = BTreeMap<(String, String), VarId>;

/// Map a solver outcome onto an [`Outcome`], extracting a domain result from
/// feasible values.
///
/// Binary variables are rounded to the nearest integer and the rounded vector
/// is checked against every constraint of `model`; a solution that no longer
/// satisfies the model is reported as a solver error instead of being returned.
pub(crate) fn interpret<T>(
    model: &Model,
    outcome: SolveOutcome,
    extract: impl FnOnce(&[f64], f64) -> Result<T>,
) -> Result<Outcome<T>> {
    match outcome {
        SolveOutcome::Optimal(solved) => {
            let values = checked_values(model, &solved)?;
            Ok(Outcome::Optimal(extract(&values, solved.objective)?))
        }
        SolveOutcome::BestEffort(solved) => {
            warn!(
                event = "best_effort",
                model = model.name(),
                objective = solved.objective,
                "time limit expired before optimality was proven"
            );
            let values = checked_values(model, &solved)?;
            Ok(Outcome::BestEffort(extract(&values, solved.objective)?))
        }
        SolveOutcome::Infeasible => Ok(Outcome::Infeasible),
        SolveOutcome::Error(msg) => Err(Error::Solver(msg)),
    }
}

fn checked_values(model: &Model, solved: &SolvedValues) -> Result<Vec<f64>> {
    if solved.values.len() != model.variables().len() {
        return Err(Error::Solver(format!(
            "expected {} variable values, got {}",
            model.variables().len(),
            solved.values.len()
        )));
    }
    let values = model.round_integral(&solved.values);
    let violated = model.violated_constraints(&values, FEASIBILITY_TOLERANCE);
    if !violated.is_empty() {
        return Err(Error::Solver(format!(
            "solution violates {} constraint(s), first: {}",
            violated.len(),
            violated[0]
        )));
    }
    Ok(values)
}

pub(crate) fn is_set(values: &[f64], var: VarId) -> bool {
    values.get(var.index()).is_some_and(|&v| v >= 0.5)
}

/// Build the matching result from rounded values.
///
/// `pair_score` returns the compatibility score shown in the table and
/// `pair_objective` the contribution of a pair to the objective.
pub(crate) fn extract_matching(
    values: &[f64],
    reported_objective: f64,
    pairs: &PairVariables,
    providers: &[&str],
    groups: &BTreeMap<String, BTreeSet<String>>,
    pair_score: impl Fn(&str, &str) -> f64,
    pair_objective: impl Fn(&str, &str) -> f64,
) -> Result<MatchingResult> {
    let mut assignments = BTreeMap::new();
    let mut provider_loads: BTreeMap<String, usize> =
        providers.iter().map(|&p| (p.to_owned(), 0)).collect();

    for ((requester, provider), &var) in pairs {
        if !is_set(values, var) {
            continue;
        }
        let assignment = Assignment {
            provider: provider.clone(),
            score: pair_score(requester.as_str(), provider.as_str()),
        };
        if let Some(previous) = assignments.insert(requester.clone(), assignment) {
            return Err(Error::Solver(format!(
                "requester `{requester}` matched to both `{}` and `{provider}`",
                previous.provider
            )));
        }
        *provider_loads.entry(provider.clone()).or_insert(0) += 1;
    }

    let group_loads = groups
        .iter()
        .map(|(group, members)| {
            let load = members
                .iter()
                .filter(|m| assignments.contains_key(m.as_str()))
                .count();
            (group.clone(), load)
        })
        .collect();

    let recomputed_objective = assignments
        .iter()
        .map(|(requester, a)| pair_objective(requester.as_str(), a.provider.as_str()))
        .sum();
    cross_check("matching", reported_objective, recomputed_objective);

    Ok(MatchingResult {
        objective: reported_objective,
        recomputed_objective,
        assignments,
        provider_loads,
        group_loads,
    })
}

/// Build the partition result from rounded values.
pub(crate) fn extract_partition(
    values: &[f64],
    reported_spread: f64,
    pairs: &PairVariables,
    blocks: &[(&str, f64)],
    facilities: &[&str],
) -> Result<PartitionResult> {
    let mut assignment = BTreeMap::new();
    let mut loads: BTreeMap<&str, f64> = facilities.iter().map(|&f| (f, 0.0)).collect();

    for &(block, population) in blocks {
        let mut chosen = facilities.iter().filter(|&&facility| {
            pairs
                .get(&(block.to_owned(), facility.to_owned()))
                .is_some_and(|&var| is_set(values, var))
        });
        let (Some(&facility), None) = (chosen.next(), chosen.next()) else {
            return Err(Error::Solver(format!(
                "block `{block}` is not placed in exactly one facility"
            )));
        };
        assignment.insert(block.to_owned(), facility.to_owned());
        *loads.entry(facility).or_insert(0.0) += population;
    }

    let result = PartitionResult {
        spread: reported_spread,
        loads: facilities
            .iter()
            .map(|&f| FacilityLoad {
                facility: f.to_owned(),
                load: loads.get(f).copied().unwrap_or(0.0),
            })
            .collect(),
        assignment,
    };

    let expected_total: f64 = blocks.iter().map(|&(_, w)| w).sum();
    if !approx_eq(result.total_load(), expected_total) {
        return Err(Error::Solver(format!(
            "facility loads sum to {} but blocks weigh {expected_total}",
            result.total_load()
        )));
    }
    cross_check("partition", reported_spread, result.realised_spread());
    Ok(result)
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= OBJECTIVE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn cross_check(model: &str, reported: f64, recomputed: f64) {
    if !approx_eq(reported, recomputed) {
        warn!(
            event = "objective_mismatch",
            model,
            reported,
            recomputed,
            "objective recomputed from the extracted solution differs from the solver's"
        );
    }
}
