//! Many-to-one matching of requesters (mentees) to providers (mentors).
//!
//! Every variant declares one binary `x_{requester}_{provider}` per pair of
//! the requester × provider cross product and then folds in constraint
//! families one after another:
//!
//! * provider capacity: `1 <= Σ_i x[i, p] <= max_per_provider`
//! * single assignment: `Σ_p x[r, p] <= 1`
//! * group cap: `Σ_{i in g, p} x[i, p] <= cap(g)`
//! * eligibility: `x[r, p] <= 0` when `score(r, p)` is zero, `<= 1` otherwise
//!
//! The fair variant adds the demographic share and quality floor constraints
//! and a weighted objective.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, ensure_non_negative};
use crate::model::{Comparison, LinearExpr, Model, ModelBuilder};
use crate::solution::{
    MatchingResult, MinimalResult, Outcome, PairVariables, extract_matching, interpret,
};
use crate::solver::Solver;
use crate::types::{Group, Provider, Requester, ScoreTable, unique_ids};

/// Parameters shared by every matching variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingParams {
    /// Upper bound on requesters per provider. Must be at least 1.
    pub max_per_provider: u32,
    /// Upper bound on matched requesters per group, unless the group overrides it.
    pub per_group_cap: u32,
    pub time_limit: Duration,
}

impl Default for MatchingParams {
    fn default() -> Self {
        Self {
            max_per_provider: 1,
            per_group_cap: u32::MAX,
            time_limit: Duration::from_secs(60),
        }
    }
}

impl MatchingParams {
    pub fn new(max_per_provider: u32, per_group_cap: u32, time_limit: Duration) -> Self {
        Self {
            max_per_provider,
            per_group_cap,
            time_limit,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_per_provider == 0 {
            return Err(Error::InvalidParameter {
                name: "max_per_provider",
                reason: "must be at least 1".into(),
            });
        }
        if self.time_limit.is_zero() {
            return Err(Error::InvalidParameter {
                name: "time_limit",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Extra knobs of the fair variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FairnessParams {
    /// Imbalance tolerance: flagged requesters must make up at least
    /// `1 - epsilon` of all matches.
    pub epsilon: f64,
    /// Requesters with a reference score below this are never matched.
    pub min_ref: f64,
    pub weight_subject: f64,
    pub weight_class: f64,
    pub weight_ref: f64,
}

impl Default for FairnessParams {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            min_ref: 0.0,
            weight_subject: 1.0,
            weight_class: 1.0,
            weight_ref: 1.0,
        }
    }
}

impl FairnessParams {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(Error::InvalidParameter {
                name: "epsilon",
                reason: format!("must lie in [0, 1] (found {})", self.epsilon),
            });
        }
        ensure_non_negative("min_ref", self.min_ref)?;
        ensure_non_negative("weight_subject", self.weight_subject)?;
        ensure_non_negative("weight_class", self.weight_class)?;
        ensure_non_negative("weight_ref", self.weight_ref)
    }
}

/// Entities and scores of one matching instance.
#[derive(Debug, Clone, Default)]
pub struct MatchingProblem {
    pub requesters: Vec<Requester>,
    pub providers: Vec<Provider>,
    pub groups: Vec<Group>,
    pub scores: ScoreTable,
}

/// A built matching model together with the lookups needed to read it back.
#[derive(Debug, Clone)]
pub struct MatchingModel {
    pub model: Model,
    pairs: PairVariables,
    /// Providers left without any eligible requester.
    degenerate: Vec<String>,
}

impl MatchingModel {
    /// Providers that cannot receive anyone; the model is infeasible if non-empty.
    pub fn degenerate_providers(&self) -> &[String] {
        &self.degenerate
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

impl MatchingProblem {
    pub fn new(
        requesters: Vec<Requester>,
        providers: Vec<Provider>,
        groups: Vec<Group>,
        scores: ScoreTable,
    ) -> Self {
        Self {
            requesters,
            providers,
            groups,
            scores,
        }
    }

    /// Plain maximum-weight matching with capacities.
    pub fn solve(
        &self,
        params: &MatchingParams,
        solver: impl Solver,
    ) -> Result<Outcome<MatchingResult>> {
        let built = self.build(params)?;
        self.run(built, params, None, solver)
    }

    /// Matching with the demographic share, the quality floor and the weighted objective.
    pub fn solve_fair(
        &self,
        params: &MatchingParams,
        fairness: &FairnessParams,
        solver: impl Solver,
    ) -> Result<Outcome<MatchingResult>> {
        let built = self.build_fair(params, fairness)?;
        self.run(built, params, Some(fairness), solver)
    }

    /// Same model as [`solve`](Self::solve), returning only pair scores.
    pub fn solve_minimal(
        &self,
        params: &MatchingParams,
        solver: impl Solver,
    ) -> Result<Outcome<MinimalResult>> {
        Ok(self.solve(params, solver)?.map(MinimalResult::from))
    }

    pub fn build(&self, params: &MatchingParams) -> Result<MatchingModel> {
        params.validate()?;
        let index = self.validate()?;

        let mut builder = ModelBuilder::new("mentor_mentee_matching");
        let pairs = init_variables(&mut builder, &self.requesters, &self.providers);
        let objective = score_objective(&pairs, &self.scores);

        let builder = self.constrain_common(builder, &pairs, &index, params);
        let degenerate = self.degenerate_providers(|_| true);
        Ok(finish(builder.maximise(objective), pairs, degenerate))
    }

    pub fn build_fair(
        &self,
        params: &MatchingParams,
        fairness: &FairnessParams,
    ) -> Result<MatchingModel> {
        params.validate()?;
        fairness.validate()?;
        let index = self.validate()?;

        let mut builder = ModelBuilder::new("mentor_mentee_fair_matching");
        let pairs = init_variables(&mut builder, &self.requesters, &self.providers);
        let objective = self.fair_objective(&pairs, fairness);

        let builder = self.constrain_common(builder, &pairs, &index, params);
        let builder =
            constrain_demographic_share(builder, &self.requesters, &pairs, fairness.epsilon);
        let builder = constrain_quality_floor(builder, &self.requesters, &pairs, fairness.min_ref);

        let degenerate = self.degenerate_providers(|r| r.reference_score() >= fairness.min_ref);
        Ok(finish(builder.maximise(objective), pairs, degenerate))
    }

    fn constrain_common(
        &self,
        builder: ModelBuilder,
        pairs: &PairVariables,
        index: &GroupIndex,
        params: &MatchingParams,
    ) -> ModelBuilder {
        let builder = constrain_provider_capacity(
            builder,
            &self.requesters,
            &self.providers,
            pairs,
            params.max_per_provider,
        );
        let builder =
            constrain_single_assignment(builder, &self.requesters, &self.providers, pairs);
        let builder =
            constrain_group_caps(builder, index, &self.providers, pairs, params.per_group_cap);
        constrain_eligibility(builder, pairs, &self.scores)
    }

    fn run(
        &self,
        built: MatchingModel,
        params: &MatchingParams,
        fairness: Option<&FairnessParams>,
        solver: impl Solver,
    ) -> Result<Outcome<MatchingResult>> {
        if !built.degenerate.is_empty() {
            warn!(
                event = "degenerate_providers",
                providers = ?built.degenerate,
                "providers without eligible requesters make the model infeasible"
            );
            return Ok(Outcome::Infeasible);
        }

        let groups = self.group_members();
        let providers: Vec<&str> = self.providers.iter().map(|p| p.id.as_str()).collect();
        if built.pairs.is_empty() {
            // No providers to fill and nobody to place
            debug!("empty matching instance");
            return Ok(Outcome::Optimal(extract_matching(
                &[],
                0.0,
                &built.pairs,
                &providers,
                &groups,
                |_, _| 0.0,
                |_, _| 0.0,
            )?));
        }

        let requesters: BTreeMap<&str, &Requester> =
            self.requesters.iter().map(|r| (r.id.as_str(), r)).collect();
        let high_providers: BTreeSet<&str> = self
            .providers
            .iter()
            .filter(|p| p.high_priority)
            .map(|p| p.id.as_str())
            .collect();
        let pair_objective = |r: &str, p: &str| -> f64 {
            let score = self.scores.get(r, p);
            match fairness {
                None => score,
                Some(f) => {
                    let requester = requesters.get(r);
                    let class = requester.is_some_and(|req| req.high_priority)
                        && high_providers.contains(p);
                    let reference = requester.map_or(0.0, |req| req.reference_score());
                    f.weight_subject * score
                        + if class { f.weight_class } else { 0.0 }
                        + f.weight_ref * reference
                }
            }
        };

        let outcome = solver.solve(&built.model, params.time_limit);
        let result = interpret(&built.model, outcome, |values, objective| {
            extract_matching(
                values,
                objective,
                &built.pairs,
                &providers,
                &groups,
                |r, p| self.scores.get(r, p),
                pair_objective,
            )
        })?;

        if let Some(matching) = result.value() {
            info!(
                event = "matching_extracted",
                status = result.status(),
                matched = matching.len(),
                objective = matching.objective,
            );
        }
        Ok(result)
    }

    /// Check entity references and numeric ranges, then index group membership.
    fn validate(&self) -> Result<GroupIndex> {
        let requester_ids = unique_ids("requester", self.requesters.iter().map(|r| r.id.as_str()))?;
        let provider_ids = unique_ids("provider", self.providers.iter().map(|p| p.id.as_str()))?;
        let group_ids = unique_ids("group", self.groups.iter().map(|g| g.id.as_str()))?;

        for requester in &self.requesters {
            if let Some(group) = &requester.group {
                if !group_ids.contains(group.as_str()) {
                    return Err(Error::UnknownGroup {
                        requester: requester.id.clone(),
                        group: group.clone(),
                    });
                }
            }
            if let Some(reference) = requester.reference {
                ensure_non_negative(format!("reference score of `{}`", requester.id), reference)?;
            }
        }
        for member in self.groups.iter().flat_map(|g| &g.members) {
            if !requester_ids.contains(member.as_str()) {
                return Err(Error::UnknownRequester(member.clone()));
            }
        }
        for (requester, provider, score) in self.scores.iter() {
            if !requester_ids.contains(requester) {
                return Err(Error::UnknownRequester(requester.to_owned()));
            }
            if !provider_ids.contains(provider) {
                return Err(Error::UnknownProvider(provider.to_owned()));
            }
            ensure_non_negative(format!("score of ({requester}, {provider})"), score)?;
        }

        Ok(GroupIndex {
            members: self.group_members(),
            caps: self
                .groups
                .iter()
                .filter_map(|g| g.cap.map(|cap| (g.id.clone(), cap)))
                .collect(),
        })
    }

    /// Roster plus every requester naming the group.
    fn group_members(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut members: BTreeMap<String, BTreeSet<String>> = self
            .groups
            .iter()
            .map(|g| (g.id.clone(), g.members.iter().cloned().collect()))
            .collect();
        for requester in &self.requesters {
            if let Some(group) = &requester.group {
                members
                    .entry(group.clone())
                    .or_default()
                    .insert(requester.id.clone());
            }
        }
        members
    }

    /// Providers for which no requester passes `admissible` with a positive score.
    fn degenerate_providers(&self, admissible: impl Fn(&Requester) -> bool) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| {
                !self
                    .requesters
                    .iter()
                    .any(|r| admissible(r) && self.scores.is_eligible(&r.id, &p.id))
            })
            .map(|p| p.id.clone())
            .collect()
    }

    fn fair_objective(&self, pairs: &PairVariables, fairness: &FairnessParams) -> LinearExpr {
        let subject = score_objective(pairs, &self.scores);
        let class = class_objective(pairs, &self.requesters, &self.providers);
        let reference = reference_objective(pairs, &self.requesters);

        let mut objective = LinearExpr::new();
        objective.add_scaled(&subject, fairness.weight_subject);
        objective.add_scaled(&class, fairness.weight_class);
        objective.add_scaled(&reference, fairness.weight_ref);
        objective
    }
}

#[derive(Debug)]
struct GroupIndex {
    members: BTreeMap<String, BTreeSet<String>>,
    caps: BTreeMap<String, u32>,
}

fn finish(model: Model, pairs: PairVariables, degenerate: Vec<String>) -> MatchingModel {
    info!(
        event = "model_built",
        model = model.name(),
        variables = model.variables().len(),
        constraints = model.constraints().len(),
    );
    MatchingModel {
        model,
        pairs,
        degenerate,
    }
}

/// One binary per `(requester, provider)`, whether or not the pair is eligible.
fn init_variables(
    builder: &mut ModelBuilder,
    requesters: &[Requester],
    providers: &[Provider],
) -> PairVariables {
    let mut pairs = BTreeMap::new();
    for requester in requesters {
        for provider in providers {
            let var = builder.add_binary(format!("x_{}_{}", requester.id, provider.id));
            pairs.insert((requester.id.clone(), provider.id.clone()), var);
        }
    }
    pairs
}

fn pair_sum<'a>(
    pairs: &PairVariables,
    keys: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> LinearExpr {
    keys.into_iter()
        .filter_map(|(r, p)| pairs.get(&(r.to_owned(), p.to_owned())).copied())
        .collect()
}

fn constrain_provider_capacity(
    builder: ModelBuilder,
    requesters: &[Requester],
    providers: &[Provider],
    pairs: &PairVariables,
    max_per_provider: u32,
) -> ModelBuilder {
    providers.iter().fold(builder, |b, provider| {
        let received = pair_sum(
            pairs,
            requesters.iter().map(|r| (r.id.as_str(), provider.id.as_str())),
        );
        b.with(
            format!("min_load_{}", provider.id),
            received.clone(),
            Comparison::GreaterEq,
            1.0,
        )
        .with(
            format!("max_load_{}", provider.id),
            received,
            Comparison::LessEq,
            f64::from(max_per_provider),
        )
    })
}

fn constrain_single_assignment(
    builder: ModelBuilder,
    requesters: &[Requester],
    providers: &[Provider],
    pairs: &PairVariables,
) -> ModelBuilder {
    requesters.iter().fold(builder, |b, requester| {
        let sent = pair_sum(
            pairs,
            providers.iter().map(|p| (requester.id.as_str(), p.id.as_str())),
        );
        b.with(format!("single_{}", requester.id), sent, Comparison::LessEq, 1.0)
    })
}

fn constrain_group_caps(
    builder: ModelBuilder,
    index: &GroupIndex,
    providers: &[Provider],
    pairs: &PairVariables,
    per_group_cap: u32,
) -> ModelBuilder {
    index.members.iter().fold(builder, |b, (group, members)| {
        let cap = index.caps.get(group).copied().unwrap_or(per_group_cap);
        let admitted = pair_sum(
            pairs,
            members
                .iter()
                .flat_map(|m| providers.iter().map(move |p| (m.as_str(), p.id.as_str()))),
        );
        b.with(format!("group_cap_{group}"), admitted, Comparison::LessEq, f64::from(cap))
    })
}

/// Gate every pair on its score: zero forces the binary off, any positive
/// score (fractional ones included) leaves it free.
fn constrain_eligibility(
    builder: ModelBuilder,
    pairs: &PairVariables,
    scores: &ScoreTable,
) -> ModelBuilder {
    pairs.iter().fold(builder, |b, ((r, p), &var)| {
        let bound = if scores.is_eligible(r, p) { 1.0 } else { 0.0 };
        b.with(
            format!("eligible_{r}_{p}"),
            LinearExpr::new().with_term(var, 1.0),
            Comparison::LessEq,
            bound,
        )
    })
}

/// `Σ x·flag >= (1 - epsilon) Σ x`, written as `Σ x·(flag - (1 - epsilon)) >= 0`.
fn constrain_demographic_share(
    builder: ModelBuilder,
    requesters: &[Requester],
    pairs: &PairVariables,
    epsilon: f64,
) -> ModelBuilder {
    let share = 1.0 - epsilon;
    let flags: BTreeMap<&str, bool> = requesters
        .iter()
        .map(|r| (r.id.as_str(), r.flagged))
        .collect();
    let lhs = pairs
        .iter()
        .map(|((r, _), &var)| {
            let flagged = flags.get(r.as_str()).copied().unwrap_or(false);
            (var, if flagged { 1.0 - share } else { -share })
        })
        .collect();
    builder.with("demographic_share", lhs, Comparison::GreaterEq, 0.0)
}

/// `min_ref · x <= reference(r)` for every pair.
fn constrain_quality_floor(
    builder: ModelBuilder,
    requesters: &[Requester],
    pairs: &PairVariables,
    min_ref: f64,
) -> ModelBuilder {
    if min_ref == 0.0 {
        return builder;
    }
    let references: BTreeMap<&str, f64> = requesters
        .iter()
        .map(|r| (r.id.as_str(), r.reference_score()))
        .collect();
    pairs.iter().fold(builder, |b, ((r, p), &var)| {
        let reference = references.get(r.as_str()).copied().unwrap_or(0.0);
        b.with(
            format!("quality_{r}_{p}"),
            LinearExpr::new().with_term(var, min_ref),
            Comparison::LessEq,
            reference,
        )
    })
}

fn score_objective(pairs: &PairVariables, scores: &ScoreTable) -> LinearExpr {
    pairs
        .iter()
        .map(|((r, p), &var)| (var, scores.get(r, p)))
        .collect()
}

/// Count of matches between high-priority requesters and high-priority providers.
fn class_objective(
    pairs: &PairVariables,
    requesters: &[Requester],
    providers: &[Provider],
) -> LinearExpr {
    let high_requesters = requesters.iter().filter(|r| r.high_priority);
    let high_providers: Vec<&Provider> = providers.iter().filter(|p| p.high_priority).collect();
    pair_sum(
        pairs,
        high_requesters.flat_map(|r| {
            high_providers
                .iter()
                .map(move |p| (r.id.as_str(), p.id.as_str()))
        }),
    )
}

fn reference_objective(pairs: &PairVariables, requesters: &[Requester]) -> LinearExpr {
    let references: BTreeMap<&str, f64> = requesters
        .iter()
        .map(|r| (r.id.as_str(), r.reference_score()))
        .collect();
    pairs
        .iter()
        .map(|((r, _), &var)| (var, references.get(r.as_str()).copied().unwrap_or(0.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{CbcSolver, SolveOutcome, SolvedValues};
    use rstest::rstest;

    struct Unreachable;

    impl Solver for Unreachable {
        fn solve(&self, _model: &Model, _time_limit: Duration) -> SolveOutcome {
            panic!("solver must not be called")
        }
    }

    /// Replays a fixed assignment given by variable name.
    struct Replay {
        ones: Vec<&'static str>,
        optimal: bool,
    }

    impl Solver for Replay {
        fn solve(&self, model: &Model, _time_limit: Duration) -> SolveOutcome {
            let values: Vec<f64> = model
                .variables()
                .iter()
                .map(|v| {
                    if self.ones.iter().any(|&one| one == v.name) {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            let solved = SolvedValues {
                objective: model.objective().evaluate(&values),
                values,
            };
            if self.optimal {
                SolveOutcome::Optimal(solved)
            } else {
                SolveOutcome::BestEffort(solved)
            }
        }
    }

    fn params(max_per_provider: u32, per_group_cap: u32) -> MatchingParams {
        MatchingParams::new(max_per_provider, per_group_cap, Duration::from_secs(10))
    }

    fn scenario_one() -> MatchingProblem {
        let scores = [
            ("r1", "p1", 5.0),
            ("r1", "p2", 1.0),
            ("r2", "p1", 3.0),
            ("r2", "p2", 4.0),
            ("r3", "p1", 2.0),
            ("r3", "p2", 2.0),
        ]
        .into_iter()
        .collect();
        MatchingProblem::new(
            ["r1", "r2", "r3"].into_iter().map(Requester::new).collect(),
            ["p1", "p2"].into_iter().map(Provider::new).collect(),
            Vec::new(),
            scores,
        )
    }

    #[test]
    fn finds_maximum_weight_matching() {
        let problem = scenario_one();
        let outcome = problem.solve(&params(2, u32::MAX), CbcSolver::new()).unwrap();

        let result = match outcome {
            Outcome::Optimal(result) => result,
            other => panic!("expected optimal, got {other:?}"),
        };
        assert!((result.objective - 11.0).abs() < 1e-6);
        assert!((result.recomputed_objective - 11.0).abs() < 1e-9);
        assert_eq!(result.provider_of("r1"), Some("p1"));
        assert_eq!(result.provider_of("r2"), Some("p2"));
        assert!(result.provider_of("r3").is_some());
        assert_eq!(result.len(), 3);
        for load in result.provider_loads.values() {
            assert!((1..=2).contains(load));
        }
    }

    #[test]
    fn resolving_gives_the_same_objective() {
        let problem = scenario_one();
        let built = problem.build(&params(2, u32::MAX)).unwrap();
        let objective = |outcome: SolveOutcome| match outcome {
            SolveOutcome::Optimal(solved) => solved.objective,
            other => panic!("expected optimal, got {other:?}"),
        };
        let first = objective(CbcSolver::new().solve(&built.model, Duration::from_secs(10)));
        let second = objective(CbcSolver::new().solve(&built.model, Duration::from_secs(10)));
        assert!((first - second).abs() < 1e-6);
    }

    #[test]
    fn zero_score_requester_is_never_matched() {
        let mut problem = scenario_one();
        problem.requesters.push(Requester::new("r4"));
        problem.scores.insert("r4", "p1", 0.0).unwrap();

        let result = problem
            .solve(&params(3, u32::MAX), CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.provider_of("r4"), None);
        for row in result.rows() {
            assert!(row.score > 0.0);
        }
        assert!((result.objective - 11.0).abs() < 1e-6);
    }

    #[test]
    fn fractional_scores_stay_eligible() {
        let problem = MatchingProblem::new(
            vec![Requester::new("r1")],
            vec![Provider::new("p1")],
            Vec::new(),
            [("r1", "p1", 0.25)].into_iter().collect(),
        );
        let result = problem
            .solve(&params(1, u32::MAX), CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.provider_of("r1"), Some("p1"));
    }

    #[test]
    fn zero_group_cap_without_alternatives_is_infeasible() {
        let mut problem = scenario_one();
        problem.groups = vec![Group::new("uni").with_members(["r1", "r2", "r3"])];

        let outcome = problem.solve(&params(2, 0), CbcSolver::new()).unwrap();
        assert!(outcome.is_infeasible());
    }

    #[test]
    fn group_cap_limits_admissions() {
        let requesters = vec![
            Requester::new("a1").in_group("A"),
            Requester::new("a2").in_group("A"),
            Requester::new("a3").in_group("A"),
            Requester::new("b1").in_group("B"),
        ];
        let scores = ["a1", "a2", "a3", "b1"]
            .into_iter()
            .flat_map(|r| [(r, "p1", 10.0), (r, "p2", 10.0)])
            .collect();
        let problem = MatchingProblem::new(
            requesters,
            vec![Provider::new("p1"), Provider::new("p2")],
            vec![Group::new("A").with_cap(1), Group::new("B")],
            scores,
        );

        let result = problem
            .solve(&params(2, 5), CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.group_loads["A"], 1);
        assert_eq!(result.group_loads["B"], 1);
        assert!(result.provider_of("b1").is_some());
    }

    #[test]
    fn provider_without_eligible_requesters_is_reported_infeasible() {
        let mut problem = scenario_one();
        problem.providers.push(Provider::new("lonely"));

        let built = problem.build(&params(2, u32::MAX)).unwrap();
        assert_eq!(built.degenerate_providers(), ["lonely".to_owned()]);

        let outcome = problem.solve(&params(2, u32::MAX), Unreachable).unwrap();
        assert!(outcome.is_infeasible());
    }

    #[test]
    fn empty_instance_is_trivially_optimal() {
        let problem = MatchingProblem::default();
        let outcome = problem.solve(&params(1, 1), Unreachable).unwrap();
        let result = outcome.into_value().unwrap();
        assert!(result.is_empty());
        assert_eq!(result.objective, 0.0);
    }

    #[test]
    fn best_effort_assignments_are_tagged() {
        let problem = scenario_one();
        let solver = Replay {
            ones: vec!["x_r1_p2", "x_r2_p1"],
            optimal: false,
        };
        let outcome = problem.solve(&params(2, u32::MAX), solver).unwrap();

        let result = match outcome {
            Outcome::BestEffort(result) => result,
            other => panic!("expected best effort, got {other:?}"),
        };
        assert_eq!(result.objective, 4.0);
        assert_eq!(result.provider_of("r3"), None);
    }

    #[test]
    fn constraint_violating_solutions_are_not_returned() {
        let problem = scenario_one();
        // p2 receives nobody
        let solver = Replay {
            ones: vec!["x_r1_p1"],
            optimal: true,
        };
        let err = problem.solve(&params(2, u32::MAX), solver).unwrap_err();
        assert!(matches!(err, Error::Solver(msg) if msg.contains("min_load_p2")));
    }

    #[test]
    fn minimal_variant_returns_pair_scores() {
        let problem = scenario_one();
        let result = problem
            .solve_minimal(&params(2, u32::MAX), CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.pairs[&("r1".to_owned(), "p1".to_owned())], 5.0);
        assert_eq!(result.pairs[&("r2".to_owned(), "p2".to_owned())], 4.0);
        assert!((result.objective - 11.0).abs() < 1e-6);
    }

    fn fair_problem() -> MatchingProblem {
        let requesters = vec![
            Requester::new("f1").flagged(true).with_reference(8.0),
            Requester::new("f2").flagged(true).with_reference(2.0),
            Requester::new("m1").with_reference(9.0),
            Requester::new("m2").with_reference(7.0).high_priority(true),
        ];
        let scores = ["f1", "f2", "m1", "m2"]
            .into_iter()
            .flat_map(|r| [(r, "p1", 3.0), (r, "p2", 3.0)])
            .collect();
        MatchingProblem::new(
            requesters,
            vec![Provider::new("p1"), Provider::new("p2").high_priority(true)],
            Vec::new(),
            scores,
        )
    }

    #[test]
    fn quality_floor_excludes_low_references() {
        let fairness = FairnessParams {
            min_ref: 5.0,
            ..FairnessParams::default()
        };
        let result = fair_problem()
            .solve_fair(&params(2, u32::MAX), &fairness, CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.provider_of("f2"), None);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn zero_tolerance_admits_only_flagged_requesters() {
        let fairness = FairnessParams {
            epsilon: 0.0,
            ..FairnessParams::default()
        };
        let result = fair_problem()
            .solve_fair(&params(2, u32::MAX), &fairness, CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.provider_of("f1").is_some());
        assert!(result.provider_of("f2").is_some());
    }

    #[test]
    fn half_tolerance_keeps_flagged_share() {
        let fairness = FairnessParams {
            epsilon: 0.5,
            ..FairnessParams::default()
        };
        let result = fair_problem()
            .solve_fair(&params(2, u32::MAX), &fairness, CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        let flagged = ["f1", "f2"]
            .iter()
            .filter(|r| result.provider_of(r).is_some())
            .count();
        assert!(flagged as f64 >= 0.5 * result.len() as f64);
    }

    #[test]
    fn class_weight_pairs_high_priority_entities() {
        let fairness = FairnessParams {
            weight_subject: 1.0,
            weight_class: 100.0,
            weight_ref: 0.0,
            ..FairnessParams::default()
        };
        let result = fair_problem()
            .solve_fair(&params(1, u32::MAX), &fairness, CbcSolver::new())
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(result.provider_of("m2"), Some("p2"));
        // subject 3 + 3, class bonus 100
        assert!((result.objective - 106.0).abs() < 1e-6);
        assert!((result.recomputed_objective - 106.0).abs() < 1e-9);
    }

    #[test]
    fn quality_floor_can_leave_a_provider_degenerate() {
        let fairness = FairnessParams {
            min_ref: 100.0,
            ..FairnessParams::default()
        };
        let outcome = fair_problem()
            .solve_fair(&params(2, u32::MAX), &fairness, Unreachable)
            .unwrap();
        assert!(outcome.is_infeasible());
    }

    #[rstest]
    #[case::zero_capacity(params(0, 1), FairnessParams::default())]
    #[case::epsilon_above_one(params(1, 1), FairnessParams { epsilon: 1.5, ..FairnessParams::default() })]
    #[case::negative_weight(params(1, 1), FairnessParams { weight_ref: -1.0, ..FairnessParams::default() })]
    #[case::nan_floor(params(1, 1), FairnessParams { min_ref: f64::NAN, ..FairnessParams::default() })]
    fn rejects_invalid_parameters(
        #[case] matching: MatchingParams,
        #[case] fairness: FairnessParams,
    ) {
        let result = scenario_one().build_fair(&matching, &fairness);
        assert!(matches!(
            result,
            Err(Error::InvalidParameter { .. } | Error::NegativeValue { .. })
        ));
    }

    #[rstest]
    #[case::unknown_group(
        |p: &mut MatchingProblem| p.requesters[0].group = Some("nowhere".into()),
        "nowhere"
    )]
    #[case::unknown_roster_member(
        |p: &mut MatchingProblem| p.groups.push(Group::new("g").with_members(["ghost"])),
        "ghost"
    )]
    #[case::unknown_score_provider(
        |p: &mut MatchingProblem| p.scores = [("r1", "p9", 1.0)].into_iter().collect(),
        "p9"
    )]
    #[case::negative_score(
        |p: &mut MatchingProblem| p.scores = [("r1", "p1", -2.0)].into_iter().collect(),
        "r1"
    )]
    #[case::duplicate_requester(
        |p: &mut MatchingProblem| p.requesters.push(Requester::new("r2")),
        "r2"
    )]
    fn rejects_malformed_input(#[case] corrupt: fn(&mut MatchingProblem), #[case] needle: &str) {
        let mut problem = scenario_one();
        corrupt(&mut problem);
        let err = problem.solve(&params(2, 2), Unreachable).unwrap_err();
        assert!(err.to_string().contains(needle), "{err}");
    }
}
