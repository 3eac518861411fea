//! The boundary to the external ILP solver.

use good_lp::solvers::coin_cbc::coin_cbc;
use good_lp::solvers::{SolutionStatus, WithTimeLimit};
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as LpSolution, SolverModel,
    Variable, VariableDefinition, constraint, variable,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::model::{Comparison, Domain, LinearExpr, Model, Sense, VarId};
use crate::solution::FEASIBILITY_TOLERANCE;

/// Variable values produced by a solve, indexed by [`VarId`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedValues {
    pub values: Vec<f64>,
    /// Objective value of `values` as reported by the solver.
    pub objective: f64,
}

impl SolvedValues {
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }
}

/// What came back from one solve call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// Proven optimal.
    Optimal(SolvedValues),
    /// Feasible, but the time limit expired before optimality was proven.
    BestEffort(SolvedValues),
    Infeasible,
    Error(String),
}

impl SolveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveOutcome::Optimal(_) => "optimal",
            SolveOutcome::BestEffort(_) => "best_effort",
            SolveOutcome::Infeasible => "infeasible",
            SolveOutcome::Error(_) => "error",
        }
    }
}

/// An ILP solver. Implementations must return once `time_limit` has elapsed.
pub trait Solver {
    fn solve(&self, model: &Model, time_limit: Duration) -> SolveOutcome;
}

impl<S: Solver + ?Sized> Solver for &S {
    fn solve(&self, model: &Model, time_limit: Duration) -> SolveOutcome {
        (**self).solve(model, time_limit)
    }
}

/// COIN-OR CBC through `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CbcSolver {
    /// Let CBC print its own log.
    pub verbose: bool,
}

impl CbcSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Solver for CbcSolver {
    fn solve(&self, model: &Model, time_limit: Duration) -> SolveOutcome {
        let started = Instant::now();
        info!(
            event = "solve_start",
            model = model.name(),
            variables = model.variables().len(),
            constraints = model.constraints().len(),
            time_limit_secs = time_limit.as_secs_f64(),
        );

        let (problem_vars, lp_vars) = init_variables(model);
        let objective = to_expression(model.objective(), &lp_vars);
        let unsolved = match model.sense() {
            Sense::Maximize => problem_vars.maximise(objective),
            Sense::Minimize => problem_vars.minimise(objective),
        };

        let mut problem = unsolved
            .using(coin_cbc)
            .with_time_limit(time_limit.as_secs_f64());
        if !self.verbose {
            problem.set_parameter("loglevel", "0");
        }

        for c in model.constraints() {
            // Rows without variables never reach CBC
            if c.lhs.terms().is_empty() {
                if c.is_satisfied(&[], 1e-9) {
                    continue;
                }
                debug!(constraint = %c.name, "constant constraint is violated");
                return SolveOutcome::Infeasible;
            }
            let lhs = to_expression(&c.lhs, &lp_vars);
            let rhs = c.rhs;
            problem = match c.comparison {
                Comparison::LessEq => problem.with(constraint!(lhs <= rhs)),
                Comparison::GreaterEq => problem.with(constraint!(lhs >= rhs)),
                Comparison::Equal => problem.with(constraint!(lhs == rhs)),
            };
        }

        let outcome = match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = lp_vars.iter().map(|&v| solution.value(v)).collect();
                // CBC's objective leaves out the constant term
                let objective = solution.model().obj_value() + model.objective().constant();
                let proven = matches!(solution.status(), SolutionStatus::Optimal);
                classify(model, SolvedValues { values, objective }, proven, time_limit)
            }
            Err(ResolutionError::Infeasible) => SolveOutcome::Infeasible,
            Err(ResolutionError::Other("Stopped")) => {
                SolveOutcome::Error(no_incumbent(time_limit))
            }
            Err(e) => SolveOutcome::Error(e.to_string()),
        };

        info!(
            event = "solve_end",
            model = model.name(),
            status = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        outcome
    }
}

/// Tag the values CBC handed back. On a time-out CBC returns its column
/// values whether or not it found an incumbent, so an unproven result is kept
/// only if its rounded values satisfy the model.
fn classify(
    model: &Model,
    solved: SolvedValues,
    proven_optimal: bool,
    time_limit: Duration,
) -> SolveOutcome {
    if proven_optimal {
        return SolveOutcome::Optimal(solved);
    }
    let rounded = model.round_integral(&solved.values);
    let violated = model.violated_constraints(&rounded, FEASIBILITY_TOLERANCE);
    if violated.is_empty() {
        SolveOutcome::BestEffort(solved)
    } else {
        debug!(violated = violated.len(), "time-limited values are not feasible");
        SolveOutcome::Error(no_incumbent(time_limit))
    }
}

fn no_incumbent(time_limit: Duration) -> String {
    format!(
        "time limit of {:.1}s reached before a feasible solution was found",
        time_limit.as_secs_f64()
    )
}

/// Declare every model variable with `good_lp`, keeping the index order of [`VarId`].
fn init_variables(model: &Model) -> (ProblemVariables, Vec<Variable>) {
    let mut problem_vars = ProblemVariables::new();
    let lp_vars = model
        .variables()
        .iter()
        .map(|def| problem_vars.add(to_definition(&def.name, def.domain)))
        .collect();
    debug!(count = model.variables().len(), "declared variables");
    (problem_vars, lp_vars)
}

fn to_definition(name: &str, domain: Domain) -> VariableDefinition {
    let def = variable().name(name);
    match domain {
        Domain::Binary => def.binary(),
        Domain::Continuous { min, max: None } => def.min(min),
        Domain::Continuous {
            min,
            max: Some(max),
        } => def.min(min).max(max),
    }
}

fn to_expression(expr: &LinearExpr, lp_vars: &[Variable]) -> Expression {
    expr.terms()
        .iter()
        .fold(Expression::from(expr.constant()), |mut sum, &(var, c)| {
            sum.add_mul(c, lp_vars[var.index()]);
            sum
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    const LIMIT: Duration = Duration::from_secs(10);

    #[test]
    fn solves_small_knapsack_to_optimality() {
        // weights 3, 4, 2 with capacity 5; values 4, 5, 3
        let mut builder = ModelBuilder::new("knapsack");
        let items: Vec<_> = (0..3).map(|i| builder.add_binary(format!("x{i}"))).collect();
        let weight: LinearExpr = items.iter().copied().zip([3.0, 4.0, 2.0]).collect();
        let value: LinearExpr = items.iter().copied().zip([4.0, 5.0, 3.0]).collect();
        let model = builder
            .with("capacity", weight, Comparison::LessEq, 5.0)
            .maximise(value);

        match CbcSolver::new().solve(&model, LIMIT) {
            SolveOutcome::Optimal(solved) => {
                assert!((solved.objective - 7.0).abs() < 1e-6);
                assert!(solved.value(items[0]) > 0.5);
                assert!(solved.value(items[2]) > 0.5);
                assert!(model.violated_constraints(&solved.values, 1e-6).is_empty());
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn reports_infeasible_models() {
        let mut builder = ModelBuilder::new("contradiction");
        let x = builder.add_binary("x");
        let model = builder
            .with("at_least_two", [x].into_iter().collect(), Comparison::GreaterEq, 2.0)
            .maximise([x].into_iter().collect());

        assert_eq!(CbcSolver::new().solve(&model, LIMIT), SolveOutcome::Infeasible);
    }

    #[test]
    fn respects_continuous_bounds_when_minimising() {
        let mut builder = ModelBuilder::new("bounded");
        let y = builder.add_continuous("y", 1.5, Some(4.0));
        let model = builder.minimise([y].into_iter().collect());

        match CbcSolver::new().solve(&model, LIMIT) {
            SolveOutcome::Optimal(solved) => assert!((solved.value(y) - 1.5).abs() < 1e-6),
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn violated_constant_rows_short_circuit() {
        let mut builder = ModelBuilder::new("empty_row");
        let x = builder.add_binary("x");
        let model = builder
            .with("nobody", LinearExpr::new(), Comparison::GreaterEq, 1.0)
            .maximise([x].into_iter().collect());

        assert_eq!(CbcSolver::new().solve(&model, LIMIT), SolveOutcome::Infeasible);
    }

    #[test]
    fn time_limited_values_need_an_incumbent() {
        let mut builder = ModelBuilder::new("pick_one");
        let a = builder.add_binary("a");
        let b = builder.add_binary("b");
        let model = builder
            .with("one", [a, b].into_iter().collect(), Comparison::Equal, 1.0)
            .maximise([a].into_iter().collect());
        let values = |values: Vec<f64>| SolvedValues {
            values,
            objective: 0.0,
        };

        let feasible = classify(&model, values(vec![0.0, 1.0]), false, LIMIT);
        assert_eq!(feasible, SolveOutcome::BestEffort(values(vec![0.0, 1.0])));

        // Column values CBC reports when it stopped with nothing feasible
        match classify(&model, values(vec![0.0, 0.0]), false, LIMIT) {
            SolveOutcome::Error(msg) => assert!(msg.contains("time limit of 10.0s"), "{msg}"),
            other => panic!("expected a time limit error, got {other:?}"),
        }

        let proven = classify(&model, values(vec![1.0, 0.0]), true, LIMIT);
        assert_eq!(proven.as_str(), "optimal");
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(SolveOutcome::Infeasible.as_str(), "infeasible");
        assert_eq!(SolveOutcome::Error("boom".into()).as_str(), "error");
    }
}
