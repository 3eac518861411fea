//! Mentor matching and balanced partitioning as integer linear programs.
//!
//! [`MatchingProblem`] builds many-to-one matchings of requesters to
//! providers under capacity, group and eligibility constraints, optionally
//! with a fairness share, a quality floor and a weighted objective.
//! [`PartitionProblem`] splits weighted blocks across facilities while
//! minimising the spread between the heaviest and lightest facility.
//!
//! Both build a solver-neutral [`Model`] and hand it to a [`Solver`];
//! [`CbcSolver`] runs it on COIN-OR CBC.

mod document;
mod error;
mod matching;
mod model;
mod partition;
mod solution;
mod solver;
mod types;

pub use document::{
    MatchingDocument, MatchingSection, PartitionDocument, Problem, Report, ScoreRecord,
};
pub use error::{Error, Result};
pub use matching::{FairnessParams, MatchingModel, MatchingParams, MatchingProblem};
pub use model::{
    Comparison, Domain, LinearConstraint, LinearExpr, Model, ModelBuilder, Sense, VarId,
    VariableDef,
};
pub use partition::{PartitionModel, PartitionParams, PartitionProblem};
pub use solution::{
    Assignment, AssignmentRow, FacilityLoad, MatchingResult, MinimalResult, Outcome, PairScores,
    PartitionResult,
};
pub use solver::{CbcSolver, SolveOutcome, SolvedValues, Solver};
pub use types::{Block, Facility, Group, Provider, Requester, ScoreTable};
