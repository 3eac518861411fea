//! YAML problem documents and the report printed for them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::matching::{FairnessParams, MatchingParams, MatchingProblem};
use crate::partition::{PartitionParams, PartitionProblem};
use crate::solution::{MatchingResult, Outcome, PartitionResult};
use crate::solver::{CbcSolver, Solver};
use crate::types::{Block, Facility, Group, Provider, Requester, ScoreTable};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    Matching(MatchingDocument),
    FairMatching(MatchingDocument),
    Partition(PartitionDocument),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchingDocument {
    pub requesters: Vec<Requester>,
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,
    #[serde(default)]
    pub params: MatchingSection,
    #[serde(default)]
    pub fairness: Option<FairnessParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub requester: String,
    pub provider: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingSection {
    #[serde(default = "default_max_per_provider")]
    pub max_per_provider: u32,
    /// Unbounded when absent.
    #[serde(default)]
    pub per_group_cap: Option<u32>,
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: f64,
}
fn default_max_per_provider() -> u32 {
    1
}
fn default_time_limit() -> f64 {
    60.0
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            max_per_provider: default_max_per_provider(),
            per_group_cap: None,
            time_limit_secs: default_time_limit(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionDocument {
    pub blocks: Vec<Block>,
    pub facilities: Vec<Facility>,
    #[serde(default = "default_time_limit", rename = "timeLimitSecs")]
    pub time_limit_secs: f64,
}

/// What the CLI prints.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub status: String,
    /// Absent when infeasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<f64>,
    /// Provider → requester → score.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assignments: BTreeMap<String, BTreeMap<String, f64>>,
    /// Facility → load.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loads: BTreeMap<String, f64>,
    /// Block → facility.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub placement: BTreeMap<String, String>,
}

impl Report {
    fn infeasible() -> Self {
        Report {
            status: "infeasible".into(),
            objective: None,
            assignments: BTreeMap::new(),
            loads: BTreeMap::new(),
            placement: BTreeMap::new(),
        }
    }

    fn from_matching(outcome: Outcome<MatchingResult>) -> Self {
        let status = outcome.status().to_owned();
        let Some(result) = outcome.into_value() else {
            return Report::infeasible();
        };
        let mut assignments: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for row in result.rows() {
            assignments
                .entry(row.provider)
                .or_default()
                .insert(row.requester, row.score);
        }
        Report {
            status,
            objective: Some(result.recomputed_objective),
            assignments,
            loads: BTreeMap::new(),
            placement: BTreeMap::new(),
        }
    }

    fn from_partition(outcome: Outcome<PartitionResult>) -> Self {
        let status = outcome.status().to_owned();
        let Some(result) = outcome.into_value() else {
            return Report::infeasible();
        };
        Report {
            status,
            objective: Some(result.realised_spread()),
            assignments: BTreeMap::new(),
            loads: result
                .loads
                .iter()
                .map(|l| (l.facility.clone(), l.load))
                .collect(),
            placement: result.assignment,
        }
    }
}

impl Problem {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&read_to_string(path)?)
    }

    pub fn solve(&self) -> Result<Report> {
        self.solve_with(CbcSolver::new())
    }

    pub fn solve_with(&self, solver: impl Solver) -> Result<Report> {
        match self {
            Problem::Matching(doc) => {
                if doc.fairness.is_some() {
                    return Err(Error::InvalidParameter {
                        name: "fairness",
                        reason: "only applies to `kind: fair_matching`".into(),
                    });
                }
                let outcome = doc.problem()?.solve(&doc.params()?, solver)?;
                Ok(Report::from_matching(outcome))
            }
            Problem::FairMatching(doc) => {
                let fairness = doc.fairness.clone().unwrap_or_default();
                let outcome = doc.problem()?.solve_fair(&doc.params()?, &fairness, solver)?;
                Ok(Report::from_matching(outcome))
            }
            Problem::Partition(doc) => {
                let problem = PartitionProblem::new(doc.blocks.clone(), doc.facilities.clone());
                let params = PartitionParams {
                    time_limit: time_limit(doc.time_limit_secs)?,
                };
                Ok(Report::from_partition(problem.solve(&params, solver)?))
            }
        }
    }
}

impl MatchingDocument {
    fn problem(&self) -> Result<MatchingProblem> {
        let mut scores = ScoreTable::new();
        for record in &self.scores {
            scores.insert(&record.requester, &record.provider, record.score)?;
        }
        Ok(MatchingProblem::new(
            self.requesters.clone(),
            self.providers.clone(),
            self.groups.clone(),
            scores,
        ))
    }

    fn params(&self) -> Result<MatchingParams> {
        Ok(MatchingParams::new(
            self.params.max_per_provider,
            self.params.per_group_cap.unwrap_or(u32::MAX),
            time_limit(self.params.time_limit_secs)?,
        ))
    }
}

fn time_limit(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| Error::InvalidParameter {
            name: "timeLimitSecs",
            reason: format!("must be a positive number of seconds (found {secs})"),
        })
}
