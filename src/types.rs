use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result, ensure_non_negative};

/// A mentee waiting to be matched with a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    /// Home group (e.g. university) this requester belongs to.
    #[serde(default)]
    pub group: Option<String>,
    /// Demographic flag counted by the fairness constraint.
    #[serde(default)]
    pub flagged: bool,
    /// Reference score checked against the quality floor. Absent counts as 0.
    #[serde(default)]
    pub reference: Option<f64>,
    #[serde(default, rename = "highPriority")]
    pub high_priority: bool,
}

impl Requester {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: None,
            flagged: false,
            reference: None,
            high_priority: false,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = flagged;
        self
    }

    pub fn with_reference(mut self, reference: f64) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn high_priority(mut self, high_priority: bool) -> Self {
        self.high_priority = high_priority;
        self
    }

    pub fn reference_score(&self) -> f64 {
        self.reference.unwrap_or(0.0)
    }
}

/// A mentor that admits between 1 and `max_per_provider` requesters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default, rename = "highPriority")]
    pub high_priority: bool,
}

impl Provider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            high_priority: false,
        }
    }

    pub fn high_priority(mut self, high_priority: bool) -> Self {
        self.high_priority = high_priority;
        self
    }
}

/// A set of requesters whose admissions are capped together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub members: Vec<String>,
    /// Overrides the global `per_group_cap` for this group.
    #[serde(default)]
    pub cap: Option<u32>,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            cap: None,
        }
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap = Some(cap);
        self
    }
}

/// A weighted item to be placed in exactly one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub population: f64,
}

impl Block {
    pub fn new(id: impl Into<String>, population: f64) -> Self {
        Self {
            id: id.into(),
            population,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
}

impl Facility {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Sparse compatibility scores keyed by `(requester, provider)`.
///
/// A pair that is absent reads as `0.0`, and a zero score means the pair is
/// ineligible: the assignment builders force its decision variable to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    scores: BTreeMap<(String, String), f64>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the score of a pair. Negative or non-finite scores are rejected.
    pub fn insert(
        &mut self,
        requester: impl Into<String>,
        provider: impl Into<String>,
        score: f64,
    ) -> Result<()> {
        let key = (requester.into(), provider.into());
        ensure_non_negative(format!("score of ({}, {})", key.0, key.1), score)?;
        self.scores.insert(key, score);
        Ok(())
    }

    pub fn get(&self, requester: &str, provider: &str) -> f64 {
        // BTreeMap<(String, String), _> cannot be queried with borrowed halves
        self.scores
            .get(&(requester.to_owned(), provider.to_owned()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_eligible(&self, requester: &str, provider: &str) -> bool {
        self.get(requester, provider) > 0.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.scores
            .iter()
            .map(|((r, p), &score)| (r.as_str(), p.as_str(), score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl<R, P> FromIterator<(R, P, f64)> for ScoreTable
where
    R: Into<String>,
    P: Into<String>,
{
    /// Collects without validation; builders re-check every score before use.
    fn from_iter<I: IntoIterator<Item = (R, P, f64)>>(iter: I) -> Self {
        Self {
            scores: iter
                .into_iter()
                .map(|(r, p, score)| ((r.into(), p.into()), score))
                .collect(),
        }
    }
}

/// Collect ids into a set, failing on the first duplicate.
pub(crate) fn unique_ids<'a>(
    kind: &'static str,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<BTreeSet<&'a str>> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::DuplicateId {
                kind,
                id: id.to_owned(),
            });
        }
    }
    Ok(seen)
}
