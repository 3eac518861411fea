//! Balanced multiway partitioning of weighted blocks into facilities.
//!
//! One binary `y_{block}_{facility}` per pair, plus continuous `max_load`
//! and `min_load` bounding every facility load from above and below. The
//! objective minimises `max_load - min_load`. Only the spread is bounded,
//! so a single dominant block still yields a large optimum.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result, ensure_non_negative};
use crate::model::{Comparison, LinearExpr, Model, ModelBuilder, VarId};
use crate::solution::{Outcome, PairVariables, PartitionResult, extract_partition, interpret};
use crate::solver::Solver;
use crate::types::{Block, Facility, unique_ids};

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionParams {
    pub time_limit: Duration,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartitionProblem {
    pub blocks: Vec<Block>,
    pub facilities: Vec<Facility>,
}

#[derive(Debug, Clone)]
pub struct PartitionModel {
    pub model: Model,
    pairs: PairVariables,
    max_load: VarId,
    min_load: VarId,
}

impl PartitionModel {
    pub fn max_load(&self) -> VarId {
        self.max_load
    }

    pub fn min_load(&self) -> VarId {
        self.min_load
    }
}

impl PartitionProblem {
    pub fn new(blocks: Vec<Block>, facilities: Vec<Facility>) -> Self {
        Self { blocks, facilities }
    }

    pub fn build(&self) -> Result<PartitionModel> {
        self.validate()?;

        let mut builder = ModelBuilder::new("balanced_partition");
        let pairs = init_variables(&mut builder, &self.blocks, &self.facilities);
        let max_load = builder.add_continuous("max_load", 0.0, None);
        let min_load = builder.add_continuous("min_load", 0.0, None);

        let builder = constrain_single_facility(builder, &self.blocks, &self.facilities, &pairs);
        let builder = constrain_load_band(
            builder,
            &self.blocks,
            &self.facilities,
            &pairs,
            max_load,
            min_load,
        );

        let spread = LinearExpr::new()
            .with_term(max_load, 1.0)
            .with_term(min_load, -1.0);
        let model = builder.minimise(spread);
        info!(
            event = "model_built",
            model = model.name(),
            variables = model.variables().len(),
            constraints = model.constraints().len(),
        );

        Ok(PartitionModel {
            model,
            pairs,
            max_load,
            min_load,
        })
    }

    pub fn solve(
        &self,
        params: &PartitionParams,
        solver: impl Solver,
    ) -> Result<Outcome<PartitionResult>> {
        if params.time_limit.is_zero() {
            return Err(Error::InvalidParameter {
                name: "time_limit",
                reason: "must be positive".into(),
            });
        }
        let built = self.build()?;

        let blocks: Vec<(&str, f64)> = self
            .blocks
            .iter()
            .map(|b| (b.id.as_str(), b.population))
            .collect();
        let facilities: Vec<&str> = self.facilities.iter().map(|f| f.id.as_str()).collect();

        let outcome = solver.solve(&built.model, params.time_limit);
        let result = interpret(&built.model, outcome, |values, spread| {
            extract_partition(values, spread, &built.pairs, &blocks, &facilities)
        })?;

        if let Some(partition) = result.value() {
            info!(
                event = "partition_extracted",
                status = result.status(),
                spread = partition.spread,
                max_load = partition.max_load(),
                min_load = partition.min_load(),
            );
        }
        Ok(result)
    }

    fn validate(&self) -> Result<()> {
        if self.facilities.is_empty() {
            return Err(Error::NoFacilities);
        }
        unique_ids("block", self.blocks.iter().map(|b| b.id.as_str()))?;
        unique_ids("facility", self.facilities.iter().map(|f| f.id.as_str()))?;
        for block in &self.blocks {
            ensure_non_negative(format!("population of block `{}`", block.id), block.population)?;
        }
        Ok(())
    }
}

fn init_variables(
    builder: &mut ModelBuilder,
    blocks: &[Block],
    facilities: &[Facility],
) -> PairVariables {
    let mut pairs = BTreeMap::new();
    for block in blocks {
        for facility in facilities {
            let var = builder.add_binary(format!("y_{}_{}", block.id, facility.id));
            pairs.insert((block.id.clone(), facility.id.clone()), var);
        }
    }
    pairs
}

fn constrain_single_facility(
    builder: ModelBuilder,
    blocks: &[Block],
    facilities: &[Facility],
    pairs: &PairVariables,
) -> ModelBuilder {
    blocks.iter().fold(builder, |b, block| {
        let placed = facilities
            .iter()
            .map(|f| pairs[&(block.id.clone(), f.id.clone())])
            .collect();
        b.with(format!("place_{}", block.id), placed, Comparison::Equal, 1.0)
    })
}

/// `min_load <= Σ_b population(b) · y[b, f] <= max_load` for every facility.
fn constrain_load_band(
    builder: ModelBuilder,
    blocks: &[Block],
    facilities: &[Facility],
    pairs: &PairVariables,
    max_load: VarId,
    min_load: VarId,
) -> ModelBuilder {
    facilities.iter().fold(builder, |b, facility| {
        let load: LinearExpr = blocks
            .iter()
            .map(|block| {
                (
                    pairs[&(block.id.clone(), facility.id.clone())],
                    block.population,
                )
            })
            .collect();

        let mut below_max = load.clone();
        below_max.add_term(max_load, -1.0);
        let mut above_min = load;
        above_min.add_term(min_load, -1.0);

        b.with(
            format!("max_load_{}", facility.id),
            below_max,
            Comparison::LessEq,
            0.0,
        )
        .with(
            format!("min_load_{}", facility.id),
            above_min,
            Comparison::GreaterEq,
            0.0,
        )
    })
}
