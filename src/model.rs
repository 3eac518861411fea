//! Solver-neutral description of an integer linear program.
//!
//! Builders accumulate variables and constraints in a [`ModelBuilder`] and
//! finish it into an immutable [`Model`] once the objective is known, so a
//! half-built model never reaches a [`Solver`](crate::Solver).

/// Handle to a decision variable, valid only for the model that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    Binary,
    Continuous { min: f64, max: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub domain: Domain,
}

/// `Σ coefficient × variable + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient != 0.0 {
            self.terms.push((var, coefficient));
        }
    }

    pub fn with_term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Append `factor × other`.
    pub fn add_scaled(&mut self, other: &LinearExpr, factor: f64) {
        for &(var, coefficient) in &other.terms {
            self.add_term(var, coefficient * factor);
        }
        self.constant += other.constant * factor;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Evaluate against a value vector indexed by [`VarId::index`].
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, c)| c * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(LinearExpr::new(), |expr, (var, c)| expr.with_term(var, c))
    }
}

impl FromIterator<VarId> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = VarId>>(iter: I) -> Self {
        iter.into_iter().map(|var| (var, 1.0)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    LessEq,
    GreaterEq,
    Equal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub lhs: LinearExpr,
    pub comparison: Comparison,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs.evaluate(values);
        match self.comparison {
            Comparison::LessEq => lhs <= self.rhs + tolerance,
            Comparison::GreaterEq => lhs >= self.rhs - tolerance,
            Comparison::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }

    /// `tolerance` grown by the row's total coefficient magnitude, so a
    /// heavily weighted row absorbs the rounding of its integral terms.
    pub fn scaled_tolerance(&self, tolerance: f64) -> f64 {
        let magnitude: f64 = self.lhs.terms().iter().map(|&(_, c)| c.abs()).sum();
        tolerance * (1.0 + magnitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

/// A finished model: variables, constraints and one objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
    sense: Sense,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Check a candidate value vector against every constraint. Each row is
    /// checked with [`LinearConstraint::scaled_tolerance`].
    pub fn violated_constraints(&self, values: &[f64], tolerance: f64) -> Vec<&str> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(values, c.scaled_tolerance(tolerance)))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Round binary variables to the nearest integer, leaving continuous ones alone.
    pub fn round_integral(&self, values: &[f64]) -> Vec<f64> {
        self.variables
            .iter()
            .zip(values)
            .map(|(def, &v)| match def.domain {
                Domain::Binary => v.round(),
                Domain::Continuous { .. } => v,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    name: String,
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name.into(), Domain::Binary)
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, min: f64, max: Option<f64>) -> VarId {
        self.add_variable(name.into(), Domain::Continuous { min, max })
    }

    fn add_variable(&mut self, name: String, domain: Domain) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(VariableDef { name, domain });
        id
    }

    /// Add `lhs <cmp> rhs`. Consumes and returns the builder so constraint
    /// families can be folded in one after another.
    pub fn with(
        mut self,
        name: impl Into<String>,
        lhs: LinearExpr,
        comparison: Comparison,
        rhs: f64,
    ) -> Self {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            lhs,
            comparison,
            rhs,
        });
        self
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn maximise(self, objective: LinearExpr) -> Model {
        self.finish(objective, Sense::Maximize)
    }

    pub fn minimise(self, objective: LinearExpr) -> Model {
        self.finish(objective, Sense::Minimize)
    }

    fn finish(self, objective: LinearExpr, sense: Sense) -> Model {
        Model {
            name: self.name,
            variables: self.variables,
            constraints: self.constraints,
            objective,
            sense,
        }
    }
}
