use crate::expr::{LogicalExpression, LogicalVariable};
use crate::plan::NestedPlan;

/// Annotation key selecting the hash based group-by strategy.
pub const USE_HASH_GROUP_BY: &str = "USE_HASH_GROUP_BY";

/// Groups input tuples by `keys`, evaluating the nested plans once per group.
///
/// Decor variables are carried along per group without participating in grouping.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct GroupBy {
    keys: Vec<(LogicalVariable, LogicalExpression)>,
    decors: Vec<(LogicalVariable, LogicalExpression)>,
    nested_plans: Vec<NestedPlan>,
}

impl GroupBy {
    pub fn new(
        keys: Vec<(LogicalVariable, LogicalExpression)>,
        decors: Vec<(LogicalVariable, LogicalExpression)>,
        nested_plans: Vec<NestedPlan>,
    ) -> Self {
        Self {
            keys,
            decors,
            nested_plans,
        }
    }

    pub fn keys(&self) -> &[(LogicalVariable, LogicalExpression)] {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut Vec<(LogicalVariable, LogicalExpression)> {
        &mut self.keys
    }

    pub fn key_variables(&self) -> Vec<LogicalVariable> {
        self.keys.iter().map(|(v, _)| *v).collect()
    }

    pub fn decors(&self) -> &[(LogicalVariable, LogicalExpression)] {
        &self.decors
    }

    pub fn decors_mut(&mut self) -> &mut Vec<(LogicalVariable, LogicalExpression)> {
        &mut self.decors
    }

    pub fn nested_plans(&self) -> &[NestedPlan] {
        &self.nested_plans
    }

    pub fn nested_plans_mut(&mut self) -> &mut Vec<NestedPlan> {
        &mut self.nested_plans
    }

    /// Key expressions followed by decor expressions.
    pub fn expressions_mut(&mut self) -> Vec<&mut LogicalExpression> {
        self.keys
            .iter_mut()
            .chain(self.decors.iter_mut())
            .map(|(_, e)| e)
            .collect()
    }
}

/// Folds the whole input into a single tuple of aggregate results.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Aggregate {
    variables: Vec<LogicalVariable>,
    expressions: Vec<LogicalExpression>,
}

impl Aggregate {
    pub fn new(variables: Vec<LogicalVariable>, expressions: Vec<LogicalExpression>) -> Self {
        Self {
            variables,
            expressions,
        }
    }

    pub fn variables(&self) -> &[LogicalVariable] {
        &self.variables
    }

    pub fn expressions(&self) -> &[LogicalExpression] {
        &self.expressions
    }

    pub fn expressions_mut(&mut self) -> &mut Vec<LogicalExpression> {
        &mut self.expressions
    }

    pub fn retain<F: FnMut(&LogicalVariable) -> bool>(&mut self, mut keep: F) -> bool {
        let before = self.variables.len();
        let (variables, expressions): (Vec<_>, Vec<_>) = self
            .variables
            .drain(..)
            .zip(self.expressions.drain(..))
            .filter(|(v, _)| keep(v))
            .unzip();
        self.variables = variables;
        self.expressions = expressions;
        before != self.variables.len()
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Distinct {
    expressions: Vec<LogicalExpression>,
}

impl Distinct {
    pub fn new(expressions: Vec<LogicalExpression>) -> Self {
        Self { expressions }
    }

    pub fn expressions(&self) -> &[LogicalExpression] {
        &self.expressions
    }

    pub fn expressions_mut(&mut self) -> &mut Vec<LogicalExpression> {
        &mut self.expressions
    }
}

/// Evaluates its nested plans once per input tuple and appends their results.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Subplan {
    nested_plans: Vec<NestedPlan>,
}

impl Subplan {
    pub fn new(nested_plans: Vec<NestedPlan>) -> Self {
        Self { nested_plans }
    }

    pub fn nested_plans(&self) -> &[NestedPlan] {
        &self.nested_plans
    }

    pub fn nested_plans_mut(&mut self) -> &mut Vec<NestedPlan> {
        &mut self.nested_plans
    }
}
