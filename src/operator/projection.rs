use crate::expr::{LogicalExpression, LogicalVariable};

/// Binds `variables[i] := expressions[i]` on top of every input tuple.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Assign {
    variables: Vec<LogicalVariable>,
    expressions: Vec<LogicalExpression>,
}

impl Assign {
    pub fn new(variables: Vec<LogicalVariable>, expressions: Vec<LogicalExpression>) -> Self {
        debug_assert_eq!(variables.len(), expressions.len());
        Self {
            variables,
            expressions,
        }
    }

    pub fn single(variable: LogicalVariable, expression: LogicalExpression) -> Self {
        Self::new(vec![variable], vec![expression])
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

    pub fn bindings(&self) -> impl Iterator<Item = (&LogicalVariable, &LogicalExpression)> {
        self.variables.iter().zip(self.expressions.iter())
    }

    pub fn push(&mut self, variable: LogicalVariable, expression: LogicalExpression) {
        self.variables.push(variable);
        self.expressions.push(expression);
    }

    /// Removes the binding at `idx`, returning it.
    pub fn remove(&mut self, idx: usize) -> (LogicalVariable, LogicalExpression) {
        (self.variables.remove(idx), self.expressions.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Project {
    variables: Vec<LogicalVariable>,
}

impl Project {
    pub fn new(variables: Vec<LogicalVariable>) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &[LogicalVariable] {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Vec<LogicalVariable> {
        &mut self.variables
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Select {
    condition: LogicalExpression,
}

impl Select {
    pub fn new(condition: LogicalExpression) -> Self {
        Self { condition }
    }

    pub fn condition(&self) -> &LogicalExpression {
        &self.condition
    }

    pub fn condition_mut(&mut self) -> &mut LogicalExpression {
        &mut self.condition
    }
}
