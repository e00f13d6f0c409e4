use crate::expr::{LogicalExpression, LogicalVariable};
use crate::plan::OperatorId;

/// Scan of an external data source, binding one variable per field.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DataSourceScan {
    source: String,
    variables: Vec<LogicalVariable>,
    primary_keys: Vec<LogicalVariable>,
    projection: Option<Vec<LogicalVariable>>,
}

impl DataSourceScan {
    pub fn new<S: Into<String>>(source: S, variables: Vec<LogicalVariable>) -> Self {
        Self {
            source: source.into(),
            variables,
            primary_keys: vec![],
            projection: None,
        }
    }

    /// A source hash-partitioned on its primary key fields.
    pub fn with_primary_keys<S: Into<String>>(
        source: S,
        variables: Vec<LogicalVariable>,
        primary_keys: Vec<LogicalVariable>,
    ) -> Self {
        Self {
            primary_keys,
            ..Self::new(source, variables)
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// All variables the source binds, in field order.
    pub fn variables(&self) -> &[LogicalVariable] {
        &self.variables
    }

    pub fn primary_keys(&self) -> &[LogicalVariable] {
        &self.primary_keys
    }

    pub fn projection(&self) -> Option<&[LogicalVariable]> {
        self.projection.as_deref()
    }

    pub fn set_projection(&mut self, projection: Vec<LogicalVariable>) {
        self.projection = Some(projection);
    }

    /// Variables the scan actually produces.
    pub fn output_variables(&self) -> &[LogicalVariable] {
        self.projection().unwrap_or(&self.variables)
    }
}

/// Leaf of a nested plan. Produces, per outer tuple, the input tuple of the operator owning
/// the nested plan.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct NestedTupleSource {
    outer: OperatorId,
}

impl NestedTupleSource {
    pub fn new(outer: OperatorId) -> Self {
        Self { outer }
    }

    pub fn outer(&self) -> OperatorId {
        self.outer
    }
}

/// Root of a query: hands every input tuple to the result printer.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DistributeResult {
    expressions: Vec<LogicalExpression>,
}

impl DistributeResult {
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
