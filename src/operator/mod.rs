//! Logical operators.
//!
//! [`LogicalOperator`] is a closed enum: every traversal over operator kinds is an exhaustive
//! `match`, so adding a kind is a compile error at every place that must handle it.

use enum_as_inner::EnumAsInner;
use enumset::EnumSetType;
use serde::Serialize;
use strum_macros::Display;

use crate::constraint::push_unique;
use crate::error::{OptError, OptResult};
use crate::expr::{LogicalExpression, LogicalVariable};
use crate::plan::{NestedPlan, OperatorId};

mod group_by;
pub use group_by::*;
mod join;
pub use join::*;
mod limit;
pub use limit::*;
mod projection;
pub use projection::*;
mod source;
pub use source::*;

#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum LogicalOperator {
    EmptyTupleSource,
    NestedTupleSource(NestedTupleSource),
    DataSourceScan(DataSourceScan),
    Assign(Assign),
    Select(Select),
    Project(Project),
    Join(Join),
    GroupBy(GroupBy),
    Aggregate(Aggregate),
    Distinct(Distinct),
    Order(Order),
    Limit(Limit),
    /// Data movement between partitions. The strategy is its physical operator.
    Exchange,
    Subplan(Subplan),
    DistributeResult(DistributeResult),
}

#[derive(EnumSetType, Debug, Hash, Display)]
pub enum LogicalOperatorTag {
    EmptyTupleSource,
    NestedTupleSource,
    DataSourceScan,
    Assign,
    Select,
    Project,
    InnerJoin,
    LeftOuterJoin,
    GroupBy,
    Aggregate,
    Distinct,
    Order,
    Limit,
    Exchange,
    Subplan,
    DistributeResult,
}

/// Where an operator runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, Serialize)]
pub enum ExecutionMode {
    /// Not decided yet.
    #[default]
    Unassigned,
    /// On every location of the cluster domain.
    Partitioned,
    /// On exactly one location.
    Unpartitioned,
    /// Inside its parent (nested plans).
    Local,
}

/// How an operator's output schema derives from its inputs' schemas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariablePropagationPolicy {
    /// Concatenation of every input schema.
    AllInputs,
    /// Every input schema followed by the given variables.
    AddVars(Vec<LogicalVariable>),
    /// Exactly the given variables, all of which must come from the inputs.
    Restrict(Vec<LogicalVariable>),
    /// Exactly the given variables, produced by the operator itself.
    Produce(Vec<LogicalVariable>),
    /// The schema of the input of the operator owning the enclosing nested plan.
    OuterInput,
}

impl VariablePropagationPolicy {
    pub fn compute_schema(
        &self,
        op: OperatorId,
        inputs: &[&[LogicalVariable]],
        outer: Option<&[LogicalVariable]>,
    ) -> OptResult<Vec<LogicalVariable>> {
        let concat = || inputs.iter().flat_map(|s| s.iter().copied()).collect::<Vec<_>>();
        match self {
            Self::AllInputs => Ok(concat()),
            Self::AddVars(vars) => {
                let mut schema = concat();
                schema.extend(vars.iter().copied());
                Ok(schema)
            }
            Self::Restrict(vars) => {
                let available = concat();
                for v in vars {
                    if !available.contains(v) {
                        return Err(OptError::VariableOutOfScope {
                            operator: op,
                            variable: *v,
                        }
                        .into());
                    }
                }
                Ok(vars.clone())
            }
            Self::Produce(vars) => Ok(vars.clone()),
            Self::OuterInput => outer.map(|s| s.to_vec()).ok_or_else(|| {
                OptError::malformed_operator(op, "nested tuple source outside a nested plan")
                    .into()
            }),
        }
    }
}

impl LogicalOperator {
    pub fn tag(&self) -> LogicalOperatorTag {
        match self {
            Self::EmptyTupleSource => LogicalOperatorTag::EmptyTupleSource,
            Self::NestedTupleSource(_) => LogicalOperatorTag::NestedTupleSource,
            Self::DataSourceScan(_) => LogicalOperatorTag::DataSourceScan,
            Self::Assign(_) => LogicalOperatorTag::Assign,
            Self::Select(_) => LogicalOperatorTag::Select,
            Self::Project(_) => LogicalOperatorTag::Project,
            Self::Join(join) => match join.kind() {
                JoinKind::Inner => LogicalOperatorTag::InnerJoin,
                JoinKind::LeftOuter => LogicalOperatorTag::LeftOuterJoin,
            },
            Self::GroupBy(_) => LogicalOperatorTag::GroupBy,
            Self::Aggregate(_) => LogicalOperatorTag::Aggregate,
            Self::Distinct(_) => LogicalOperatorTag::Distinct,
            Self::Order(_) => LogicalOperatorTag::Order,
            Self::Limit(_) => LogicalOperatorTag::Limit,
            Self::Exchange => LogicalOperatorTag::Exchange,
            Self::Subplan(_) => LogicalOperatorTag::Subplan,
            Self::DistributeResult(_) => LogicalOperatorTag::DistributeResult,
        }
    }

    /// Number of input slots the operator kind takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::EmptyTupleSource | Self::NestedTupleSource(_) | Self::DataSourceScan(_) => 0,
            Self::Join(_) => 2,
            _ => 1,
        }
    }

    pub fn nested_plans(&self) -> &[NestedPlan] {
        match self {
            Self::GroupBy(g) => g.nested_plans(),
            Self::Subplan(s) => s.nested_plans(),
            _ => &[],
        }
    }

    /// Variables this operator binds itself. Nested plan results are not included.
    pub fn produced_variables(&self) -> Vec<LogicalVariable> {
        match self {
            Self::DataSourceScan(scan) => scan.output_variables().to_vec(),
            Self::Assign(assign) => assign.variables().to_vec(),
            Self::GroupBy(g) => g
                .keys()
                .iter()
                .chain(g.decors().iter())
                .map(|(v, _)| *v)
                .collect(),
            Self::Aggregate(agg) => agg.variables().to_vec(),
            _ => vec![],
        }
    }

    /// Propagation policy given the variables produced at the roots of the nested plans.
    pub fn propagation_policy(
        &self,
        nested_produced: Vec<LogicalVariable>,
    ) -> VariablePropagationPolicy {
        use VariablePropagationPolicy::*;
        match self {
            Self::EmptyTupleSource => Produce(vec![]),
            Self::NestedTupleSource(_) => OuterInput,
            Self::DataSourceScan(scan) => Produce(scan.output_variables().to_vec()),
            Self::Assign(assign) => AddVars(assign.variables().to_vec()),
            Self::Project(project) => Restrict(project.variables().to_vec()),
            Self::GroupBy(_) => {
                let mut produced = self.produced_variables();
                produced.extend(nested_produced);
                Produce(produced)
            }
            Self::Aggregate(agg) => Produce(agg.variables().to_vec()),
            Self::Subplan(_) => AddVars(nested_produced),
            Self::Distinct(d) => Restrict(
                d.expressions()
                    .iter()
                    .filter_map(|e| e.as_variable().copied())
                    .collect(),
            ),
            Self::Select(_)
            | Self::Join(_)
            | Self::Order(_)
            | Self::Limit(_)
            | Self::Exchange
            | Self::DistributeResult(_) => AllInputs,
        }
    }

    /// The expression slots of this operator, in a stable order.
    pub fn expressions(&self) -> Vec<&LogicalExpression> {
        match self {
            Self::Assign(a) => a.expressions().iter().collect(),
            Self::Select(s) => vec![s.condition()],
            Self::Join(j) => vec![j.condition()],
            Self::GroupBy(g) => g
                .keys()
                .iter()
                .chain(g.decors().iter())
                .map(|(_, e)| e)
                .collect(),
            Self::Aggregate(a) => a.expressions().iter().collect(),
            Self::Distinct(d) => d.expressions().iter().collect(),
            Self::Order(o) => o.columns().iter().map(|(_, e)| e).collect(),
            Self::DistributeResult(r) => r.expressions().iter().collect(),
            Self::EmptyTupleSource
            | Self::NestedTupleSource(_)
            | Self::DataSourceScan(_)
            | Self::Project(_)
            | Self::Limit(_)
            | Self::Exchange
            | Self::Subplan(_) => vec![],
        }
    }

    pub fn expressions_mut(&mut self) -> Vec<&mut LogicalExpression> {
        match self {
            Self::Assign(a) => a.expressions_mut().iter_mut().collect(),
            Self::Select(s) => vec![s.condition_mut()],
            Self::Join(j) => vec![j.condition_mut()],
            Self::GroupBy(g) => g.expressions_mut(),
            Self::Aggregate(a) => a.expressions_mut().iter_mut().collect(),
            Self::Distinct(d) => d.expressions_mut().iter_mut().collect(),
            Self::Order(o) => o.columns_mut().iter_mut().map(|(_, e)| e).collect(),
            Self::DistributeResult(r) => r.expressions_mut().iter_mut().collect(),
            Self::EmptyTupleSource
            | Self::NestedTupleSource(_)
            | Self::DataSourceScan(_)
            | Self::Project(_)
            | Self::Limit(_)
            | Self::Exchange
            | Self::Subplan(_) => vec![],
        }
    }

    /// Variables read by this operator (its expressions and projection list).
    pub fn used_variables(&self) -> Vec<LogicalVariable> {
        let mut used = vec![];
        for e in self.expressions() {
            e.used_variables(&mut used);
        }
        if let Self::Project(p) = self {
            for v in p.variables() {
                push_unique(&mut used, *v);
            }
        }
        used
    }

    /// Renames a used variable everywhere in this operator.
    pub fn substitute_var(&mut self, old: LogicalVariable, new: LogicalVariable) -> bool {
        let mut changed = false;
        for e in self.expressions_mut() {
            changed |= e.substitute_var(old, new);
        }
        if let Self::Project(p) = self {
            for v in p.variables_mut() {
                if *v == old {
                    *v = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Whether the operator may be evaluated tuple at a time without changing results.
    pub fn is_tuple_at_a_time(&self) -> bool {
        matches!(self, Self::Assign(_) | Self::Select(_) | Self::Project(_))
    }
}
