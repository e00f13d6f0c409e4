use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::jobgen::{JobGenContext, OperatorDescriptor, RuntimeContribution};
use crate::operator::{GroupBy, LogicalOperator};
use crate::physical::{first_input, PhysicalOperatorTrait, PhysicalRequirements};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{LocalProperty, NodeDomain, Partitioning, StructuralPropertiesVector};

fn group_by_of<'a>(gen: &JobGenContext<'a>) -> OptResult<&'a GroupBy> {
    match gen.operator() {
        LogicalOperator::GroupBy(g) => Ok(g),
        _ => Err(OptError::malformed_operator(gen.op, "expected a group-by").into()),
    }
}

/// Key and decor input fields. Keys and decors must be plain variables by now.
fn key_and_decor_fields(gen: &JobGenContext) -> OptResult<(Vec<usize>, Vec<usize>)> {
    let group_by = group_by_of(gen)?;
    let keys = gen.variable_fields(group_by.keys().iter().map(|(_, e)| e))?;
    let decors = gen.variable_fields(group_by.decors().iter().map(|(_, e)| e))?;
    Ok((keys, decors))
}

fn hashed_on(columns: &[LogicalVariable], domain: &NodeDomain) -> Partitioning {
    Partitioning::hashed(columns.to_vec(), Some(domain.clone()))
}

/// Group-by over input that is already clustered on the grouping columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreclusteredGroupByPop {
    /// Input variables the groups are formed on.
    pub columns: Vec<LogicalVariable>,
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for PreclusteredGroupByPop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::single(StructuralPropertiesVector::new(
            Some(hashed_on(&self.columns, &self.domain)),
            vec![LocalProperty::Grouping(self.columns.clone())],
        ))
    }

    fn deliver_properties(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        delivered_by_group_by(plan, op, inputs, true)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let (keys, decors) = key_and_decor_fields(gen)?;
        Ok(RuntimeContribution::Operator(
            OperatorDescriptor::PreclusteredGroupBy {
                keys,
                decors,
                nested: gen.nested_pipelines()?,
            },
        ))
    }
}

/// Hash based group-by. Only needs the input partitioned on the grouping columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalGroupByPop {
    pub columns: Vec<LogicalVariable>,
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for ExternalGroupByPop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::single(StructuralPropertiesVector::with_partitioning(hashed_on(
            &self.columns,
            &self.domain,
        )))
    }

    fn deliver_properties(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        delivered_by_group_by(plan, op, inputs, false)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let (keys, decors) = key_and_decor_fields(gen)?;
        Ok(RuntimeContribution::Operator(
            OperatorDescriptor::ExternalGroupBy {
                keys,
                decors,
                nested: gen.nested_pipelines()?,
            },
        ))
    }
}

/// Output partitioning is the input's, renamed from grouping columns to key variables.
fn delivered_by_group_by(
    plan: &LogicalPlan,
    op: OperatorId,
    inputs: &[StructuralPropertiesVector],
    grouped: bool,
) -> StructuralPropertiesVector {
    let input = first_input(inputs);
    let LogicalOperator::GroupBy(group_by) = plan.node(op).operator() else {
        return StructuralPropertiesVector::default();
    };
    let renames: Vec<(LogicalVariable, LogicalVariable)> = group_by
        .keys()
        .iter()
        .filter_map(|(v, e)| e.as_variable().map(|source| (*source, *v)))
        .collect();
    let rename = |c: LogicalVariable| {
        renames
            .iter()
            .find(|(source, _)| *source == c)
            .map(|(_, v)| *v)
    };
    let partitioning = input.partitioning().map(|p| {
        if p.columns().iter().all(|c| rename(*c).is_some()) {
            p.map_columns(|c| rename(c).unwrap_or(c))
        } else {
            Partitioning::Random {
                domain: p.domain().cloned(),
            }
        }
    });
    let local = if grouped {
        vec![LocalProperty::Grouping(group_by.key_variables())]
    } else {
        vec![]
    };
    StructuralPropertiesVector::new(partitioning, local)
}
