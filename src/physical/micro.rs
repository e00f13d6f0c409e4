use crate::error::{OptError, OptResult};
use crate::jobgen::{JobGenContext, MicroOperatorDescriptor, OperatorDescriptor, RuntimeContribution};
use crate::operator::LogicalOperator;
use crate::physical::{first_input, PhysicalOperatorTrait, PhysicalRequirements};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{LocalProperty, Partitioning, StructuralPropertiesVector};

fn micro(descriptor: MicroOperatorDescriptor) -> OptResult<RuntimeContribution> {
    Ok(RuntimeContribution::Operator(OperatorDescriptor::Micro(
        descriptor,
    )))
}

fn malformed<T>(gen: &JobGenContext, expected: &str) -> OptResult<T> {
    Err(OptError::malformed_operator(
        gen.op,
        format!("physical operator expects a logical {}", expected),
    )
    .into())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmptyTupleSourcePop;

impl PhysicalOperatorTrait for EmptyTupleSourcePop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(0)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::unpartitioned()
    }

    fn runtime_contribution(&self, _: &JobGenContext) -> OptResult<RuntimeContribution> {
        micro(MicroOperatorDescriptor::EmptyTupleSource)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NestedTupleSourcePop;

impl PhysicalOperatorTrait for NestedTupleSourcePop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(0)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::default()
    }

    fn runtime_contribution(&self, _: &JobGenContext) -> OptResult<RuntimeContribution> {
        micro(MicroOperatorDescriptor::NestedTupleSource)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignPop;

impl PhysicalOperatorTrait for AssignPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        first_input(inputs)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::Assign(assign) = gen.operator() else {
            return malformed(gen, "assign");
        };
        let expressions = assign
            .expressions()
            .iter()
            .map(|e| gen.compile(e))
            .collect::<OptResult<_>>()?;
        micro(MicroOperatorDescriptor::Assign { expressions })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamSelectPop;

impl PhysicalOperatorTrait for StreamSelectPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        first_input(inputs)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::Select(select) = gen.operator() else {
            return malformed(gen, "select");
        };
        micro(MicroOperatorDescriptor::StreamSelect {
            condition: gen.compile(select.condition())?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamProjectPop;

impl PhysicalOperatorTrait for StreamProjectPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    /// Keeps whatever is still expressible over the projected variables.
    fn deliver_properties(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        let input = first_input(inputs);
        let LogicalOperator::Project(project) = plan.node(op).operator() else {
            return input;
        };
        let vars = project.variables();
        let partitioning = input.partitioning().map(|p| {
            if p.columns().iter().all(|c| vars.contains(c)) {
                p.clone()
            } else {
                Partitioning::Random {
                    domain: p.domain().cloned(),
                }
            }
        });
        let local = input
            .local()
            .iter()
            .filter_map(|l| match l {
                LocalProperty::Ordering(columns) => {
                    let prefix: Vec<_> = columns
                        .iter()
                        .take_while(|c| vars.contains(&c.var))
                        .copied()
                        .collect();
                    (!prefix.is_empty()).then_some(LocalProperty::Ordering(prefix))
                }
                LocalProperty::Grouping(columns) => columns
                    .iter()
                    .all(|c| vars.contains(c))
                    .then(|| l.clone()),
            })
            .collect();
        StructuralPropertiesVector::new(partitioning, local)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::Project(project) = gen.operator() else {
            return malformed(gen, "project");
        };
        let fields = project
            .variables()
            .iter()
            .map(|v| gen.field(*v))
            .collect::<OptResult<_>>()?;
        micro(MicroOperatorDescriptor::StreamProject { fields })
    }
}

/// Limit. A global limit sees the whole input on one location; a local one runs per partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamLimitPop {
    pub global: bool,
}

impl PhysicalOperatorTrait for StreamLimitPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        if self.global {
            PhysicalRequirements::single(StructuralPropertiesVector::unpartitioned())
        } else {
            PhysicalRequirements::none(1)
        }
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        first_input(inputs)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::Limit(limit) = gen.operator() else {
            return malformed(gen, "limit");
        };
        micro(MicroOperatorDescriptor::StreamLimit {
            limit: limit.limit(),
            offset: limit.offset(),
        })
    }
}

/// Aggregation of the whole input into one record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregatePop;

impl PhysicalOperatorTrait for AggregatePop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::single(StructuralPropertiesVector::unpartitioned())
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::unpartitioned()
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::Aggregate(aggregate) = gen.operator() else {
            return malformed(gen, "aggregate");
        };
        let expressions = aggregate
            .expressions()
            .iter()
            .map(|e| gen.compile(e))
            .collect::<OptResult<_>>()?;
        micro(MicroOperatorDescriptor::Aggregate { expressions })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubplanPop;

impl PhysicalOperatorTrait for SubplanPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        first_input(inputs)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        micro(MicroOperatorDescriptor::Subplan {
            pipelines: gen.nested_pipelines()?,
        })
    }
}

/// Root of a query. Results are gathered on one location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributeResultPop;

impl PhysicalOperatorTrait for DistributeResultPop {
    fn is_micro_operator(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::single(StructuralPropertiesVector::unpartitioned())
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        first_input(inputs)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::DistributeResult(result) = gen.operator() else {
            return malformed(gen, "distribute result");
        };
        let expressions = result
            .expressions()
            .iter()
            .map(|e| gen.compile(e))
            .collect::<OptResult<_>>()?;
        micro(MicroOperatorDescriptor::Printer { expressions })
    }
}
