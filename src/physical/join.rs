use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::jobgen::{compile_expression, JobGenContext, OperatorDescriptor, RuntimeContribution};
use crate::operator::{JoinKind, LogicalOperator};
use crate::physical::{first_input, PhysicalOperatorTrait, PhysicalRequirements};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{
    NodeDomain, Partitioning, PropertiesCoordination, StructuralPropertiesVector,
};

/// Equi-join that builds a hash table on the right input. Both inputs are hash partitioned on
/// their keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HybridHashJoinPop {
    pub kind: JoinKind,
    pub left_keys: Vec<LogicalVariable>,
    pub right_keys: Vec<LogicalVariable>,
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for HybridHashJoinPop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        let hashed = |keys: &[LogicalVariable]| {
            Some(StructuralPropertiesVector::with_partitioning(
                Partitioning::hashed(keys.to_vec(), Some(self.domain.clone())),
            ))
        };
        PhysicalRequirements {
            children: vec![hashed(&self.left_keys), hashed(&self.right_keys)],
            coordination: PropertiesCoordination::EquivalenceClasses,
        }
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::new(first_input(inputs).partitioning().cloned(), vec![])
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let fields = |keys: &[LogicalVariable], input: usize| {
            keys.iter()
                .map(|k| gen.field_of_input(input, *k))
                .collect::<OptResult<Vec<_>>>()
        };
        Ok(RuntimeContribution::Operator(
            OperatorDescriptor::HybridHashJoin {
                kind: self.kind,
                left_keys: fields(&self.left_keys, 0)?,
                right_keys: fields(&self.right_keys, 1)?,
            },
        ))
    }
}

/// Join of every left tuple with the whole right input, which is broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedLoopJoinPop {
    pub kind: JoinKind,
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for NestedLoopJoinPop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements {
            children: vec![
                None,
                Some(StructuralPropertiesVector::with_partitioning(
                    Partitioning::Broadcast {
                        domain: Some(self.domain.clone()),
                    },
                )),
            ],
            coordination: PropertiesCoordination::NoCoordination,
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
        let LogicalOperator::Join(join) = gen.operator() else {
            return Err(OptError::malformed_operator(gen.op, "expected a join").into());
        };
        let both: Vec<LogicalVariable> = gen.input_schemas.iter().flatten().copied().collect();
        Ok(RuntimeContribution::Operator(
            OperatorDescriptor::NestedLoopJoin {
                kind: self.kind,
                condition: compile_expression(gen.op, join.condition(), &both, gen.registry)?,
            },
        ))
    }
}
