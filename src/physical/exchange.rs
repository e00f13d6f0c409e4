use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::jobgen::{ConnectorDescriptor, JobGenContext, RuntimeContribution, TargetConstraint};
use crate::physical::{first_input, PhysicalOperatorTrait, PhysicalRequirements};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{
    LocalProperty, NodeDomain, OrderColumn, Partitioning, StructuralPropertiesVector,
};

fn connector(
    descriptor: ConnectorDescriptor,
    target: TargetConstraint,
) -> OptResult<RuntimeContribution> {
    Ok(RuntimeContribution::Connector(descriptor, target))
}

/// Local hand-off without data movement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneToOneExchangePop;

impl PhysicalOperatorTrait for OneToOneExchangePop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn is_exchange(&self) -> bool {
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

    fn runtime_contribution(&self, _: &JobGenContext) -> OptResult<RuntimeContribution> {
        connector(ConnectorDescriptor::OneToOne, TargetConstraint::SameCount)
    }
}

/// Repartitions by hashing `columns` over `domain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashPartitionExchangePop {
    pub columns: Vec<LogicalVariable>,
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for HashPartitionExchangePop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn is_exchange(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::with_partitioning(Partitioning::hashed(
            self.columns.clone(),
            Some(self.domain.clone()),
        ))
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let fields = self
            .columns
            .iter()
            .map(|c| gen.field(*c))
            .collect::<OptResult<_>>()?;
        connector(
            ConnectorDescriptor::MToNHashPartitioning { fields },
            TargetConstraint::SameCount,
        )
    }
}

/// Gathers every partition on one location, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RandomMergeExchangePop;

impl PhysicalOperatorTrait for RandomMergeExchangePop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn is_exchange(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
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
        connector(ConnectorDescriptor::MToNRandomMerge, TargetConstraint::One)
    }
}

/// Gathers sorted partitions on one location, merging them into one sorted stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortMergeExchangePop {
    pub columns: Vec<OrderColumn>,
}

impl PhysicalOperatorTrait for SortMergeExchangePop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn is_exchange(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::single(StructuralPropertiesVector::new(
            None,
            vec![LocalProperty::Ordering(self.columns.clone())],
        ))
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::new(
            Some(Partitioning::Unpartitioned),
            vec![LocalProperty::Ordering(self.columns.clone())],
        )
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok((gen.field(c.var)?, c.kind)))
            .collect::<OptResult<_>>()?;
        connector(
            ConnectorDescriptor::MToNSortMerging { columns },
            TargetConstraint::One,
        )
    }
}

/// Sends every tuple to every location of `domain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastExchangePop {
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for BroadcastExchangePop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn is_exchange(&self) -> bool {
        true
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(1)
    }

    fn deliver_properties(
        &self,
        _: &LogicalPlan,
        _: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        StructuralPropertiesVector::with_partitioning(Partitioning::Broadcast {
            domain: Some(self.domain.clone()),
        })
    }

    fn runtime_contribution(&self, _: &JobGenContext) -> OptResult<RuntimeContribution> {
        connector(ConnectorDescriptor::MToNBroadcast, TargetConstraint::SameCount)
    }
}
