//! Physical operators: the execution strategy chosen for a logical operator.
//!
//! Every strategy states the properties it requires of its inputs, computes the properties it
//! delivers, and knows how it is lowered into a runtime descriptor.

use enum_dispatch::enum_dispatch;
use strum_macros::IntoStaticStr;

use crate::error::OptResult;
use crate::jobgen::{JobGenContext, RuntimeContribution};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{PropertiesCoordination, StructuralPropertiesVector};

mod exchange;
pub use exchange::*;
mod group_by;
pub use group_by::*;
mod join;
pub use join::*;
mod micro;
pub use micro::*;
mod source;
pub use source::*;

/// What an operator requires of each of its inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhysicalRequirements {
    /// One entry per input; `None` requires nothing.
    pub children: Vec<Option<StructuralPropertiesVector>>,
    /// How later inputs are aligned with the first one.
    pub coordination: PropertiesCoordination,
}

impl PhysicalRequirements {
    pub fn none(arity: usize) -> Self {
        Self {
            children: vec![None; arity],
            coordination: PropertiesCoordination::NoCoordination,
        }
    }

    pub fn single(required: StructuralPropertiesVector) -> Self {
        Self {
            children: vec![Some(required)],
            coordination: PropertiesCoordination::NoCoordination,
        }
    }
}

#[enum_dispatch]
pub trait PhysicalOperatorTrait {
    /// Whether the operator is one-input/one-output and may be fused into a pipeline.
    fn is_micro_operator(&self) -> bool;

    fn is_exchange(&self) -> bool {
        false
    }

    fn required_properties_for_children(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
    ) -> PhysicalRequirements;

    /// Properties of the output given what the inputs deliver.
    fn deliver_properties(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
        inputs: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector;

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution>;
}

#[enum_dispatch(PhysicalOperatorTrait)]
#[derive(Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum PhysicalOperator {
    EmptyTupleSourcePop,
    NestedTupleSourcePop,
    DataSourceScanPop,
    AssignPop,
    StreamSelectPop,
    StreamProjectPop,
    StreamLimitPop,
    StableSortPop,
    HybridHashJoinPop,
    NestedLoopJoinPop,
    PreclusteredGroupByPop,
    ExternalGroupByPop,
    AggregatePop,
    SubplanPop,
    DistributeResultPop,
    OneToOneExchangePop,
    HashPartitionExchangePop,
    RandomMergeExchangePop,
    SortMergeExchangePop,
    BroadcastExchangePop,
}

impl PhysicalOperator {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Properties of the first input, passed through unchanged.
fn first_input(inputs: &[StructuralPropertiesVector]) -> StructuralPropertiesVector {
    inputs.first().cloned().unwrap_or_default()
}
