use crate::error::{OptError, OptResult};
use crate::jobgen::{JobGenContext, OperatorDescriptor, RuntimeContribution};
use crate::operator::LogicalOperator;
use crate::physical::{first_input, PhysicalOperatorTrait, PhysicalRequirements};
use crate::plan::{LogicalPlan, OperatorId};
use crate::properties::{
    LocalProperty, NodeDomain, OrderColumn, Partitioning, StructuralPropertiesVector,
};

/// Scan of a source stored on every location of `domain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSourceScanPop {
    pub domain: NodeDomain,
}

impl PhysicalOperatorTrait for DataSourceScanPop {
    fn is_micro_operator(&self) -> bool {
        false
    }

    fn required_properties_for_children(&self, _: &LogicalPlan, _: OperatorId) -> PhysicalRequirements {
        PhysicalRequirements::none(0)
    }

    /// Sources with a primary key are hash partitioned on it.
    fn deliver_properties(
        &self,
        plan: &LogicalPlan,
        op: OperatorId,
        _: &[StructuralPropertiesVector],
    ) -> StructuralPropertiesVector {
        let domain = Some(self.domain.clone());
        let partitioning = match plan.node(op).operator() {
            LogicalOperator::DataSourceScan(scan)
                if !scan.primary_keys().is_empty()
                    && scan
                        .primary_keys()
                        .iter()
                        .all(|k| scan.output_variables().contains(k)) =>
            {
                Partitioning::hashed(scan.primary_keys().to_vec(), domain)
            }
            _ => Partitioning::Random { domain },
        };
        StructuralPropertiesVector::with_partitioning(partitioning)
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let LogicalOperator::DataSourceScan(scan) = gen.operator() else {
            return Err(OptError::malformed_operator(gen.op, "expected a data source scan").into());
        };
        let fields = scan
            .output_variables()
            .iter()
            .map(|v| {
                scan.variables().iter().position(|s| s == v).ok_or_else(|| {
                    OptError::malformed_operator(
                        gen.op,
                        format!("projected variable {} is not a field of {}", v, scan.source()),
                    )
                    .into()
                })
            })
            .collect::<OptResult<_>>()?;
        Ok(RuntimeContribution::Operator(
            OperatorDescriptor::DataSourceScan {
                source: scan.source().to_string(),
                fields,
            },
        ))
    }
}

/// Sort of every partition on `columns`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StableSortPop {
    pub columns: Vec<OrderColumn>,
}

impl PhysicalOperatorTrait for StableSortPop {
    fn is_micro_operator(&self) -> bool {
        false
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
        let input = first_input(inputs);
        StructuralPropertiesVector::new(
            input.partitioning().cloned(),
            vec![LocalProperty::Ordering(self.columns.clone())],
        )
    }

    fn runtime_contribution(&self, gen: &JobGenContext) -> OptResult<RuntimeContribution> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok((gen.field(c.var)?, c.kind)))
            .collect::<OptResult<_>>()?;
        Ok(RuntimeContribution::Operator(OperatorDescriptor::Sort {
            columns,
        }))
    }
}
