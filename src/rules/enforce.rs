use std::collections::HashMap;

use anyhow::bail;
use itertools::Itertools;
use log::debug;

use crate::constraint::OperatorConstraints;
use crate::context::OptimizationContext;
use crate::error::{OptError, OptResult};
use crate::expr::LogicalExpression;
use crate::operator::{LogicalOperator, Order};
use crate::physical::*;
use crate::plan::{LogicalPlan, OperatorId, SlotId};
use crate::properties::{
    LocalProperty, OrderColumn, Partitioning, PropertiesCoordination,
    StructuralPropertiesVector,
};
use crate::rules::{derive_execution_mode, is_private, AlgebraicRewriteRule};

/// Walks the plan from each root and inserts exchanges and sorts wherever an input does not
/// deliver what its consumer requires.
///
/// Every operator must carry a physical operator. Nested plans are left alone: they run on
/// the location of their owner.
#[derive(Clone, Debug, Default)]
pub struct EnforceStructuralProperties;

impl AlgebraicRewriteRule for EnforceStructuralProperties {
    fn name(&self) -> &'static str {
        "EnforceStructuralProperties"
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let root = plan.op_at(slot);
        if !plan.roots().contains(&slot) || ctx.is_dont_apply(self.name(), root) {
            return Ok(false);
        }
        let mut enforcer = Enforcer::default();
        enforcer.process(plan, ctx, slot)?;
        ctx.add_dont_apply(self.name(), plan.op_at(slot));
        Ok(enforcer.changed)
    }
}

#[derive(Default)]
struct Enforcer {
    delivered: HashMap<SlotId, StructuralPropertiesVector>,
    changed: bool,
}

impl Enforcer {
    /// Enforces the requirements below `slot` and returns what its operator delivers.
    fn process(
        &mut self,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
        slot: SlotId,
    ) -> OptResult<StructuralPropertiesVector> {
        if let Some(delivered) = self.delivered.get(&slot) {
            return Ok(delivered.clone());
        }
        let op = plan.op_at(slot);
        let physical = plan.node(op).physical().cloned().ok_or_else(|| {
            OptError::malformed_operator(op, "no physical operator to enforce properties for")
        })?;

        let mut inputs_delivered = vec![];
        for input in plan.inputs(op).to_vec() {
            inputs_delivered.push(self.process(plan, ctx, input)?);
        }

        let requirements = physical.required_properties_for_children(plan, op);
        let constraints = ctx.constraints(plan, op)?;
        for idx in 0..inputs_delivered.len() {
            let Some(Some(mut required)) = requirements.children.get(idx).cloned() else {
                continue;
            };
            if idx > 0 && requirements.coordination == PropertiesCoordination::EquivalenceClasses
            {
                let coordinated = requirements.coordination.coordinate(
                    required.partitioning(),
                    inputs_delivered[0].partitioning(),
                    &constraints.equivalence,
                )?;
                if coordinated.satisfied {
                    let own = required.partitioning().map(|p| p.columns()).unwrap_or_default();
                    let mapped = coordinated.partitioning.map(|p| {
                        p.map_columns(|c| {
                            own.iter()
                                .copied()
                                .find(|r| constraints.equivalence.equivalent(c, *r))
                                .unwrap_or(c)
                        })
                    });
                    required.set_partitioning(mapped);
                }
            }
            let child = plan.input_op(op, idx);
            let child_constraints = ctx.constraints(plan, child)?;
            inputs_delivered[idx] = self.enforce_input(
                plan,
                ctx,
                op,
                idx,
                &required,
                &inputs_delivered[idx],
                &child_constraints,
            )?;
        }

        let delivered = physical.deliver_properties(plan, op, &inputs_delivered);
        let node = plan.node_mut(op);
        node.set_delivered(Some(delivered.clone()));
        if !plan.inputs(op).is_empty() {
            let mode = derive_execution_mode(plan, op);
            plan.node_mut(op).set_execution_mode(mode);
        }
        self.delivered.insert(slot, delivered.clone());
        Ok(delivered)
    }

    #[allow(clippy::too_many_arguments)]
    fn enforce_input(
        &mut self,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
        op: OperatorId,
        idx: usize,
        required: &StructuralPropertiesVector,
        delivered: &StructuralPropertiesVector,
        constraints: &OperatorConstraints,
    ) -> OptResult<StructuralPropertiesVector> {
        let mut current = delivered.clone();
        if let Some(partitioning) =
            required.unsatisfied_partitioning(delivered, &constraints.equivalence)
        {
            let cluster = ctx.config().cluster_locations.clone();
            let exchange: PhysicalOperator = match partitioning {
                Partitioning::UnorderedPartitioned { columns, domain } => {
                    HashPartitionExchangePop {
                        columns,
                        domain: domain.unwrap_or(cluster),
                    }
                    .into()
                }
                Partitioning::Unpartitioned => match delivered.ordering() {
                    Some(columns) => SortMergeExchangePop {
                        columns: columns.to_vec(),
                    }
                    .into(),
                    None => RandomMergeExchangePop.into(),
                },
                Partitioning::Broadcast { domain } => BroadcastExchangePop {
                    domain: domain.unwrap_or(cluster),
                }
                .into(),
                other @ (Partitioning::Random { .. } | Partitioning::OrderedPartitioned { .. }) => {
                    bail!(OptError::not_implemented(format!(
                        "enforcing {} below {}",
                        other, op
                    )))
                }
            };
            current = self.place_exchange(plan, op, idx, exchange, delivered);
        }

        let unsatisfied =
            required.unsatisfied_local(&current, &constraints.equivalence, &constraints.fds);
        if !unsatisfied.is_empty() {
            let columns: Vec<OrderColumn> = unsatisfied
                .iter()
                .flat_map(|p| match p {
                    LocalProperty::Ordering(columns) => columns.clone(),
                    LocalProperty::Grouping(vars) => {
                        vars.iter().map(|v| OrderColumn::asc(*v)).collect()
                    }
                })
                .unique_by(|c| c.var)
                .collect();
            current = self.place_sort(plan, op, idx, columns, &current);
        }
        Ok(current)
    }

    /// Puts `exchange` on input `idx` of `op`. A private logical exchange already sitting there
    /// gets the physical operator instead of a second exchange on top of it.
    fn place_exchange(
        &mut self,
        plan: &mut LogicalPlan,
        op: OperatorId,
        idx: usize,
        exchange: PhysicalOperator,
        delivered: &StructuralPropertiesVector,
    ) -> StructuralPropertiesVector {
        let child_slot = plan.inputs(op)[idx];
        let (exchange_op, input_delivered) = match plan.operator_at(child_slot) {
            LogicalOperator::Exchange if is_private(plan, child_slot) => {
                let below = plan.node_at(child_slot).inputs()[0];
                let below_delivered = self
                    .delivered
                    .get(&below)
                    .cloned()
                    .unwrap_or_default();
                (plan.op_at(child_slot), below_delivered)
            }
            _ => {
                let added = plan.add_operator(LogicalOperator::Exchange, [child_slot]);
                let added_slot = plan.new_slot(added);
                plan.set_input(op, idx, added_slot);
                (added, delivered.clone())
            }
        };
        debug!("Placed {} below {}", exchange.name(), op);
        self.finish_enforcer(plan, exchange_op, exchange, input_delivered)
    }

    fn place_sort(
        &mut self,
        plan: &mut LogicalPlan,
        op: OperatorId,
        idx: usize,
        columns: Vec<OrderColumn>,
        delivered: &StructuralPropertiesVector,
    ) -> StructuralPropertiesVector {
        let order = Order::new(
            columns
                .iter()
                .map(|c| (c.kind, LogicalExpression::var(c.var)))
                .collect(),
        );
        let child_slot = plan.inputs(op)[idx];
        let sort = plan.add_operator(LogicalOperator::Order(order), [child_slot]);
        let sort_slot = plan.new_slot(sort);
        plan.set_input(op, idx, sort_slot);
        debug!("Placed sort on [{}] below {}", columns.iter().join(", "), op);
        self.finish_enforcer(
            plan,
            sort,
            StableSortPop { columns }.into(),
            delivered.clone(),
        )
    }

    fn finish_enforcer(
        &mut self,
        plan: &mut LogicalPlan,
        enforcer: OperatorId,
        physical: PhysicalOperator,
        input_delivered: StructuralPropertiesVector,
    ) -> StructuralPropertiesVector {
        let delivered = physical.deliver_properties(plan, enforcer, &[input_delivered]);
        plan.node_mut(enforcer).set_physical(physical);
        let mode = derive_execution_mode(plan, enforcer);
        let node = plan.node_mut(enforcer);
        node.set_execution_mode(mode);
        node.set_delivered(Some(delivered.clone()));
        self.changed = true;
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LogicalVariable;
    use crate::operator::{ExecutionMode, JoinKind};
    use crate::plan::LogicalPlanBuilder;
    use crate::rules::{SetExecutionMode, SetPhysicalOperators};

    fn v(var: LogicalVariable) -> LogicalExpression {
        LogicalExpression::var(var)
    }

    fn prepare(plan: &mut LogicalPlan, ctx: &mut OptimizationContext) {
        let slots: Vec<SlotId> = {
            let mut order = vec![];
            let mut stack = plan.roots().to_vec();
            while let Some(slot) = stack.pop() {
                order.push(slot);
                stack.extend(plan.node_at(slot).inputs().iter().copied());
            }
            order.into_iter().rev().collect()
        };
        for slot in &slots {
            SetExecutionMode.rewrite(*slot, plan, ctx).unwrap();
        }
        for slot in &slots {
            SetPhysicalOperators.rewrite(*slot, plan, ctx).unwrap();
        }
    }

    #[test]
    fn test_hash_join_inputs_are_partitioned_on_coordinated_keys() {
        let mut builder = LogicalPlanBuilder::new();
        let (a, b) = (builder.new_var(), builder.new_var());
        let right = builder.scan("r", vec![b]).take_root();
        builder
            .scan("l", vec![a])
            .join(JoinKind::Inner, LogicalExpression::eq(v(a), v(b)), right)
            .distribute_result(vec![v(a)]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();
        prepare(&mut plan, &mut ctx);

        let root = plan.roots()[0];
        assert!(EnforceStructuralProperties
            .rewrite(root, &mut plan, &mut ctx)
            .unwrap());
        assert!(!EnforceStructuralProperties
            .rewrite(root, &mut plan, &mut ctx)
            .unwrap());

        // distribute result <- random merge <- join
        let merge = plan.node_at(plan.node_at(root).inputs()[0]);
        assert!(matches!(
            merge.physical(),
            Some(PhysicalOperator::RandomMergeExchangePop(_))
        ));
        assert_eq!(ExecutionMode::Unpartitioned, merge.execution_mode());
        let join = plan.node_at(merge.inputs()[0]);
        let columns: Vec<_> = join
            .inputs()
            .iter()
            .map(|s| match plan.node_at(*s).physical() {
                Some(PhysicalOperator::HashPartitionExchangePop(p)) => p.columns.clone(),
                other => panic!("expected a hash exchange, found {:?}", other),
            })
            .collect();
        assert_eq!(vec![vec![a], vec![b]], columns);
        assert_eq!(ExecutionMode::Partitioned, join.execution_mode());
    }
}
