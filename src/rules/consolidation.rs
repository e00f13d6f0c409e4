use enumset::EnumSet;
use log::debug;

use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::expr::LogicalExpression;
use crate::operator::{Assign, LogicalOperator, LogicalOperatorTag};
use crate::plan::{LogicalPlan, SlotId};
use crate::rules::{is_private, live_variables, AlgebraicRewriteRule};

/// Merges a select sitting on another select into one conjunctive select.
#[derive(Clone, Debug, Default)]
pub struct ConsolidateSelects;

impl AlgebraicRewriteRule for ConsolidateSelects {
    fn name(&self) -> &'static str {
        "ConsolidateSelects"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Select.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Select(upper) = plan.node(op).operator() else {
            return Ok(false);
        };
        let child_slot = plan.inputs(op)[0];
        let LogicalOperator::Select(lower) = plan.operator_at(child_slot) else {
            return Ok(false);
        };
        if !is_private(plan, child_slot) {
            return Ok(false);
        }
        let mut conjuncts = upper.condition().conjuncts();
        conjuncts.extend(lower.condition().conjuncts());
        let below = plan.node_at(child_slot).inputs()[0];

        if let LogicalOperator::Select(select) = plan.node_mut(op).operator_mut() {
            *select.condition_mut() = LogicalExpression::conjunction(conjuncts);
        }
        plan.set_input(op, 0, below);
        Ok(true)
    }
}

/// Merges an assign sitting on another assign when the upper one does not read what the lower
/// one binds.
#[derive(Clone, Debug, Default)]
pub struct ConsolidateAssigns;

impl AlgebraicRewriteRule for ConsolidateAssigns {
    fn name(&self) -> &'static str {
        "ConsolidateAssigns"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Assign.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Assign(upper) = plan.node(op).operator() else {
            return Ok(false);
        };
        let child_slot = plan.inputs(op)[0];
        let LogicalOperator::Assign(lower) = plan.operator_at(child_slot) else {
            return Ok(false);
        };
        if !is_private(plan, child_slot) {
            return Ok(false);
        }
        let upper_reads = plan.node(op).operator().used_variables();
        if lower.variables().iter().any(|v| upper_reads.contains(v)) {
            return Ok(false);
        }

        let mut merged = lower.clone();
        for (v, e) in upper.bindings() {
            merged.push(*v, e.clone());
        }
        let below = plan.node_at(child_slot).inputs()[0];
        *plan.node_mut(op).operator_mut() = LogicalOperator::Assign(merged);
        plan.set_input(op, 0, below);
        Ok(true)
    }
}

/// Drops assignments to variables nobody reads, and assigns left with nothing to bind.
#[derive(Clone, Debug, Default)]
pub struct RemoveUnusedAssigns;

impl AlgebraicRewriteRule for RemoveUnusedAssigns {
    fn name(&self) -> &'static str {
        "RemoveUnusedAssigns"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Assign.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Assign(assign) = plan.node(op).operator() else {
            return Ok(false);
        };
        let live = live_variables(plan)?;
        if assign.variables().iter().all(|v| live.contains(v)) {
            return Ok(false);
        }
        let mut kept = Assign::new(vec![], vec![]);
        for (v, e) in assign.bindings().filter(|(v, _)| live.contains(*v)) {
            kept.push(*v, e.clone());
        }

        if kept.is_empty() {
            let below = plan.input_op(op, 0);
            plan.set_slot(slot, below);
            debug!("Removed unused assign {}", op);
        } else {
            *plan.node_mut(op).operator_mut() = LogicalOperator::Assign(kept);
        }
        Ok(true)
    }
}

/// Drops aggregate results nobody reads.
#[derive(Clone, Debug, Default)]
pub struct RemoveUnusedAggregates;

impl AlgebraicRewriteRule for RemoveUnusedAggregates {
    fn name(&self) -> &'static str {
        "RemoveUnusedAggregates"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Aggregate.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        if !matches!(plan.node(op).operator(), LogicalOperator::Aggregate(_)) {
            return Ok(false);
        }
        let live = live_variables(plan)?;
        match plan.node_mut(op).operator_mut() {
            LogicalOperator::Aggregate(aggregate) => Ok(aggregate.retain(|v| live.contains(v))),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LogicalPlanBuilder;

    fn v(var: crate::expr::LogicalVariable) -> LogicalExpression {
        LogicalExpression::var(var)
    }

    #[test]
    fn test_consolidate_selects() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(2);
        builder
            .scan("t", vars.clone())
            .select(LogicalExpression::eq(v(vars[1]), LogicalExpression::constant(2)))
            .select(LogicalExpression::eq(v(vars[0]), LogicalExpression::constant(1)))
            .distribute_result(vec![v(vars[0])]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();

        let select_slot = plan.node_at(plan.roots()[0]).inputs()[0];
        assert!(ConsolidateSelects
            .rewrite(select_slot, &mut plan, &mut ctx)
            .unwrap());
        let LogicalOperator::Select(select) = plan.operator_at(select_slot) else {
            panic!("expected a select");
        };
        assert_eq!(2, select.condition().conjuncts().len());
        let below = plan.node_at(select_slot).inputs()[0];
        assert!(matches!(
            plan.operator_at(below),
            LogicalOperator::DataSourceScan(_)
        ));
        assert!(!ConsolidateSelects
            .rewrite(select_slot, &mut plan, &mut ctx)
            .unwrap());
    }

    #[test]
    fn test_dependent_assigns_are_not_merged() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(3);
        builder
            .scan("t", vec![vars[0]])
            .assign(vec![vars[1]], vec![v(vars[0])])
            .assign(vec![vars[2]], vec![v(vars[1])])
            .distribute_result(vec![v(vars[2])]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();

        let upper = plan.node_at(plan.roots()[0]).inputs()[0];
        assert!(!ConsolidateAssigns.rewrite(upper, &mut plan, &mut ctx).unwrap());
    }

    #[test]
    fn test_remove_unused_assign() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(3);
        builder
            .scan("t", vec![vars[0]])
            .assign(
                vec![vars[1], vars[2]],
                vec![LogicalExpression::constant(1), LogicalExpression::constant(2)],
            )
            .distribute_result(vec![v(vars[1])]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();

        let assign_slot = plan.node_at(plan.roots()[0]).inputs()[0];
        assert!(RemoveUnusedAssigns
            .rewrite(assign_slot, &mut plan, &mut ctx)
            .unwrap());
        let LogicalOperator::Assign(assign) = plan.operator_at(assign_slot) else {
            panic!("expected an assign");
        };
        assert_eq!(&[vars[1]], assign.variables());
        assert!(!RemoveUnusedAssigns
            .rewrite(assign_slot, &mut plan, &mut ctx)
            .unwrap());
    }
}
