use enumset::EnumSet;
use log::debug;

use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::expr::LogicalExpression;
use crate::operator::{Assign, GroupBy, JoinKind, LogicalOperator, LogicalOperatorTag, Select};
use crate::plan::{LogicalPlan, SlotId};
use crate::rules::{is_private, join_side_of, spans_join_inputs, AlgebraicRewriteRule};

/// Removes subplans that cannot change their input.
///
/// A subplan whose nested plans are bare nested tuple sources is replaced by its input. A
/// subplan over an empty tuple source is replaced by its single nested plan, rooted on that
/// source.
#[derive(Clone, Debug, Default)]
pub struct EliminateSubplan;

impl AlgebraicRewriteRule for EliminateSubplan {
    fn name(&self) -> &'static str {
        "EliminateSubplan"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Subplan.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Subplan(subplan) = plan.node(op).operator() else {
            return Ok(false);
        };
        let nested_roots: Vec<SlotId> = subplan
            .nested_plans()
            .iter()
            .flat_map(|p| p.roots().iter().copied())
            .collect();
        let input = plan.inputs(op)[0];

        let trivial = nested_roots.iter().all(|root| {
            matches!(
                plan.operator_at(*root),
                LogicalOperator::NestedTupleSource(_)
            )
        });
        if trivial {
            plan.set_slot(slot, plan.op_at(input));
            return Ok(true);
        }

        if nested_roots.len() == 1
            && matches!(plan.operator_at(input), LogicalOperator::EmptyTupleSource)
        {
            let root = nested_roots[0];
            let mut leaf = root;
            while let Some(next) = plan.node_at(leaf).inputs().first() {
                leaf = *next;
            }
            if !matches!(
                plan.operator_at(leaf),
                LogicalOperator::NestedTupleSource(_)
            ) {
                return Ok(false);
            }
            plan.set_slot(leaf, plan.op_at(input));
            plan.set_slot(slot, plan.op_at(root));
            return Ok(true);
        }
        Ok(false)
    }
}

/// Rewrites `distinct` into a group-by on the distinct expressions.
#[derive(Clone, Debug, Default)]
pub struct IntroduceGroupByForDistinct;

impl AlgebraicRewriteRule for IntroduceGroupByForDistinct {
    fn name(&self) -> &'static str {
        "IntroduceGroupByForDistinct"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Distinct.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Distinct(distinct) = plan.node(op).operator() else {
            return Ok(false);
        };
        let expressions = distinct.expressions().to_vec();
        let input = plan.inputs(op)[0];

        let mut keys = vec![];
        let mut renamed = Assign::new(vec![], vec![]);
        for expr in expressions {
            let key = ctx.new_var();
            if let LogicalExpression::Variable(v) = &expr {
                renamed.push(*v, LogicalExpression::var(key));
            }
            keys.push((key, expr));
        }
        let group_by = plan.insert(
            LogicalOperator::GroupBy(GroupBy::new(keys, vec![], vec![])),
            [input],
        );
        let top = if renamed.is_empty() {
            plan.op_at(group_by)
        } else {
            plan.add_operator(LogicalOperator::Assign(renamed), [group_by])
        };
        plan.set_slot(slot, top);
        debug!("Replaced distinct {} with group-by", op);
        Ok(true)
    }
}

/// Splits `select(and(p1, ..., pn))` into a chain of selects, `p1` on top.
#[derive(Clone, Debug, Default)]
pub struct BreakSelectIntoConjuncts;

impl AlgebraicRewriteRule for BreakSelectIntoConjuncts {
    fn name(&self) -> &'static str {
        "BreakSelectIntoConjuncts"
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
        let LogicalOperator::Select(select) = plan.node(op).operator() else {
            return Ok(false);
        };
        let mut conjuncts = vec![];
        if !select.condition().split_into_conjuncts(&mut conjuncts) {
            return Ok(false);
        }
        let first = conjuncts.remove(0);
        let mut cur = plan.inputs(op)[0];
        for conjunct in conjuncts.into_iter().rev() {
            cur = plan.insert(LogicalOperator::Select(Select::new(conjunct)), [cur]);
        }
        let top = plan.add_operator(LogicalOperator::Select(Select::new(first)), [cur]);
        plan.set_slot(slot, top);
        Ok(true)
    }
}

/// Pushes the conjuncts of a select sitting on a join into the join: conjuncts over both
/// inputs of an inner join join its condition, conjuncts over one input move onto that input.
#[derive(Clone, Debug, Default)]
pub struct PushSelectIntoJoin;

impl AlgebraicRewriteRule for PushSelectIntoJoin {
    fn name(&self) -> &'static str {
        "PushSelectIntoJoin"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Select.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Select(select) = plan.node(op).operator() else {
            return Ok(false);
        };
        let condition = select.condition().clone();
        let join_slot = plan.inputs(op)[0];
        let join = plan.op_at(join_slot);
        let LogicalOperator::Join(join_operator) = plan.node(join).operator() else {
            return Ok(false);
        };
        let kind = join_operator.kind();
        if !is_private(plan, join_slot) {
            return Ok(false);
        }

        let mut kept = vec![];
        let mut into_condition = vec![];
        let mut into_inputs: Vec<(usize, LogicalExpression)> = vec![];
        for conjunct in condition.conjuncts() {
            let vars = conjunct.variables();
            match (kind, join_side_of(plan, ctx, join, &vars)?) {
                (JoinKind::Inner, Some(side)) | (JoinKind::LeftOuter, Some(side @ 0)) => {
                    into_inputs.push((side, conjunct))
                }
                (JoinKind::Inner, None) if spans_join_inputs(plan, ctx, join, &vars)? => {
                    into_condition.push(conjunct)
                }
                _ => kept.push(conjunct),
            }
        }
        if into_condition.is_empty() && into_inputs.is_empty() {
            return Ok(false);
        }

        for (side, conjunct) in into_inputs {
            let input = plan.inputs(join)[side];
            let pushed = plan.insert(LogicalOperator::Select(Select::new(conjunct)), [input]);
            plan.set_input(join, side, pushed);
        }
        if !into_condition.is_empty() {
            if let LogicalOperator::Join(j) = plan.node_mut(join).operator_mut() {
                let mut conjuncts = j.condition().conjuncts();
                conjuncts.extend(into_condition);
                *j.condition_mut() = LogicalExpression::conjunction(conjuncts);
            }
        }
        if kept.is_empty() {
            plan.set_slot(slot, join);
        } else if let LogicalOperator::Select(s) = plan.node_mut(op).operator_mut() {
            *s.condition_mut() = LogicalExpression::conjunction(kept);
        }
        Ok(true)
    }
}

/// Moves non-variable group-by key and decor expressions into an assign below the group-by.
#[derive(Clone, Debug, Default)]
pub struct ExtractGroupByExpressions;

impl AlgebraicRewriteRule for ExtractGroupByExpressions {
    fn name(&self) -> &'static str {
        "ExtractGroupByExpressions"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::GroupBy.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::GroupBy(group_by) = plan.node_mut(op).operator_mut() else {
            return Ok(false);
        };
        let mut extracted = Assign::new(vec![], vec![]);
        for expr in group_by.expressions_mut() {
            if !matches!(expr, LogicalExpression::Variable(_)) {
                let v = ctx.new_var();
                let computed = std::mem::replace(expr, LogicalExpression::var(v));
                extracted.push(v, computed);
            }
        }
        if extracted.is_empty() {
            return Ok(false);
        }
        let input = plan.inputs(op)[0];
        let assign = plan.insert(LogicalOperator::Assign(extracted), [input]);
        plan.set_input(op, 0, assign);
        Ok(true)
    }
}
