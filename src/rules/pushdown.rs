use enumset::EnumSet;
use log::debug;

use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::expr::{LogicalExpression, LogicalVariable};
use crate::operator::{Assign, JoinKind, LogicalOperator, LogicalOperatorTag, Project, Select};
use crate::plan::{LogicalPlan, OperatorId, SlotId};
use crate::rules::{
    find_visible_binding, is_private, join_side_of, schema_at, spans_join_inputs,
    AlgebraicRewriteRule,
};

/// Puts a new select with `condition` between `op` and its input `idx`.
fn insert_select_below(
    plan: &mut LogicalPlan,
    op: OperatorId,
    idx: usize,
    condition: LogicalExpression,
) {
    let input = plan.inputs(op)[idx];
    let select = plan.insert(LogicalOperator::Select(Select::new(condition)), [input]);
    plan.set_input(op, idx, select);
}

/// Moves selects below operators that do not produce the variables they test.
#[derive(Clone, Debug, Default)]
pub struct PushSelectDown;

impl AlgebraicRewriteRule for PushSelectDown {
    fn name(&self) -> &'static str {
        "PushSelectDown"
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
        let mut condition = select.condition().clone();
        let vars = condition.variables();
        let child_slot = plan.inputs(op)[0];
        if vars.is_empty() || !is_private(plan, child_slot) {
            return Ok(false);
        }
        let child = plan.op_at(child_slot);

        let target = match plan.node(child).operator() {
            LogicalOperator::Assign(assign) => {
                (!vars.iter().any(|v| assign.variables().contains(v))).then_some(0)
            }
            LogicalOperator::Subplan(_) => {
                let produced = plan.nested_produced_variables(child);
                (!vars.iter().any(|v| produced.contains(v))).then_some(0)
            }
            LogicalOperator::Order(_) => Some(0),
            LogicalOperator::Distinct(distinct) => vars
                .iter()
                .all(|v| distinct.expressions().contains(&LogicalExpression::var(*v)))
                .then_some(0),
            LogicalOperator::GroupBy(group_by) => {
                let sources: Option<Vec<(LogicalVariable, LogicalVariable)>> = vars
                    .iter()
                    .map(|v| {
                        group_by
                            .keys()
                            .iter()
                            .find(|(k, _)| k == v)
                            .and_then(|(k, e)| e.as_variable().map(|s| (*k, *s)))
                    })
                    .collect();
                match sources {
                    Some(sources) => {
                        for (key, source) in sources {
                            condition.substitute_var(key, source);
                        }
                        Some(0)
                    }
                    None => None,
                }
            }
            LogicalOperator::Join(join) => {
                let kind = join.kind();
                match join_side_of(plan, ctx, child, &vars)? {
                    Some(side) if kind == JoinKind::Inner || side == 0 => Some(side),
                    _ => None,
                }
            }
            _ => None,
        };
        let Some(idx) = target else {
            return Ok(false);
        };
        insert_select_below(plan, child, idx, condition);
        plan.set_slot(slot, child);
        debug!("Pushed select {} below {}", op, child);
        Ok(true)
    }
}

/// Replaces a variable by the variable or constant it was assigned from.
#[derive(Clone, Debug, Default)]
pub struct InlineVariables;

impl AlgebraicRewriteRule for InlineVariables {
    fn name(&self) -> &'static str {
        "InlineVariables"
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let operator = plan.node(op).operator();
        if let LogicalOperator::Project(_) = operator {
            return Ok(false);
        }
        let constants_allowed = matches!(
            operator,
            LogicalOperator::Select(_)
                | LogicalOperator::Assign(_)
                | LogicalOperator::Join(_)
                | LogicalOperator::Aggregate(_)
        );
        let mut inlined = vec![];
        for used in operator.used_variables() {
            let accept = |v: LogicalVariable, e: &LogicalExpression| {
                v == used
                    && match e {
                        LogicalExpression::Variable(_) => true,
                        LogicalExpression::Constant(_) => constants_allowed,
                        LogicalExpression::FunctionCall(_) => false,
                    }
            };
            if let Some(binding) = find_visible_binding(plan, slot, &accept) {
                inlined.push(binding);
            }
        }
        if inlined.is_empty() {
            return Ok(false);
        }
        let mut changed = false;
        for expr in plan.node_mut(op).operator_mut().expressions_mut() {
            for (v, replacement) in &inlined {
                changed |= expr.inline_var(*v, replacement);
            }
        }
        Ok(changed)
    }
}

/// Drops group-by keys and decors that repeat an earlier key expression and rebinds them with
/// an assign on top of the group-by.
#[derive(Clone, Debug, Default)]
pub struct FactorRedundantGroupAndDecorVars;

impl AlgebraicRewriteRule for FactorRedundantGroupAndDecorVars {
    fn name(&self) -> &'static str {
        "FactorRedundantGroupAndDecorVars"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::GroupBy.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::GroupBy(group_by) = plan.node_mut(op).operator_mut() else {
            return Ok(false);
        };
        let mut rebound = Assign::new(vec![], vec![]);
        let mut kept: Vec<(LogicalVariable, LogicalExpression)> = vec![];
        for (v, e) in group_by.keys_mut().drain(..) {
            let first = kept.iter().find(|(_, k)| *k == e).map(|(f, _)| *f);
            match first {
                Some(first) => rebound.push(v, LogicalExpression::var(first)),
                None => kept.push((v, e)),
            }
        }
        *group_by.keys_mut() = kept.clone();
        let mut decors: Vec<(LogicalVariable, LogicalExpression)> = vec![];
        for (v, e) in group_by.decors_mut().drain(..) {
            let first = kept
                .iter()
                .chain(decors.iter())
                .find(|(_, k)| *k == e)
                .map(|(f, _)| *f);
            match first {
                Some(first) => rebound.push(v, LogicalExpression::var(first)),
                None => decors.push((v, e)),
            }
        }
        *group_by.decors_mut() = decors;
        if rebound.is_empty() {
            return Ok(false);
        }
        let below = plan.new_slot(op);
        let assign = plan.add_operator(LogicalOperator::Assign(rebound), [below]);
        plan.set_slot(slot, assign);
        Ok(true)
    }
}

/// Turns a select over both inputs of an inner join, possibly separated from the join by
/// assigns it does not depend on, into part of the join condition.
#[derive(Clone, Debug, Default)]
pub struct ComplexJoinInference;

impl AlgebraicRewriteRule for ComplexJoinInference {
    fn name(&self) -> &'static str {
        "ComplexJoinInference"
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
        let vars = condition.variables();

        let mut cur = plan.inputs(op)[0];
        let join = loop {
            if !is_private(plan, cur) {
                return Ok(false);
            }
            match plan.operator_at(cur) {
                LogicalOperator::Assign(assign) => {
                    if vars.iter().any(|v| assign.variables().contains(v)) {
                        return Ok(false);
                    }
                    cur = plan.node_at(cur).inputs()[0];
                }
                LogicalOperator::Join(j) if j.kind() == JoinKind::Inner => break plan.op_at(cur),
                _ => return Ok(false),
            }
        };
        if !spans_join_inputs(plan, ctx, join, &vars)? {
            return Ok(false);
        }

        if let LogicalOperator::Join(j) = plan.node_mut(join).operator_mut() {
            let mut conjuncts = j.condition().conjuncts();
            conjuncts.extend(condition.conjuncts());
            *j.condition_mut() = LogicalExpression::conjunction(conjuncts);
        }
        let below = plan.input_op(op, 0);
        plan.set_slot(slot, below);
        debug!("Merged select {} into join {}", op, join);
        Ok(true)
    }
}

/// Narrows the input of the operator below a project to the variables still needed.
#[derive(Clone, Debug, Default)]
pub struct PushProjectDown;

impl AlgebraicRewriteRule for PushProjectDown {
    fn name(&self) -> &'static str {
        "PushProjectDown"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Project.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Project(project) = plan.node(op).operator() else {
            return Ok(false);
        };
        let projected = project.variables().to_vec();
        let child_slot = plan.inputs(op)[0];
        let child = plan.op_at(child_slot);

        if let LogicalOperator::Project(_) = plan.node(child).operator() {
            let grandchild = plan.inputs(child)[0];
            plan.set_input(op, 0, grandchild);
            return Ok(true);
        }

        let child_operator = plan.node(child).operator();
        let produced = match child_operator {
            LogicalOperator::Assign(a) => a.variables().to_vec(),
            LogicalOperator::Select(_)
            | LogicalOperator::Join(_)
            | LogicalOperator::Order(_)
            | LogicalOperator::Limit(_)
            | LogicalOperator::Distinct(_)
            | LogicalOperator::Aggregate(_) => vec![],
            _ => return Ok(false),
        };
        if !is_private(plan, child_slot) {
            return Ok(false);
        }
        let mut needed = child_operator.used_variables();
        needed.extend(projected.iter().filter(|v| !produced.contains(v)));

        let mut changed = false;
        for (idx, input) in plan.inputs(child).to_vec().into_iter().enumerate() {
            let schema = schema_at(plan, ctx, input)?;
            let keep: Vec<_> = schema
                .iter()
                .copied()
                .filter(|v| needed.contains(v))
                .collect();
            if keep.len() < schema.len() {
                let narrowed = plan.insert(LogicalOperator::Project(Project::new(keep)), [input]);
                plan.set_input(child, idx, narrowed);
                changed = true;
            }
        }
        Ok(changed)
    }
}
