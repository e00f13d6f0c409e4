use enumset::EnumSet;
use log::debug;

use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::expr::{FunctionKind, LogicalExpression, LogicalVariable};
use crate::operator::{ExecutionMode, LogicalOperator, LogicalOperatorTag};
use crate::physical::{OneToOneExchangePop, PhysicalOperatorTrait};
use crate::plan::{LogicalPlan, SlotId};
use crate::rules::{find_visible_binding, is_private, AlgebraicRewriteRule};

/// Separates operators that become job operators of their own with one-to-one exchanges, so
/// that every edge between two job operators goes through an exchange. Chains of micro
/// operators stay together.
#[derive(Clone, Debug, Default)]
pub struct IsolateJobOperators;

impl AlgebraicRewriteRule for IsolateJobOperators {
    fn name(&self) -> &'static str {
        "IsolateJobOperators"
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let node = plan.node(op);
        let Some(parent) = node.physical().cloned() else {
            return Ok(false);
        };
        if parent.is_exchange() || node.execution_mode() == ExecutionMode::Local {
            return Ok(false);
        }

        let mut changed = false;
        for (idx, input) in plan.inputs(op).to_vec().into_iter().enumerate() {
            let child = plan.node_at(input);
            let Some(physical) = child.physical() else {
                continue;
            };
            let fused = parent.is_micro_operator() && physical.is_micro_operator();
            if physical.is_exchange() || fused {
                continue;
            }
            let (mode, delivered) = (child.execution_mode(), child.delivered().cloned());
            let exchange = plan.add_operator(LogicalOperator::Exchange, [input]);
            let node = plan.node_mut(exchange);
            node.set_physical(OneToOneExchangePop.into());
            node.set_execution_mode(mode);
            node.set_delivered(delivered);
            let exchange_slot = plan.new_slot(exchange);
            plan.set_input(op, idx, exchange_slot);
            changed = true;
        }
        if changed {
            debug!("Isolated inputs of {}", op);
        }
        Ok(changed)
    }
}

/// Reuses a scalar expression already computed by an assign below instead of evaluating it
/// again.
#[derive(Clone, Debug, Default)]
pub struct ExtractCommonExpressions;

impl AlgebraicRewriteRule for ExtractCommonExpressions {
    fn name(&self) -> &'static str {
        "ExtractCommonExpressions"
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let mut calls = vec![];
        for expr in plan.node(op).operator().expressions() {
            expr.for_each_call(&mut |call| {
                if let LogicalExpression::FunctionCall(c) = call {
                    if c.kind() == FunctionKind::Scalar && !calls.contains(call) {
                        calls.push(call.clone());
                    }
                }
            });
        }

        let mut replacements = vec![];
        for call in calls {
            let accept = |_: LogicalVariable, e: &LogicalExpression| *e == call;
            if let Some((v, _)) = find_visible_binding(plan, slot, &accept) {
                replacements.push((call, LogicalExpression::var(v)));
            }
        }
        let mut changed = false;
        for expr in plan.node_mut(op).operator_mut().expressions_mut() {
            for (call, replacement) in &replacements {
                changed |= expr.replace_subexpression(call, replacement);
            }
        }
        Ok(changed)
    }
}

/// Narrows a scan to the fields a project on top of it keeps, dropping the project when it
/// becomes a no-op.
#[derive(Clone, Debug, Default)]
pub struct PushProjectIntoDataSourceScan;

impl AlgebraicRewriteRule for PushProjectIntoDataSourceScan {
    fn name(&self) -> &'static str {
        "PushProjectIntoDataSourceScan"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Project.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Project(project) = plan.node(op).operator() else {
            return Ok(false);
        };
        let projected = project.variables().to_vec();
        let scan_slot = plan.inputs(op)[0];
        if !is_private(plan, scan_slot) {
            return Ok(false);
        }
        let LogicalOperator::DataSourceScan(scan) = plan.operator_at_mut(scan_slot) else {
            return Ok(false);
        };

        let mut changed = false;
        let kept: Vec<_> = scan
            .variables()
            .iter()
            .copied()
            .filter(|v| projected.contains(v))
            .collect();
        if kept != scan.output_variables() {
            scan.set_projection(kept);
            changed = true;
        }
        if scan.output_variables() == projected.as_slice() {
            let scan_op = plan.op_at(scan_slot);
            plan.set_slot(slot, scan_op);
            changed = true;
        }
        Ok(changed)
    }
}
