//! Algebraic rewrite rules.
//!
//! A rule is offered one operator slot at a time and rewrites the plan in place, reporting
//! whether it fired. Rules must be idempotent: applying a rule to its own output fires
//! nothing. Rules that change what an operator produces only do so when no other parent can
//! observe the operator; otherwise they build new operators and repoint their own slot.

use std::collections::HashSet;
use std::fmt::Debug;

use enum_dispatch::enum_dispatch;
use enumset::EnumSet;

use crate::config::MatchOrder;
use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::expr::{LogicalExpression, LogicalVariable};
use crate::operator::{ExecutionMode, LogicalOperator, LogicalOperatorTag};
use crate::physical::PhysicalOperator;
use crate::plan::{LogicalPlan, OperatorId, SlotId};

mod consolidation;
pub use consolidation::*;
mod enforce;
pub use enforce::*;
mod jobgen_prep;
pub use jobgen_prep::*;
mod normalization;
pub use normalization::*;
mod physical;
pub use physical::*;
mod pushdown;
pub use pushdown::*;
mod type_inference;
pub use type_inference::*;

#[enum_dispatch]
pub trait AlgebraicRewriteRule: Debug {
    fn name(&self) -> &'static str;

    /// Operator kinds the rule is offered. Operators of other kinds are skipped.
    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        EnumSet::all()
    }

    /// Whether the rule sees an operator before or after its inputs.
    fn match_order(&self) -> MatchOrder {
        MatchOrder::TopDown
    }

    /// Rewrites the operator at `slot`. Returns whether the plan changed.
    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool>;
}

#[enum_dispatch(AlgebraicRewriteRule)]
#[derive(Clone, Debug)]
pub enum RuleImpl {
    InferTypes,
    EliminateSubplan,
    IntroduceGroupByForDistinct,
    BreakSelectIntoConjuncts,
    PushSelectIntoJoin,
    ExtractGroupByExpressions,
    PushSelectDown,
    InlineVariables,
    FactorRedundantGroupAndDecorVars,
    ComplexJoinInference,
    PushProjectDown,
    SetExecutionMode,
    ConsolidateSelects,
    ConsolidateAssigns,
    RemoveUnusedAssigns,
    RemoveUnusedAggregates,
    PullSelectOutOfEqJoin,
    SetPhysicalOperators,
    EnforceStructuralProperties,
    PushLimitDown,
    IsolateJobOperators,
    ExtractCommonExpressions,
    PushProjectIntoDataSourceScan,
}

/// A named, ordered list of rules run together by one controller.
#[derive(Clone, Debug)]
pub struct RuleCollection {
    name: &'static str,
    rules: Vec<RuleImpl>,
}

impl RuleCollection {
    pub fn new(name: &'static str, rules: Vec<RuleImpl>) -> Self {
        Self { name, rules }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rules(&self) -> &[RuleImpl] {
        &self.rules
    }
}

/// Whether a rewrite may change what the operator at `slot` produces: the slot must not be a
/// root and must be held by at most one input edge.
pub(crate) fn is_private(plan: &LogicalPlan, slot: SlotId) -> bool {
    !plan.roots().contains(&slot) && plan.parents_of(slot).len() <= 1
}

/// Variables the operator at `slot` makes visible to its parent.
pub(crate) fn schema_at(
    plan: &LogicalPlan,
    ctx: &mut OptimizationContext,
    slot: SlotId,
) -> OptResult<Vec<LogicalVariable>> {
    ctx.schema(plan, plan.op_at(slot))
}

/// The input of a join that produces every variable of `vars`, if exactly one does.
pub(crate) fn join_side_of(
    plan: &LogicalPlan,
    ctx: &mut OptimizationContext,
    join: OperatorId,
    vars: &[LogicalVariable],
) -> OptResult<Option<usize>> {
    if vars.is_empty() {
        return Ok(None);
    }
    for (idx, input) in plan.inputs(join).to_vec().into_iter().enumerate() {
        let schema = schema_at(plan, ctx, input)?;
        if vars.iter().all(|v| schema.contains(v)) {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Whether `vars` reference both inputs of a join.
pub(crate) fn spans_join_inputs(
    plan: &LogicalPlan,
    ctx: &mut OptimizationContext,
    join: OperatorId,
    vars: &[LogicalVariable],
) -> OptResult<bool> {
    let inputs = plan.inputs(join).to_vec();
    if inputs.len() != 2 {
        return Ok(false);
    }
    let left = schema_at(plan, ctx, inputs[0])?;
    let right = schema_at(plan, ctx, inputs[1])?;
    Ok(vars.iter().any(|v| left.contains(v))
        && vars.iter().any(|v| right.contains(v))
        && vars.iter().all(|v| left.contains(v) || right.contains(v)))
}

/// Searches below `slot` for the assignment of a variable visible at `slot` whose binding
/// satisfies `accept`. The search follows operators that pass their input variables through
/// and stops at operators that produce a fresh schema.
///
/// Variables read by the returned expression are visible at `slot` too.
pub(crate) fn find_visible_binding<F>(
    plan: &LogicalPlan,
    slot: SlotId,
    accept: &F,
) -> Option<(LogicalVariable, LogicalExpression)>
where
    F: Fn(LogicalVariable, &LogicalExpression) -> bool,
{
    find_binding_below(plan, plan.op_at(slot), accept, None)
}

fn find_binding_below<F>(
    plan: &LogicalPlan,
    op: OperatorId,
    accept: &F,
    visible: Option<&[LogicalVariable]>,
) -> Option<(LogicalVariable, LogicalExpression)>
where
    F: Fn(LogicalVariable, &LogicalExpression) -> bool,
{
    for input in plan.inputs(op) {
        let child = plan.op_at(*input);
        let visible_here = |vars: &[LogicalVariable]| match visible {
            Some(visible) => vars.iter().all(|v| visible.contains(v)),
            None => true,
        };
        match plan.node(child).operator() {
            LogicalOperator::Assign(assign) => {
                for (v, e) in assign.bindings() {
                    if visible_here(&[*v]) && visible_here(&e.variables()) && accept(*v, e) {
                        return Some((*v, e.clone()));
                    }
                }
            }
            LogicalOperator::Project(project) => {
                let narrowed: Vec<_> = project
                    .variables()
                    .iter()
                    .copied()
                    .filter(|v| visible_here(&[*v]))
                    .collect();
                if let Some(found) = find_binding_below(plan, child, accept, Some(&narrowed)) {
                    return Some(found);
                }
                continue;
            }
            LogicalOperator::Select(_)
            | LogicalOperator::Join(_)
            | LogicalOperator::Order(_)
            | LogicalOperator::Limit(_)
            | LogicalOperator::Exchange
            | LogicalOperator::Subplan(_) => {}
            _ => continue,
        }
        if let Some(found) = find_binding_below(plan, child, accept, visible) {
            return Some(found);
        }
    }
    None
}

/// Execution mode of `op` derived from its kind, physical strategy and inputs.
pub(crate) fn derive_execution_mode(plan: &LogicalPlan, op: OperatorId) -> ExecutionMode {
    let node = plan.node(op);
    let input_modes: Vec<ExecutionMode> = node
        .inputs()
        .iter()
        .map(|s| plan.node_at(*s).execution_mode())
        .collect();
    if input_modes.contains(&ExecutionMode::Local) {
        return ExecutionMode::Local;
    }
    let inherited = if input_modes.contains(&ExecutionMode::Partitioned) {
        ExecutionMode::Partitioned
    } else {
        ExecutionMode::Unpartitioned
    };
    match node.physical() {
        Some(PhysicalOperator::HashPartitionExchangePop(_))
        | Some(PhysicalOperator::BroadcastExchangePop(_)) => return ExecutionMode::Partitioned,
        Some(PhysicalOperator::RandomMergeExchangePop(_))
        | Some(PhysicalOperator::SortMergeExchangePop(_)) => return ExecutionMode::Unpartitioned,
        Some(PhysicalOperator::StreamLimitPop(limit)) if !limit.global => return inherited,
        _ => {}
    }
    match node.operator() {
        LogicalOperator::NestedTupleSource(_) => ExecutionMode::Local,
        LogicalOperator::EmptyTupleSource => ExecutionMode::Unpartitioned,
        LogicalOperator::DataSourceScan(_) => ExecutionMode::Partitioned,
        LogicalOperator::Aggregate(_)
        | LogicalOperator::Limit(_)
        | LogicalOperator::DistributeResult(_) => ExecutionMode::Unpartitioned,
        _ => inherited,
    }
}

/// Variables some operator reads, plus the output of every root that is not a result sink.
pub(crate) fn live_variables(plan: &LogicalPlan) -> OptResult<HashSet<LogicalVariable>> {
    let mut live = plan.all_used_variables();
    for root in plan.roots() {
        if !matches!(plan.operator_at(*root), LogicalOperator::DistributeResult(_)) {
            live.extend(plan.schema_of(plan.op_at(*root))?);
        }
    }
    Ok(live)
}
