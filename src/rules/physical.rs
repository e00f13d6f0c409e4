use enumset::EnumSet;
use log::debug;

use crate::config::MatchOrder;
use crate::context::OptimizationContext;
use crate::error::{OptError, OptResult};
use crate::expr::{BuiltinFunction, LogicalExpression, LogicalVariable};
use crate::operator::{
    ExecutionMode, JoinKind, Limit, LogicalOperator, LogicalOperatorTag, Select,
    USE_HASH_GROUP_BY,
};
use crate::physical::*;
use crate::plan::{LogicalPlan, OperatorId, SlotId};
use crate::properties::OrderColumn;
use crate::rules::{derive_execution_mode, is_private, schema_at, AlgebraicRewriteRule};

/// Conjuncts of an inner join condition split into cross-input variable equalities, as
/// `(left keys, right keys)`, and everything else.
pub(crate) fn split_equi_join_condition(
    plan: &LogicalPlan,
    ctx: &mut OptimizationContext,
    join: OperatorId,
) -> OptResult<(Vec<LogicalVariable>, Vec<LogicalVariable>, Vec<LogicalExpression>)> {
    let LogicalOperator::Join(join_operator) = plan.node(join).operator() else {
        return Err(OptError::malformed_operator(join, "expected a join").into());
    };
    let inputs = plan.inputs(join).to_vec();
    let left = schema_at(plan, ctx, inputs[0])?;
    let right = schema_at(plan, ctx, inputs[1])?;

    let (mut left_keys, mut right_keys, mut others) = (vec![], vec![], vec![]);
    for conjunct in join_operator.condition().conjuncts() {
        let pair = match &conjunct {
            LogicalExpression::FunctionCall(call)
                if conjunct.is_call_to(BuiltinFunction::Eq)
                    && call.arguments().len() == 2 =>
            {
                match (&call.arguments()[0], &call.arguments()[1]) {
                    (LogicalExpression::Variable(a), LogicalExpression::Variable(b)) => {
                        if left.contains(a) && right.contains(b) {
                            Some((*a, *b))
                        } else if left.contains(b) && right.contains(a) {
                            Some((*b, *a))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        match pair {
            Some((l, r)) => {
                left_keys.push(l);
                right_keys.push(r);
            }
            None => others.push(conjunct),
        }
    }
    Ok((left_keys, right_keys, others))
}

/// Derives the execution mode of every operator from its inputs.
#[derive(Clone, Debug, Default)]
pub struct SetExecutionMode;

impl AlgebraicRewriteRule for SetExecutionMode {
    fn name(&self) -> &'static str {
        "SetExecutionMode"
    }

    fn match_order(&self) -> MatchOrder {
        MatchOrder::BottomUp
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let mode = derive_execution_mode(plan, op);
        if plan.node(op).execution_mode() == mode {
            return Ok(false);
        }
        plan.node_mut(op).set_execution_mode(mode);
        Ok(true)
    }
}

/// Splits an inner join whose condition mixes cross-input equalities with other predicates
/// into an equi-join under a select on the remaining predicates.
#[derive(Clone, Debug, Default)]
pub struct PullSelectOutOfEqJoin;

impl AlgebraicRewriteRule for PullSelectOutOfEqJoin {
    fn name(&self) -> &'static str {
        "PullSelectOutOfEqJoin"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::InnerJoin.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let LogicalOperator::Join(join) = plan.node(op).operator() else {
            return Ok(false);
        };
        if join.kind() != JoinKind::Inner {
            return Ok(false);
        }
        let (left_keys, right_keys, others) = split_equi_join_condition(plan, ctx, op)?;
        if left_keys.is_empty() || others.is_empty() {
            return Ok(false);
        }

        let equalities = left_keys
            .iter()
            .zip(right_keys.iter())
            .map(|(l, r)| LogicalExpression::eq(LogicalExpression::var(*l), LogicalExpression::var(*r)))
            .collect();
        let mut equi_join = plan.node(op).operator().clone();
        if let LogicalOperator::Join(j) = &mut equi_join {
            *j.condition_mut() = LogicalExpression::conjunction(equalities);
        }
        let inputs = plan.inputs(op).to_vec();
        let join_slot = plan.insert(equi_join, inputs);
        let select = plan.add_operator(
            LogicalOperator::Select(Select::new(LogicalExpression::conjunction(others))),
            [join_slot],
        );
        plan.set_slot(slot, select);
        Ok(true)
    }
}

/// Picks a physical operator for every logical operator that has none.
#[derive(Clone, Debug, Default)]
pub struct SetPhysicalOperators;

impl SetPhysicalOperators {
    fn choose(
        plan: &LogicalPlan,
        ctx: &mut OptimizationContext,
        op: OperatorId,
        mode: ExecutionMode,
    ) -> OptResult<PhysicalOperator> {
        let domain = ctx.config().cluster_locations.clone();
        let node = plan.node(op);
        let physical: PhysicalOperator = match node.operator() {
            LogicalOperator::EmptyTupleSource => EmptyTupleSourcePop.into(),
            LogicalOperator::NestedTupleSource(_) => NestedTupleSourcePop.into(),
            LogicalOperator::DataSourceScan(_) => DataSourceScanPop { domain }.into(),
            LogicalOperator::Assign(_) => AssignPop.into(),
            LogicalOperator::Select(_) => StreamSelectPop.into(),
            LogicalOperator::Project(_) => StreamProjectPop.into(),
            LogicalOperator::Limit(_) => StreamLimitPop {
                global: mode != ExecutionMode::Local,
            }
            .into(),
            LogicalOperator::Order(order) => {
                let columns = order
                    .columns()
                    .iter()
                    .map(|(kind, e)| match e {
                        LogicalExpression::Variable(v) => Ok(OrderColumn::new(*v, *kind)),
                        _ => Err(OptError::malformed_operator(
                            op,
                            format!("order expression {} is not a variable", e),
                        )
                        .into()),
                    })
                    .collect::<OptResult<Vec<_>>>()?;
                StableSortPop { columns }.into()
            }
            LogicalOperator::Join(join) => {
                let kind = join.kind();
                let (left_keys, right_keys, others) = split_equi_join_condition(plan, ctx, op)?;
                if !left_keys.is_empty() && others.is_empty() {
                    HybridHashJoinPop {
                        kind,
                        left_keys,
                        right_keys,
                        domain,
                    }
                    .into()
                } else {
                    NestedLoopJoinPop { kind, domain }.into()
                }
            }
            LogicalOperator::GroupBy(group_by) => {
                let columns = group_by
                    .keys()
                    .iter()
                    .map(|(_, e)| match e {
                        LogicalExpression::Variable(v) => Ok(*v),
                        _ => Err(OptError::malformed_operator(
                            op,
                            format!("group-by key {} is not a variable", e),
                        )
                        .into()),
                    })
                    .collect::<OptResult<Vec<_>>>()?;
                if node.annotations().contains_key(USE_HASH_GROUP_BY)
                    || ctx.config().hash_group_by_by_default
                {
                    ExternalGroupByPop { columns, domain }.into()
                } else {
                    PreclusteredGroupByPop { columns, domain }.into()
                }
            }
            LogicalOperator::Aggregate(_) => AggregatePop.into(),
            LogicalOperator::Subplan(_) => SubplanPop.into(),
            LogicalOperator::DistributeResult(_) => DistributeResultPop.into(),
            LogicalOperator::Exchange => OneToOneExchangePop.into(),
            LogicalOperator::Distinct(_) => {
                return Err(OptError::not_implemented(format!(
                    "physical operator for distinct {}",
                    op
                ))
                .into())
            }
        };
        Ok(physical)
    }
}

impl AlgebraicRewriteRule for SetPhysicalOperators {
    fn name(&self) -> &'static str {
        "SetPhysicalOperators"
    }

    fn match_order(&self) -> MatchOrder {
        MatchOrder::BottomUp
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        if plan.node(op).physical().is_some() {
            return Ok(false);
        }
        let mut mode = plan.node(op).execution_mode();
        if mode == ExecutionMode::Unassigned {
            mode = derive_execution_mode(plan, op);
            plan.node_mut(op).set_execution_mode(mode);
        }
        let physical = Self::choose(plan, ctx, op, mode)?;
        debug!("Chose {} for {}", physical.name(), op);
        plan.node_mut(op).set_physical(physical);
        Ok(true)
    }
}

/// Copies a global limit below the merge exchange feeding it, so every partition stops after
/// `limit + offset` tuples.
#[derive(Clone, Debug, Default)]
pub struct PushLimitDown;

impl AlgebraicRewriteRule for PushLimitDown {
    fn name(&self) -> &'static str {
        "PushLimitDown"
    }

    fn triggers(&self) -> EnumSet<LogicalOperatorTag> {
        LogicalOperatorTag::Limit.into()
    }

    fn rewrite(
        &self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let op = plan.op_at(slot);
        let node = plan.node(op);
        let (LogicalOperator::Limit(limit), Some(PhysicalOperator::StreamLimitPop(pop))) =
            (node.operator(), node.physical())
        else {
            return Ok(false);
        };
        if !pop.global {
            return Ok(false);
        }
        let local_limit = limit.limit().saturating_add(limit.offset());

        let exchange_slot = plan.inputs(op)[0];
        let exchange = plan.node_at(exchange_slot);
        if !matches!(
            exchange.physical(),
            Some(PhysicalOperator::RandomMergeExchangePop(_))
                | Some(PhysicalOperator::SortMergeExchangePop(_))
        ) || !is_private(plan, exchange_slot)
        {
            return Ok(false);
        }
        let below = exchange.inputs()[0];
        if let Some(PhysicalOperator::StreamLimitPop(StreamLimitPop { global: false })) =
            plan.node_at(below).physical()
        {
            return Ok(false);
        }

        let delivered = plan.node_at(below).delivered().cloned();
        let exchange = plan.op_at(exchange_slot);
        let pushed = plan.add_operator(LogicalOperator::Limit(Limit::new(local_limit)), [below]);
        let node = plan.node_mut(pushed);
        node.set_physical(StreamLimitPop { global: false }.into());
        node.set_execution_mode(ExecutionMode::Partitioned);
        node.set_delivered(delivered);
        let pushed_slot = plan.new_slot(pushed);
        plan.set_input(exchange, 0, pushed_slot);
        debug!("Pushed limit {} below exchange {}", local_limit, exchange);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LogicalPlanBuilder;

    fn v(var: LogicalVariable) -> LogicalExpression {
        LogicalExpression::var(var)
    }

    #[test]
    fn test_pull_select_out_of_eq_join() {
        let mut builder = LogicalPlanBuilder::new();
        let (a, b) = (builder.new_var(), builder.new_var());
        let right = builder.scan("r", vec![b]).take_root();
        builder
            .scan("l", vec![a])
            .join(
                JoinKind::Inner,
                LogicalExpression::and(vec![
                    LogicalExpression::eq(v(a), v(b)),
                    LogicalExpression::call(BuiltinFunction::Lt, vec![v(a), v(b)]),
                ]),
                right,
            )
            .distribute_result(vec![v(a)]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();

        let join_slot = plan.node_at(plan.roots()[0]).inputs()[0];
        assert!(PullSelectOutOfEqJoin
            .rewrite(join_slot, &mut plan, &mut ctx)
            .unwrap());
        assert!(matches!(
            plan.operator_at(join_slot),
            LogicalOperator::Select(_)
        ));
        let new_join = plan.node_at(join_slot).inputs()[0];
        ctx.invalidate_constraints();
        let (left, right, others) =
            split_equi_join_condition(&plan, &mut ctx, plan.op_at(new_join)).unwrap();
        assert_eq!((vec![a], vec![b]), (left, right));
        assert!(others.is_empty());
    }

    #[test]
    fn test_group_by_hint_picks_hash_group_by() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(2);
        let key = builder.new_var();
        builder
            .scan("t", vars.clone())
            .group_by(vec![(key, v(vars[0]))], vec![]);
        let mut plan = builder.build();
        let slot = plan.roots()[0];
        let op = plan.op_at(slot);
        plan.node_mut(op)
            .annotations_mut()
            .insert(USE_HASH_GROUP_BY.to_string(), "true".to_string());
        let mut ctx = OptimizationContext::default();

        assert!(SetPhysicalOperators
            .rewrite(slot, &mut plan, &mut ctx)
            .unwrap());
        assert!(matches!(
            plan.node(op).physical(),
            Some(PhysicalOperator::ExternalGroupByPop(_))
        ));
        assert!(!SetPhysicalOperators
            .rewrite(slot, &mut plan, &mut ctx)
            .unwrap());
    }

    #[test]
    fn test_pushed_limit_saturates() {
        let mut builder = LogicalPlanBuilder::new();
        let x = builder.new_var();
        builder.scan("t", vec![x]).limit(1).distribute_result(vec![v(x)]);
        let mut plan = builder.build();
        let limit = plan.input_op(plan.op_at(plan.roots()[0]), 0);
        *plan.node_mut(limit).operator_mut() =
            LogicalOperator::Limit(Limit::with_offset(u64::MAX, 5));
        let mut ctx = OptimizationContext::default();

        crate::heuristic::HeuristicOptimizer::default()
            .optimize(&mut plan, &mut ctx)
            .unwrap();

        let pushed: Vec<u64> = plan
            .bfs_iterator()
            .filter_map(|op| match (plan.node(op).operator(), plan.node(op).physical()) {
                (
                    LogicalOperator::Limit(l),
                    Some(PhysicalOperator::StreamLimitPop(StreamLimitPop { global: false })),
                ) => Some(l.limit()),
                _ => None,
            })
            .collect();
        assert_eq!(vec![u64::MAX], pushed);
    }
}
