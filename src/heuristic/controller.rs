use std::collections::HashSet;

use log::{debug, trace};

use crate::config::MatchOrder;
use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::plan::{LogicalPlan, SlotId};
use crate::rules::{AlgebraicRewriteRule, RuleCollection, RuleImpl};

/// How a rule collection is driven over a plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuleController {
    /// Applies each rule until a pass over the plan fires nothing, then repeats the whole
    /// collection until a round fires nothing.
    SequentialFixpoint { descend_nested: bool },
    /// Offers each rule every operator exactly once.
    SequentialOnce { descend_nested: bool },
}

impl RuleController {
    pub fn fixpoint() -> Self {
        Self::SequentialFixpoint {
            descend_nested: true,
        }
    }

    pub fn once() -> Self {
        Self::SequentialOnce {
            descend_nested: true,
        }
    }

    /// Same controller, restricted to the operators of the outermost plan.
    pub fn top_level_only(self) -> Self {
        match self {
            Self::SequentialFixpoint { .. } => Self::SequentialFixpoint {
                descend_nested: false,
            },
            Self::SequentialOnce { .. } => Self::SequentialOnce {
                descend_nested: false,
            },
        }
    }

    fn descend_nested(&self) -> bool {
        match self {
            Self::SequentialFixpoint { descend_nested } | Self::SequentialOnce { descend_nested } => {
                *descend_nested
            }
        }
    }

    /// Runs `rules` over `plan`. Returns whether any rule fired.
    ///
    /// The first error aborts the whole run; the plan is left as the failing rule found it.
    pub fn rewrite_with_rule_collection(
        &self,
        rules: &RuleCollection,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        match self {
            Self::SequentialFixpoint { .. } => {
                let mut any_fired = false;
                let mut round = 0usize;
                loop {
                    round += 1;
                    ctx.invalidate_constraints();
                    let mut fired_in_round = false;
                    for rule in rules.rules() {
                        while self.rewrite_pass(rule, plan, ctx)? {
                            fired_in_round = true;
                        }
                    }
                    trace!(
                        "Round {} of {} fired: {}",
                        round,
                        rules.name(),
                        fired_in_round
                    );
                    if !fired_in_round {
                        break;
                    }
                    any_fired = true;
                }
                Ok(any_fired)
            }
            Self::SequentialOnce { .. } => {
                ctx.invalidate_constraints();
                let mut any_fired = false;
                for rule in rules.rules() {
                    any_fired |= self.rewrite_pass(rule, plan, ctx)?;
                }
                Ok(any_fired)
            }
        }
    }

    /// Offers `rule` every reachable operator once. Returns whether it fired anywhere.
    fn rewrite_pass(
        &self,
        rule: &RuleImpl,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let mut pass = RewritePass {
            rule,
            descend_nested: self.descend_nested(),
            visited: HashSet::new(),
            fired: false,
        };
        for root in plan.roots().to_vec() {
            pass.visit(root, plan, ctx)?;
        }
        Ok(pass.fired)
    }
}

struct RewritePass<'a> {
    rule: &'a RuleImpl,
    descend_nested: bool,
    visited: HashSet<SlotId>,
    fired: bool,
}

impl<'a> RewritePass<'a> {
    fn visit(
        &mut self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<()> {
        if !self.visited.insert(slot) {
            return Ok(());
        }
        match self.rule.match_order() {
            MatchOrder::TopDown => {
                self.try_rule(slot, plan, ctx)?;
                self.visit_children(slot, plan, ctx)
            }
            MatchOrder::BottomUp => {
                self.visit_children(slot, plan, ctx)?;
                self.try_rule(slot, plan, ctx)
            }
        }
    }

    fn visit_children(
        &mut self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<()> {
        let op = plan.op_at(slot);
        let children = if self.descend_nested {
            plan.children(op)
        } else {
            plan.inputs(op).to_vec()
        };
        for child in children {
            self.visit(child, plan, ctx)?;
        }
        Ok(())
    }

    fn try_rule(
        &mut self,
        slot: SlotId,
        plan: &mut LogicalPlan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<()> {
        let op = plan.op_at(slot);
        if !self.rule.triggers().contains(plan.node(op).operator().tag()) {
            return Ok(());
        }
        trace!("Trying to apply rule {} to {}", self.rule.name(), op);
        if self.rule.rewrite(slot, plan, ctx)? {
            debug!("Rule {} fired at {}", self.rule.name(), slot);
            ctx.invalidate_constraints();
            if ctx.config().trace_plans {
                trace!(
                    "Plan after applying rule {}:\n{}",
                    self.rule.name(),
                    plan.explain()
                );
            }
            self.fired = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LogicalExpression;
    use crate::operator::LogicalOperator;
    use crate::plan::LogicalPlanBuilder;
    use crate::rules::{BreakSelectIntoConjuncts, ConsolidateSelects};

    #[test]
    fn test_fixpoint_reaches_idempotent_plan() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(2);
        builder
            .scan("t", vars.clone())
            .select(LogicalExpression::and(vec![
                LogicalExpression::eq(LogicalExpression::var(vars[0]), LogicalExpression::constant(1)),
                LogicalExpression::eq(LogicalExpression::var(vars[1]), LogicalExpression::constant(2)),
            ]))
            .distribute_result(vec![LogicalExpression::var(vars[0])]);
        let mut plan = builder.build();
        let mut ctx = OptimizationContext::default();
        ctx.observe_plan(&plan);

        let rules = RuleCollection::new(
            "split",
            vec![BreakSelectIntoConjuncts.into()],
        );
        let controller = RuleController::fixpoint();
        assert!(controller
            .rewrite_with_rule_collection(&rules, &mut plan, &mut ctx)
            .unwrap());
        let selects = plan
            .bfs_iterator()
            .filter(|op| matches!(plan.node(*op).operator(), LogicalOperator::Select(_)))
            .count();
        assert_eq!(2, selects);
        assert!(!controller
            .rewrite_with_rule_collection(&rules, &mut plan, &mut ctx)
            .unwrap());

        let merge = RuleCollection::new("merge", vec![ConsolidateSelects.into()]);
        assert!(controller
            .rewrite_with_rule_collection(&merge, &mut plan, &mut ctx)
            .unwrap());
        assert!(!controller
            .rewrite_with_rule_collection(&merge, &mut plan, &mut ctx)
            .unwrap());
    }

    #[test]
    fn test_top_level_only_keeps_nested_flag_off() {
        assert_eq!(
            RuleController::SequentialFixpoint {
                descend_nested: false
            },
            RuleController::fixpoint().top_level_only()
        );
    }
}
