use log::trace;

use crate::config::MatchOrder;
use crate::context::OptimizationContext;
use crate::error::{OptError, OptResult};
use crate::plan::{LogicalPlan, SlotId};
use crate::rules::AlgebraicRewriteRule;

/// Checks the well-formedness of every operator and caches its schema.
///
/// Verifies input counts, function signatures and that every variable an operator reads is
/// produced by its inputs. Never changes the plan.
#[derive(Clone, Debug, Default)]
pub struct InferTypes;

impl AlgebraicRewriteRule for InferTypes {
    fn name(&self) -> &'static str {
        "InferTypes"
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
        let operator = plan.node(op).operator();
        if plan.inputs(op).len() != operator.arity() {
            return Err(OptError::malformed_operator(
                op,
                format!(
                    "{} takes {} inputs, found {}",
                    operator.tag(),
                    operator.arity(),
                    plan.inputs(op).len()
                ),
            )
            .into());
        }
        for expr in operator.expressions() {
            ctx.registry().validate(expr)?;
        }

        let mut in_scope = vec![];
        for input in plan.inputs(op).to_vec() {
            in_scope.extend(ctx.schema(plan, plan.op_at(input))?);
        }
        for v in operator.used_variables() {
            if !in_scope.contains(&v) {
                return Err(OptError::VariableOutOfScope {
                    operator: op,
                    variable: v,
                }
                .into());
            }
        }

        let schema = ctx.schema(plan, op)?;
        trace!("Schema of {} is [{}]", op, itertools::join(schema.iter(), ", "));
        Ok(false)
    }
}
