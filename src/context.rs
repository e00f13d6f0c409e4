//! Compile scoped state shared by rules, property negotiation and job generation.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::config::OptimizerConfig;
use crate::constraint::{derive_constraints, OperatorConstraints};
use crate::error::OptResult;
use crate::expr::{FunctionRegistry, LogicalVariable};
use crate::plan::{LogicalPlan, OperatorId};

/// Services a rewrite or compilation run calls into: fresh variables, the function registry,
/// and per-operator caches.
///
/// One context belongs to one compilation; it is written and read by the same single
/// threaded pass.
pub struct OptimizationContext {
    config: OptimizerConfig,
    registry: FunctionRegistry,
    next_variable: u32,
    constraints: HashMap<OperatorId, OperatorConstraints>,
    schemas: HashMap<OperatorId, Vec<LogicalVariable>>,
    dont_apply: HashSet<(&'static str, OperatorId)>,
}

impl Default for OptimizationContext {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl OptimizationContext {
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_registry(config, FunctionRegistry::with_builtins())
    }

    pub fn with_registry(config: OptimizerConfig, registry: FunctionRegistry) -> Self {
        Self {
            config,
            registry,
            next_variable: 0,
            constraints: HashMap::new(),
            schemas: HashMap::new(),
            dont_apply: HashSet::new(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Makes sure fresh variables never collide with the ones already used by `plan`.
    pub fn observe_plan(&mut self, plan: &LogicalPlan) {
        if let Some(max) = plan.max_variable_id() {
            self.next_variable = self.next_variable.max(max);
        }
    }

    pub fn new_var(&mut self) -> LogicalVariable {
        self.next_variable += 1;
        LogicalVariable::new(self.next_variable)
    }

    /// Constraints holding on the output of `op`, derived on demand and cached.
    pub fn constraints(
        &mut self,
        plan: &LogicalPlan,
        op: OperatorId,
    ) -> OptResult<OperatorConstraints> {
        if let Some(cached) = self.constraints.get(&op) {
            return Ok(cached.clone());
        }
        let inputs = plan
            .inputs(op)
            .iter()
            .map(|slot| self.constraints(plan, plan.op_at(*slot)))
            .collect::<OptResult<Vec<_>>>()?;
        let derived = derive_constraints(plan, op, &inputs)?;
        trace!(
            "Derived {} dependencies for {}",
            derived.fds.len(),
            op
        );
        self.constraints.insert(op, derived.clone());
        Ok(derived)
    }

    /// Drops derived constraints and schemas. Called whenever the plan changes.
    pub fn invalidate_constraints(&mut self) {
        self.constraints.clear();
        self.schemas.clear();
    }

    pub fn cache_schema(&mut self, op: OperatorId, schema: Vec<LogicalVariable>) {
        self.schemas.insert(op, schema);
    }

    pub fn cached_schema(&self, op: OperatorId) -> Option<&[LogicalVariable]> {
        self.schemas.get(&op).map(|s| s.as_slice())
    }

    /// Output schema of `op`, computed through the plan and cached.
    pub fn schema(&mut self, plan: &LogicalPlan, op: OperatorId) -> OptResult<Vec<LogicalVariable>> {
        if let Some(schema) = self.schemas.get(&op) {
            return Ok(schema.clone());
        }
        let schema = plan.schema_of(op)?;
        self.schemas.insert(op, schema.clone());
        Ok(schema)
    }

    /// Whether `rule` has marked `op` as already handled.
    pub fn is_dont_apply(&self, rule: &'static str, op: OperatorId) -> bool {
        self.dont_apply.contains(&(rule, op))
    }

    pub fn add_dont_apply(&mut self, rule: &'static str, op: OperatorId) {
        self.dont_apply.insert((rule, op));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LogicalExpression;
    use crate::plan::LogicalPlanBuilder;

    #[test]
    fn test_fresh_variables_do_not_collide() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(3);
        builder
            .scan("t", vars.clone())
            .distribute_result(vec![LogicalExpression::var(vars[2])]);
        let plan = builder.build();

        let mut ctx = OptimizationContext::default();
        ctx.observe_plan(&plan);
        let fresh = ctx.new_var();
        assert!(!vars.contains(&fresh));
    }
}
