use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::{debug, trace};

use crate::config::OptimizerConfig;
use crate::context::OptimizationContext;
use crate::error::{OptError, OptResult};
use crate::expr::{FunctionRegistry, LogicalVariable};
use crate::jobgen::{JobBuilder, JobGenContext, JobOperatorDescriptor, RuntimeContribution};
use crate::physical::PhysicalOperatorTrait;
use crate::plan::{LogicalPlan, OperatorId};

/// Lowers an optimized plan into contributions to a [`JobBuilder`].
///
/// Operators are compiled in post order. The schema of an operator is computed from the
/// schemas of its inputs before the operator contributes its descriptor. An operator reached
/// by several parents is compiled once and gets one output edge per parent.
pub struct PlanCompiler<'a> {
    plan: &'a LogicalPlan,
    registry: &'a FunctionRegistry,
    config: &'a OptimizerConfig,
    schemas: HashMap<OperatorId, Vec<LogicalVariable>>,
    compiled: HashSet<OperatorId>,
    /// Consumers of every compiled operator as `(parent, input index)`, in discovery order.
    consumers: Vec<(OperatorId, Vec<(OperatorId, usize)>)>,
    consumer_index: HashMap<OperatorId, usize>,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(
        plan: &'a LogicalPlan,
        registry: &'a FunctionRegistry,
        config: &'a OptimizerConfig,
    ) -> Self {
        Self {
            plan,
            registry,
            config,
            schemas: HashMap::new(),
            compiled: HashSet::new(),
            consumers: vec![],
            consumer_index: HashMap::new(),
        }
    }

    pub fn with_context(plan: &'a LogicalPlan, ctx: &'a OptimizationContext) -> Self {
        Self::new(plan, ctx.registry(), ctx.config())
    }

    /// Compiles the whole plan into `builder` and returns the built specification.
    pub fn compile<B: JobBuilder>(mut self, mut builder: B) -> OptResult<B::Spec> {
        let roots: Vec<OperatorId> = self
            .plan
            .roots()
            .iter()
            .map(|slot| self.plan.op_at(*slot))
            .collect();
        for root in &roots {
            self.compile_operator(*root, &mut builder)?;
        }

        for (child, parents) in &self.consumers {
            if parents.len() > 1 {
                debug!("Operator {} fans out to {} consumers", child, parents.len());
            }
            for (output, (parent, input)) in parents.iter().enumerate() {
                builder.contribute_graph_edge(*child, output, *parent, *input)?;
            }
        }
        builder.build_spec(&roots)
    }

    /// Schema computed for `op`, once it has been compiled.
    pub fn schema(&self, op: OperatorId) -> Option<&[LogicalVariable]> {
        self.schemas.get(&op).map(|s| s.as_slice())
    }

    fn record_consumer(&mut self, child: OperatorId, parent: OperatorId, input: usize) {
        let idx = *self.consumer_index.entry(child).or_insert_with(|| {
            self.consumers.push((child, vec![]));
            self.consumers.len() - 1
        });
        self.consumers[idx].1.push((parent, input));
    }

    fn compile_operator<B: JobBuilder>(
        &mut self,
        op: OperatorId,
        builder: &mut B,
    ) -> OptResult<()> {
        if !self.compiled.insert(op) {
            return Ok(());
        }
        let inputs: Vec<OperatorId> = self
            .plan
            .inputs(op)
            .iter()
            .map(|slot| self.plan.op_at(*slot))
            .collect();
        for (idx, child) in inputs.iter().enumerate() {
            self.record_consumer(*child, op, idx);
            self.compile_operator(*child, builder)?;
        }

        let input_schemas = inputs
            .iter()
            .map(|child| {
                self.schemas.get(child).cloned().ok_or_else(|| {
                    OptError::Compilation(format!("schema of {} is not computed yet", child)).into()
                })
            })
            .collect::<OptResult<Vec<_>>>()?;
        let schema = {
            let borrowed: Vec<&[LogicalVariable]> =
                input_schemas.iter().map(|s| s.as_slice()).collect();
            self.plan
                .propagation_policy(op)
                .compute_schema(op, &borrowed, None)?
        };
        trace!("Schema of {} is [{}]", op, schema.iter().join(", "));
        self.schemas.insert(op, schema.clone());

        let node = self.plan.node(op);
        let physical = node
            .physical()
            .ok_or_else(|| OptError::malformed_operator(op, "no physical operator assigned"))?;
        let gen = JobGenContext {
            plan: self.plan,
            op,
            schema: &schema,
            input_schemas: &input_schemas,
            registry: self.registry,
            config: self.config,
        };
        match physical.runtime_contribution(&gen)? {
            RuntimeContribution::Operator(descriptor) => builder.contribute_operator(
                op,
                JobOperatorDescriptor {
                    descriptor,
                    schema,
                    input_schemas,
                    execution_mode: node.execution_mode(),
                },
            ),
            RuntimeContribution::Connector(connector, target) => {
                builder.contribute_connector(op, connector, target)
            }
        }
    }
}
