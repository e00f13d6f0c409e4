//! Lowering of an optimized plan into a job graph for the execution engine.
//!
//! [`PlanCompiler`] walks the plan and contributes runtime descriptors to a [`JobBuilder`];
//! [`JobGraphBuilder`] is the builder that assembles a [`JobSpecification`].

use anyhow::bail;

use crate::config::OptimizerConfig;
use crate::error::{OptError, OptResult};
use crate::expr::{FunctionRegistry, LogicalExpression, LogicalVariable};
use crate::operator::LogicalOperator;
use crate::physical::PhysicalOperatorTrait;
use crate::plan::{LogicalPlan, OperatorId};

mod descriptor;
pub use descriptor::*;
mod compiler;
pub use compiler::*;
mod builder;
pub use builder::*;

/// Sink of the compiler's contributions.
///
/// Indices are 0 based. `build_spec` is called once, after everything else.
pub trait JobBuilder {
    type Spec;

    fn contribute_operator(
        &mut self,
        op: OperatorId,
        descriptor: JobOperatorDescriptor,
    ) -> OptResult<()>;

    fn contribute_graph_edge(
        &mut self,
        src: OperatorId,
        src_output: usize,
        dst: OperatorId,
        dst_input: usize,
    ) -> OptResult<()>;

    fn contribute_connector(
        &mut self,
        op: OperatorId,
        connector: ConnectorDescriptor,
        target: TargetConstraint,
    ) -> OptResult<()>;

    fn build_spec(self, roots: &[OperatorId]) -> OptResult<Self::Spec>;
}

/// What a physical operator sees of the plan while producing its runtime descriptor.
pub struct JobGenContext<'a> {
    pub plan: &'a LogicalPlan,
    pub op: OperatorId,
    pub schema: &'a [LogicalVariable],
    pub input_schemas: &'a [Vec<LogicalVariable>],
    pub registry: &'a FunctionRegistry,
    pub config: &'a OptimizerConfig,
}

impl<'a> JobGenContext<'a> {
    pub fn operator(&self) -> &'a LogicalOperator {
        self.plan.node(self.op).operator()
    }

    /// Schema of the first input, or the empty schema for sources.
    pub fn input_schema(&self) -> &'a [LogicalVariable] {
        self.input_schemas
            .first()
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn compile(&self, expr: &LogicalExpression) -> OptResult<RuntimeExpression> {
        compile_expression(self.op, expr, self.input_schema(), self.registry)
    }

    pub fn field(&self, v: LogicalVariable) -> OptResult<usize> {
        field_index(self.op, v, self.input_schema())
    }

    pub fn field_of_input(&self, input: usize, v: LogicalVariable) -> OptResult<usize> {
        let schema = self
            .input_schemas
            .get(input)
            .map(|s| s.as_slice())
            .unwrap_or(&[]);
        field_index(self.op, v, schema)
    }

    /// Fields of the variables an expression list consists of. Non-variable expressions are
    /// malformed at this point.
    pub fn variable_fields<'e, I>(&self, exprs: I) -> OptResult<Vec<usize>>
    where
        I: IntoIterator<Item = &'e LogicalExpression>,
    {
        exprs
            .into_iter()
            .map(|e| match e {
                LogicalExpression::Variable(v) => self.field(*v),
                other => Err(OptError::malformed_operator(
                    self.op,
                    format!("expected a variable, found {}", other),
                )
                .into()),
            })
            .collect()
    }

    /// Compiles every nested plan of the operator into a pipeline.
    pub fn nested_pipelines(&self) -> OptResult<Vec<PipelineDescriptor>> {
        self.operator()
            .nested_plans()
            .iter()
            .flat_map(|p| p.roots().iter())
            .map(|root| self.nested_pipeline(self.plan.op_at(*root)))
            .collect()
    }

    fn nested_pipeline(&self, root: OperatorId) -> OptResult<PipelineDescriptor> {
        let mut chain = vec![root];
        let mut cur = root;
        while let Some(input) = self.plan.inputs(cur).first() {
            if self.plan.inputs(cur).len() > 1 {
                bail!(OptError::not_implemented("multi input operators in nested plans"));
            }
            cur = self.plan.op_at(*input);
            chain.push(cur);
        }
        chain.reverse();

        let input_layout = self.input_schema().to_vec();
        let mut layouts: Vec<Vec<LogicalVariable>> = vec![];
        let mut operators = vec![];
        for op in chain {
            let schema = self.plan.schema_of(op)?;
            let input_schemas = vec![layouts
                .last()
                .cloned()
                .unwrap_or_else(|| input_layout.clone())];
            let physical = self.plan.node(op).physical().ok_or_else(|| {
                OptError::malformed_operator(op, "no physical operator assigned")
            })?;
            let gen = JobGenContext {
                plan: self.plan,
                op,
                schema: &schema,
                input_schemas: &input_schemas,
                registry: self.registry,
                config: self.config,
            };
            match physical.runtime_contribution(&gen)? {
                RuntimeContribution::Operator(OperatorDescriptor::Micro(micro)) => {
                    operators.push(micro)
                }
                _ => bail!(OptError::malformed_operator(
                    op,
                    "nested plans may only contain micro operators"
                )),
            }
            layouts.push(schema);
        }
        Ok(PipelineDescriptor {
            operators,
            input_layout,
            layouts,
        })
    }
}

fn field_index(op: OperatorId, v: LogicalVariable, schema: &[LogicalVariable]) -> OptResult<usize> {
    schema.iter().position(|s| *s == v).ok_or_else(|| {
        OptError::VariableOutOfScope {
            operator: op,
            variable: v,
        }
        .into()
    })
}

/// Compiles `expr` against `schema`. Every referenced variable must be in the schema and every
/// function must be registered.
pub fn compile_expression(
    op: OperatorId,
    expr: &LogicalExpression,
    schema: &[LogicalVariable],
    registry: &FunctionRegistry,
) -> OptResult<RuntimeExpression> {
    Ok(match expr {
        LogicalExpression::Constant(c) => RuntimeExpression::Constant(c.clone()),
        LogicalExpression::Variable(v) => RuntimeExpression::Field(field_index(op, *v, schema)?),
        LogicalExpression::FunctionCall(call) => {
            registry.lookup(call.function())?;
            RuntimeExpression::Call {
                function: call.function().clone(),
                arguments: call
                    .arguments()
                    .iter()
                    .map(|a| compile_expression(op, a, schema, registry))
                    .collect::<OptResult<_>>()?,
            }
        }
    })
}
