use algebra_opt_framework::context::OptimizationContext;
use algebra_opt_framework::error::OptResult;
use algebra_opt_framework::expr::{ConstantValue, LogicalExpression};
use algebra_opt_framework::jobgen::{
    ConnectorDescriptor, JobBuilder, JobOperatorDescriptor, MicroOperatorDescriptor,
    OperatorDescriptor, PlanCompiler, RuntimeExpression, TargetConstraint,
};
use algebra_opt_framework::operator::LogicalOperator;
use algebra_opt_framework::physical::{
    AssignPop, DistributeResultPop, EmptyTupleSourcePop, PhysicalOperator,
};
use algebra_opt_framework::plan::{LogicalPlan, LogicalPlanBuilder, OperatorId};

/// Keeps every contribution in the order it was made.
#[derive(Default)]
struct RecordingBuilder {
    operators: Vec<(OperatorId, JobOperatorDescriptor)>,
    edges: Vec<(OperatorId, usize, OperatorId, usize)>,
    connectors: Vec<OperatorId>,
    roots: Vec<OperatorId>,
}

impl JobBuilder for RecordingBuilder {
    type Spec = Self;

    fn contribute_operator(
        &mut self,
        op: OperatorId,
        descriptor: JobOperatorDescriptor,
    ) -> OptResult<()> {
        self.operators.push((op, descriptor));
        Ok(())
    }

    fn contribute_graph_edge(
        &mut self,
        src: OperatorId,
        src_output: usize,
        dst: OperatorId,
        dst_input: usize,
    ) -> OptResult<()> {
        self.edges.push((src, src_output, dst, dst_input));
        Ok(())
    }

    fn contribute_connector(
        &mut self,
        op: OperatorId,
        _connector: ConnectorDescriptor,
        _target: TargetConstraint,
    ) -> OptResult<()> {
        self.connectors.push(op);
        Ok(())
    }

    fn build_spec(mut self, roots: &[OperatorId]) -> OptResult<Self> {
        self.roots = roots.to_vec();
        Ok(self)
    }
}

fn set_micro_operators(plan: &mut LogicalPlan) {
    let ops: Vec<_> = plan.bfs_iterator().collect();
    for op in ops {
        let physical: PhysicalOperator = match plan.node(op).operator() {
            LogicalOperator::EmptyTupleSource => EmptyTupleSourcePop.into(),
            LogicalOperator::Assign(_) => AssignPop.into(),
            LogicalOperator::DistributeResult(_) => DistributeResultPop.into(),
            other => panic!("unexpected operator {:?}", other),
        };
        plan.node_mut(op).set_physical(physical);
    }
}

#[test]
fn test_schemas_are_computed_before_use() {
    let mut builder = LogicalPlanBuilder::new();
    let x = builder.new_var();
    builder
        .empty_tuple_source()
        .assign(vec![x], vec![LogicalExpression::constant(1)])
        .distribute_result(vec![LogicalExpression::var(x)]);
    let mut plan = builder.build();
    set_micro_operators(&mut plan);
    let ctx = OptimizationContext::default();

    let recorded = PlanCompiler::with_context(&plan, &ctx)
        .compile(RecordingBuilder::default())
        .unwrap();

    assert!(recorded.connectors.is_empty());
    let descriptors: Vec<_> = recorded
        .operators
        .iter()
        .map(|(_, d)| d.descriptor.clone())
        .collect();
    assert_eq!(
        vec![
            OperatorDescriptor::Micro(MicroOperatorDescriptor::EmptyTupleSource),
            OperatorDescriptor::Micro(MicroOperatorDescriptor::Assign {
                expressions: vec![RuntimeExpression::Constant(ConstantValue::Int64(1))]
            }),
            OperatorDescriptor::Micro(MicroOperatorDescriptor::Printer {
                expressions: vec![RuntimeExpression::Field(0)]
            }),
        ],
        descriptors
    );

    let (_, assign) = &recorded.operators[1];
    assert_eq!(1, assign.input_schemas.len());
    assert!(assign.input_schemas[0].is_empty());
    assert_eq!(vec![x], assign.schema);
    let (root, result) = &recorded.operators[2];
    assert_eq!(vec![vec![x]], result.input_schemas);
    assert_eq!(vec![*root], recorded.roots);

    // One edge per producer/consumer pair, each on the producer's first output.
    assert_eq!(2, recorded.edges.len());
    assert!(recorded.edges.iter().all(|(_, output, _, input)| *output == 0 && *input == 0));
}

#[test]
fn test_shared_operator_fans_out() {
    let mut builder = LogicalPlanBuilder::new();
    let (x, y) = (builder.new_var(), builder.new_var());
    let shared = builder.empty_tuple_source().take_root();
    let first = builder
        .set_root(shared)
        .assign(vec![x], vec![LogicalExpression::constant(1)])
        .take_root();
    let second = builder
        .set_root(shared)
        .assign(vec![y], vec![LogicalExpression::constant(2)])
        .take_root();
    let mut plan = builder.build_with_roots(vec![first, second]);
    set_micro_operators(&mut plan);
    let ctx = OptimizationContext::default();

    let recorded = PlanCompiler::with_context(&plan, &ctx)
        .compile(RecordingBuilder::default())
        .unwrap();

    // The source is compiled once.
    assert_eq!(3, recorded.operators.len());
    let source = plan.op_at(shared);
    let outputs: Vec<_> = recorded
        .edges
        .iter()
        .filter(|(src, ..)| *src == source)
        .map(|(_, output, dst, _)| (*output, *dst))
        .collect();
    assert_eq!(
        vec![(0, plan.op_at(first)), (1, plan.op_at(second))],
        outputs
    );
}
