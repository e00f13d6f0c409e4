use algebra_opt_framework::context::OptimizationContext;
use algebra_opt_framework::expr::{BuiltinFunction, LogicalExpression, LogicalVariable};
use algebra_opt_framework::heuristic::HeuristicOptimizer;
use algebra_opt_framework::jobgen::{
    ConnectorDescriptor, JobGraphBuilder, LocationConstraint, MicroOperatorDescriptor,
    OperatorDescriptor, PlanCompiler,
};
use algebra_opt_framework::operator::{JoinKind, LogicalOperator};
use algebra_opt_framework::physical::PhysicalOperator;
use algebra_opt_framework::plan::{LogicalPlan, LogicalPlanBuilder};

fn var(v: LogicalVariable) -> LogicalExpression {
    LogicalExpression::var(v)
}

/// `select o_cust = c_id and c_name = "x"` over the cross product of orders and customers.
fn cross_product_plan() -> (LogicalPlan, Vec<LogicalVariable>) {
    let mut builder = LogicalPlanBuilder::new();
    let vars = builder.new_vars(4);
    let (o_id, o_cust, c_id, c_name) = (vars[0], vars[1], vars[2], vars[3]);
    let customers = builder.scan("customers", vec![c_id, c_name]).take_root();
    builder
        .scan("orders", vec![o_id, o_cust])
        .join(JoinKind::Inner, LogicalExpression::true_constant(), customers)
        .select(LogicalExpression::and(vec![
            LogicalExpression::eq(var(o_cust), var(c_id)),
            LogicalExpression::eq(var(c_name), LogicalExpression::constant("x")),
        ]))
        .distribute_result(vec![var(o_id)]);
    (builder.build(), vars)
}

#[test]
fn test_cross_product_becomes_hash_join() {
    let (mut plan, vars) = cross_product_plan();
    let mut ctx = OptimizationContext::default();
    HeuristicOptimizer::default()
        .optimize(&mut plan, &mut ctx)
        .unwrap();

    let joins: Vec<_> = plan
        .bfs_iterator()
        .filter(|op| matches!(plan.node(*op).operator(), LogicalOperator::Join(_)))
        .collect();
    assert_eq!(1, joins.len());
    let join = plan.node(joins[0]);
    match join.operator() {
        LogicalOperator::Join(j) => assert_eq!(
            &LogicalExpression::eq(var(vars[1]), var(vars[2])),
            j.condition()
        ),
        _ => unreachable!(),
    }
    assert!(matches!(
        join.physical(),
        Some(PhysicalOperator::HybridHashJoinPop(_))
    ));

    let spec = PlanCompiler::with_context(&plan, &ctx)
        .compile(JobGraphBuilder::with_config(ctx.config()))
        .unwrap();

    // orders, customers, the select on customers, the join and the result.
    assert_eq!(5, spec.node_count());
    assert_eq!(4, spec.edge_count());
    let hash_edges = spec
        .graph()
        .edge_weights()
        .filter(|e| matches!(e.connector, ConnectorDescriptor::MToNHashPartitioning { .. }))
        .count();
    assert_eq!(2, hash_edges);

    assert_eq!(1, spec.roots().len());
    let root = spec.node(spec.roots()[0]);
    assert!(matches!(
        root.descriptor.descriptor,
        OperatorDescriptor::Micro(MicroOperatorDescriptor::Printer { .. })
    ));
    assert_eq!(LocationConstraint::Single("nc1".to_string()), root.location);
    assert!(spec.explain().contains("HybridHashJoin"));

    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(1, json["roots"].as_array().unwrap().len());
    assert!(json.to_string().contains("MToNHashPartitioning"));
}

#[test]
fn test_group_by_gets_partitioned_and_sorted() {
    let mut builder = LogicalPlanBuilder::new();
    let vars = builder.new_vars(2);
    let (key, sum) = (builder.new_var(), builder.new_var());
    builder
        .scan("t", vars.clone())
        .group_by(
            vec![(key, var(vars[0]))],
            vec![(
                sum,
                LogicalExpression::call(BuiltinFunction::Sum, vec![var(vars[1])]),
            )],
        )
        .distribute_result(vec![var(key), var(sum)]);
    let mut plan = builder.build();
    let mut ctx = OptimizationContext::default();
    HeuristicOptimizer::default()
        .optimize(&mut plan, &mut ctx)
        .unwrap();

    let spec = PlanCompiler::with_context(&plan, &ctx)
        .compile(JobGraphBuilder::with_config(ctx.config()))
        .unwrap();
    let group_by = spec
        .graph()
        .node_indices()
        .find(|id| {
            matches!(
                spec.node(*id).descriptor.descriptor,
                OperatorDescriptor::PreclusteredGroupBy { .. }
            )
        })
        .expect("group-by node");
    match &spec.node(group_by).descriptor.descriptor {
        OperatorDescriptor::PreclusteredGroupBy { keys, nested, .. } => {
            assert_eq!(&vec![0], keys);
            assert_eq!(1, nested.len());
            assert!(matches!(
                nested[0].operators.as_slice(),
                [
                    MicroOperatorDescriptor::NestedTupleSource,
                    MicroOperatorDescriptor::Aggregate { .. }
                ]
            ));
        }
        _ => unreachable!(),
    }
    assert!(matches!(
        spec.node(group_by).location,
        LocationConstraint::Partitioned(_)
    ));

    // The sort feeding the group-by reads hash partitioned input.
    let (sort, _) = spec.inputs_of(group_by)[0];
    assert!(matches!(
        spec.node(sort).descriptor.descriptor,
        OperatorDescriptor::Sort { .. }
    ));
    assert!(matches!(
        spec.inputs_of(sort)[0].1.connector,
        ConnectorDescriptor::MToNHashPartitioning { .. }
    ));
}

#[test]
fn test_optimized_plan_is_stable() {
    let (mut plan, _) = cross_product_plan();
    let mut ctx = OptimizationContext::default();
    let optimizer = HeuristicOptimizer::default();
    optimizer.optimize(&mut plan, &mut ctx).unwrap();
    let explained = plan.explain();
    optimizer.optimize(&mut plan, &mut ctx).unwrap();
    assert_eq!(explained, plan.explain());
}

#[test]
fn test_explain_renders_every_job_node() {
    let (mut plan, _) = cross_product_plan();
    let mut ctx = OptimizationContext::default();
    HeuristicOptimizer::default()
        .optimize(&mut plan, &mut ctx)
        .unwrap();
    let spec = PlanCompiler::with_context(&plan, &ctx)
        .compile(JobGraphBuilder::with_config(ctx.config()))
        .unwrap();

    let explained = spec.explain();
    for title in ["Node", "Operators", "Descriptor", "Location", "Inputs"] {
        assert!(explained.contains(title), "missing column {}", title);
    }
    assert!(explained.contains("nc1"));
    assert!(explained.contains("MToNHashPartitioning"));
    // Title row plus one row per job node.
    let rows = explained
        .lines()
        .filter(|line| line.starts_with("| "))
        .count();
    assert!(rows >= spec.node_count() + 1);
}
