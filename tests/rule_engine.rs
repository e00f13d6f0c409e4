use algebra_opt_framework::context::OptimizationContext;
use algebra_opt_framework::error::{error_kind, OptError};
use algebra_opt_framework::expr::{LogicalExpression, LogicalVariable};
use algebra_opt_framework::heuristic::{HeuristicOptimizer, OptimizationPhase};
use algebra_opt_framework::operator::{JoinKind, LogicalOperator};
use algebra_opt_framework::plan::{LogicalPlan, LogicalPlanBuilder};

fn var(v: LogicalVariable) -> LogicalExpression {
    LogicalExpression::var(v)
}

fn join_plan() -> LogicalPlan {
    let mut builder = LogicalPlanBuilder::new();
    let vars = builder.new_vars(4);
    let right = builder.scan("s", vec![vars[2], vars[3]]).take_root();
    builder
        .scan("r", vec![vars[0], vars[1]])
        .join(JoinKind::Inner, LogicalExpression::true_constant(), right)
        .select(LogicalExpression::and(vec![
            LogicalExpression::eq(var(vars[1]), var(vars[2])),
            LogicalExpression::eq(var(vars[3]), LogicalExpression::constant(7)),
        ]))
        .distribute_result(vec![var(vars[0])]);
    builder.build()
}

#[test]
fn test_every_phase_reaches_a_fixpoint() {
    let mut plan = join_plan();
    let mut ctx = OptimizationContext::default();
    ctx.observe_plan(&plan);
    for phase in HeuristicOptimizer::default().phases() {
        let rules = phase.rules();
        let controller = phase.controller();
        controller
            .rewrite_with_rule_collection(&rules, &mut plan, &mut ctx)
            .unwrap();
        let fired_again = controller
            .rewrite_with_rule_collection(&rules, &mut plan, &mut ctx)
            .unwrap();
        assert!(!fired_again, "phase {} fired on its own output", phase);
    }
}

#[test]
fn test_normalization_turns_cross_product_into_join() {
    let mut plan = join_plan();
    let mut ctx = OptimizationContext::default();
    HeuristicOptimizer::with_phases(vec![
        OptimizationPhase::TypeInference,
        OptimizationPhase::Normalization,
        OptimizationPhase::PredicatePushdown,
        OptimizationPhase::Consolidation,
    ])
    .optimize(&mut plan, &mut ctx)
    .unwrap();

    let selects = plan
        .bfs_iterator()
        .filter(|op| matches!(plan.node(*op).operator(), LogicalOperator::Select(_)))
        .count();
    assert_eq!(1, selects);
    let join = plan
        .bfs_iterator()
        .find_map(|op| match plan.node(op).operator() {
            LogicalOperator::Join(j) => Some(j.condition().clone()),
            _ => None,
        })
        .unwrap();
    assert!(!join.is_true_constant());
}

#[test]
fn test_distinct_without_physical_operator_fails() {
    let mut builder = LogicalPlanBuilder::new();
    let x = builder.new_var();
    builder
        .scan("t", vec![x])
        .distinct(vec![var(x)])
        .distribute_result(vec![var(x)]);
    let mut plan = builder.build();
    let mut ctx = OptimizationContext::default();

    let err = HeuristicOptimizer::with_phases(vec![OptimizationPhase::PhysicalAllLevels])
        .optimize(&mut plan, &mut ctx)
        .unwrap_err();
    assert!(matches!(
        error_kind(&err),
        Some(OptError::NotImplemented(_))
    ));
}

#[test]
fn test_type_inference_rejects_unbound_variable() {
    let mut builder = LogicalPlanBuilder::new();
    let (x, y) = (builder.new_var(), builder.new_var());
    builder
        .scan("t", vec![x])
        .select(LogicalExpression::eq(var(y), LogicalExpression::constant(1)));
    let mut plan = builder.build();
    let mut ctx = OptimizationContext::default();

    let err = HeuristicOptimizer::with_phases(vec![OptimizationPhase::TypeInference])
        .optimize(&mut plan, &mut ctx)
        .unwrap_err();
    assert!(matches!(
        error_kind(&err),
        Some(OptError::VariableOutOfScope { variable, .. }) if *variable == y
    ));
}
