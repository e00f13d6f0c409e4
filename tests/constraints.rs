use algebra_opt_framework::constraint::{normalize_grouping_columns, FunctionalDependency};
use algebra_opt_framework::context::OptimizationContext;
use algebra_opt_framework::expr::{ConstantValue, LogicalExpression};
use algebra_opt_framework::operator::JoinKind;
use algebra_opt_framework::plan::LogicalPlanBuilder;

#[test]
fn test_select_constraints_through_context() {
    let mut builder = LogicalPlanBuilder::new();
    let (x, y) = (builder.new_var(), builder.new_var());
    builder
        .scan("t", vec![x, y])
        .select(LogicalExpression::and(vec![
            LogicalExpression::eq(LogicalExpression::var(x), LogicalExpression::constant(5)),
            LogicalExpression::eq(LogicalExpression::var(y), LogicalExpression::var(x)),
        ]));
    let plan = builder.build();
    let root = plan.op_at(plan.roots()[0]);

    let mut ctx = OptimizationContext::default();
    let constraints = ctx.constraints(&plan, root).unwrap();

    let classes: Vec<_> = constraints.equivalence.classes().collect();
    assert_eq!(1, classes.len());
    assert!(classes[0].contains(x) && classes[0].contains(y));
    assert_eq!(Some(&ConstantValue::Int64(5)), classes[0].constant());
    assert_eq!(
        vec![
            FunctionalDependency::new(vec![], vec![x]),
            FunctionalDependency::new(vec![y], vec![x]),
            FunctionalDependency::new(vec![x], vec![y]),
        ],
        constraints.fds
    );

    // Both grouping columns are bound to a constant.
    assert!(
        normalize_grouping_columns(&[x, y], &constraints.equivalence, &constraints.fds)
            .is_empty()
    );
}

#[test]
fn test_inner_join_merges_both_sides() {
    let mut builder = LogicalPlanBuilder::new();
    let (a, k) = (builder.new_var(), builder.new_var());
    let b = builder.new_var();
    let right = builder.scan("r", vec![b]).take_root();
    builder.scan_with_keys("l", vec![k, a], vec![k]).join(
        JoinKind::Inner,
        LogicalExpression::eq(LogicalExpression::var(a), LogicalExpression::var(b)),
        right,
    );
    let plan = builder.build();
    let root = plan.op_at(plan.roots()[0]);

    let mut ctx = OptimizationContext::default();
    let constraints = ctx.constraints(&plan, root).unwrap();
    assert!(constraints.equivalence.equivalent(a, b));
    assert!(constraints
        .fds
        .contains(&FunctionalDependency::new(vec![k], vec![a])));

    // The primary key determines the join column, and through it its equivalent.
    assert_eq!(
        vec![k],
        normalize_grouping_columns(&[k, b], &constraints.equivalence, &constraints.fds)
    );
}
