use algebra_opt_framework::constraint::{EquivalenceClassMap, FunctionalDependency};
use algebra_opt_framework::expr::{
    BuiltinFunction, ConstantValue, LogicalExpression, LogicalVariable,
};

fn v(id: u32) -> LogicalVariable {
    LogicalVariable::new(id)
}

fn var(id: u32) -> LogicalExpression {
    LogicalExpression::var(v(id))
}

#[test]
fn test_nested_conjunctions_flatten() {
    let a = LogicalExpression::eq(var(1), LogicalExpression::constant(1));
    let b = LogicalExpression::eq(var(2), LogicalExpression::constant(2));
    let c = LogicalExpression::eq(var(3), var(1));
    let predicate =
        LogicalExpression::and(vec![a.clone(), LogicalExpression::and(vec![b.clone(), c.clone()])]);

    assert_eq!(vec![a.clone(), b, c], predicate.conjuncts());

    let mut parts = vec![];
    assert!(!a.split_into_conjuncts(&mut parts));
    assert!(parts.is_empty());
}

#[test]
fn test_split_conjunction_is_one_level_deep() {
    let p1 = LogicalExpression::eq(var(1), LogicalExpression::constant(1));
    let p2 = LogicalExpression::eq(var(2), var(3));
    let p3 = LogicalExpression::and(vec![var(4), var(5)]);
    let predicate = LogicalExpression::and(vec![p1.clone(), p2.clone(), p3.clone()]);

    let mut parts = vec![];
    assert!(predicate.split_into_conjuncts(&mut parts));
    assert_eq!(vec![p1, p2, p3], parts);
}

#[test]
fn test_failed_split_leaves_output_untouched() {
    let p1 = LogicalExpression::eq(var(1), LogicalExpression::constant(1));
    let single = LogicalExpression::call(BuiltinFunction::And, vec![p1.clone()]);
    let existing = LogicalExpression::eq(var(9), var(8));

    let mut parts = vec![existing.clone()];
    assert!(!single.split_into_conjuncts(&mut parts));
    assert_eq!(vec![existing.clone()], parts);

    assert!(!p1.split_into_conjuncts(&mut parts));
    assert_eq!(vec![existing], parts);
}

#[test]
fn test_constant_and_variable_equalities() {
    let predicate = LogicalExpression::and(vec![
        LogicalExpression::eq(var(1), LogicalExpression::constant(5)),
        LogicalExpression::eq(var(2), var(1)),
    ]);
    let mut fds = vec![];
    let mut equiv = EquivalenceClassMap::default();
    predicate.get_constraints_and_equiv_classes(&mut fds, &mut equiv);

    assert_eq!(
        vec![
            FunctionalDependency::new(vec![], vec![v(1)]),
            FunctionalDependency::new(vec![v(2)], vec![v(1)]),
            FunctionalDependency::new(vec![v(1)], vec![v(2)]),
        ],
        fds
    );
    assert_eq!(1, equiv.classes().count());
    let class = equiv.class_of(v(2)).unwrap();
    assert!(class.contains(v(1)));
    assert_eq!(Some(&ConstantValue::Int64(5)), class.constant());
}

#[test]
fn test_other_predicates_contribute_nothing() {
    let predicate = LogicalExpression::call(BuiltinFunction::Lt, vec![var(1), var(2)]);
    let mut fds = vec![];
    let mut equiv = EquivalenceClassMap::default();
    predicate.get_constraints_and_equiv_classes(&mut fds, &mut equiv);
    assert!(fds.is_empty());
    assert!(equiv.is_empty());
}

#[test]
fn test_inline_variable() {
    let mut expr = LogicalExpression::call(BuiltinFunction::NumericAdd, vec![var(1), var(2)]);
    assert!(expr.inline_var(v(1), &LogicalExpression::constant(3)));
    assert_eq!(
        LogicalExpression::call(
            BuiltinFunction::NumericAdd,
            vec![LogicalExpression::constant(3), var(2)]
        ),
        expr
    );
    assert!(!expr.inline_var(v(1), &LogicalExpression::constant(3)));
}
