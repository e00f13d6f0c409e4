use algebra_opt_framework::constraint::EquivalenceClassMap;
use algebra_opt_framework::error::{error_kind, OptError};
use algebra_opt_framework::expr::LogicalVariable;
use algebra_opt_framework::properties::{
    domains_compatible, NodeDomain, Partitioning, PropertiesCoordination,
};

fn v(id: u32) -> LogicalVariable {
    LogicalVariable::new(id)
}

#[test]
fn test_coordination_through_equivalent_columns() {
    let (a, b) = (v(1), v(2));
    let mut equiv = EquivalenceClassMap::default();
    equiv.merge(a, b);

    let required = Partitioning::hashed(vec![b], None);
    let first = Partitioning::hashed(vec![a], None);
    let coordinated = PropertiesCoordination::EquivalenceClasses
        .coordinate(Some(&required), Some(&first), &equiv)
        .unwrap();

    assert!(coordinated.satisfied);
    assert_eq!(Some(Partitioning::hashed(vec![a], None)), coordinated.partitioning);
}

#[test]
fn test_coordination_drops_unmatched_required_columns() {
    let (a, b, c) = (v(1), v(2), v(3));
    let mut equiv = EquivalenceClassMap::default();
    equiv.merge(a, b);

    let required = Partitioning::hashed(vec![b, c], None);
    let first = Partitioning::hashed(vec![a], None);
    let coordinated = PropertiesCoordination::EquivalenceClasses
        .coordinate(Some(&required), Some(&first), &equiv)
        .unwrap();

    assert!(coordinated.satisfied);
    assert_eq!(Some(Partitioning::hashed(vec![a], None)), coordinated.partitioning);
}

#[test]
fn test_coordination_without_link_is_unsatisfiable() {
    let required = Partitioning::hashed(vec![v(2)], None);
    let first = Partitioning::hashed(vec![v(1)], None);
    let err = PropertiesCoordination::EquivalenceClasses
        .coordinate(Some(&required), Some(&first), &EquivalenceClassMap::default())
        .unwrap_err();
    assert!(matches!(error_kind(&err), Some(OptError::Unsatisfiable(_))));
}

#[test]
fn test_missing_domain_is_compatible() {
    let cluster = NodeDomain::new(["nc1", "nc2"]);
    let other = NodeDomain::new(["nc3"]);
    assert!(domains_compatible(None, Some(&cluster)));
    assert!(domains_compatible(Some(&cluster), Some(&cluster.clone())));
    assert!(!domains_compatible(Some(&cluster), Some(&other)));
}
