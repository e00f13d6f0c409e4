use std::collections::HashSet;

use crate::constraint::{EquivalenceClassMap, FunctionalDependency};
use crate::error::OptResult;
use crate::expr::LogicalExpression;
use crate::operator::{JoinKind, LogicalOperator};
use crate::plan::{LogicalPlan, OperatorId};

/// Equivalence classes and functional dependencies that hold on an operator's output.
#[derive(Clone, Debug, Default)]
pub struct OperatorConstraints {
    pub equivalence: EquivalenceClassMap,
    pub fds: Vec<FunctionalDependency>,
}

impl OperatorConstraints {
    fn absorb(&mut self, other: &OperatorConstraints) {
        self.equivalence.absorb(&other.equivalence);
        self.fds.extend(other.fds.iter().cloned());
    }

    fn add_predicate(&mut self, predicate: &LogicalExpression) {
        predicate.get_constraints_and_equiv_classes(&mut self.fds, &mut self.equivalence);
    }
}

/// Derives the constraints of `op` from the already derived constraints of its inputs.
pub fn derive_constraints(
    plan: &LogicalPlan,
    op: OperatorId,
    inputs: &[OperatorConstraints],
) -> OptResult<OperatorConstraints> {
    let mut derived = OperatorConstraints::default();
    match plan.node(op).operator() {
        LogicalOperator::EmptyTupleSource | LogicalOperator::NestedTupleSource(_) => {}
        LogicalOperator::DataSourceScan(scan) => {
            let keys = scan.primary_keys();
            let outputs = scan.output_variables();
            if !keys.is_empty() && keys.iter().all(|k| outputs.contains(k)) {
                let tail = outputs
                    .iter()
                    .copied()
                    .filter(|v| !keys.contains(v))
                    .collect::<Vec<_>>();
                if !tail.is_empty() {
                    derived.fds.push(FunctionalDependency::new(keys.to_vec(), tail));
                }
            }
        }
        LogicalOperator::Select(select) => {
            inputs.iter().for_each(|i| derived.absorb(i));
            derived.add_predicate(select.condition());
        }
        LogicalOperator::Join(join) => match join.kind() {
            JoinKind::Inner => {
                inputs.iter().for_each(|i| derived.absorb(i));
                derived.add_predicate(join.condition());
            }
            JoinKind::LeftOuter => {
                if let Some(left) = inputs.first() {
                    derived.absorb(left);
                }
                let outer: HashSet<_> = plan
                    .schema_of(plan.input_op(op, 0))?
                    .into_iter()
                    .collect();
                join.condition()
                    .get_constraints_for_outer_join(&mut derived.fds, &outer);
            }
        },
        LogicalOperator::Assign(assign) => {
            inputs.iter().for_each(|i| derived.absorb(i));
            for (v, e) in assign.bindings() {
                match e {
                    LogicalExpression::Variable(source) => {
                        derived.equivalence.merge(*source, *v);
                        derived
                            .fds
                            .push(FunctionalDependency::new(vec![*source], vec![*v]));
                        derived
                            .fds
                            .push(FunctionalDependency::new(vec![*v], vec![*source]));
                    }
                    LogicalExpression::Constant(c) => {
                        derived.equivalence.set_constant(*v, c.clone());
                        derived.fds.push(FunctionalDependency::new(vec![], vec![*v]));
                    }
                    LogicalExpression::FunctionCall(_) => {
                        derived
                            .fds
                            .push(FunctionalDependency::new(e.variables(), vec![*v]));
                    }
                }
            }
        }
        LogicalOperator::Project(project) => {
            let vars = project.variables();
            for input in inputs {
                derived.equivalence.absorb(&input.equivalence.restrict_to(vars));
                for fd in &input.fds {
                    let tail = fd
                        .tail()
                        .iter()
                        .copied()
                        .filter(|v| vars.contains(v))
                        .collect::<Vec<_>>();
                    if !tail.is_empty() && fd.head().iter().all(|h| vars.contains(h)) {
                        derived
                            .fds
                            .push(FunctionalDependency::new(fd.head().to_vec(), tail));
                    }
                }
            }
        }
        LogicalOperator::GroupBy(group_by) => {
            let mut tail: Vec<_> = group_by.decors().iter().map(|(v, _)| *v).collect();
            tail.extend(plan.nested_produced_variables(op));
            if !tail.is_empty() {
                derived
                    .fds
                    .push(FunctionalDependency::new(group_by.key_variables(), tail));
            }
        }
        LogicalOperator::Aggregate(aggregate) => {
            if !aggregate.variables().is_empty() {
                derived.fds.push(FunctionalDependency::new(
                    vec![],
                    aggregate.variables().to_vec(),
                ));
            }
        }
        LogicalOperator::Distinct(_)
        | LogicalOperator::Order(_)
        | LogicalOperator::Limit(_)
        | LogicalOperator::Exchange
        | LogicalOperator::Subplan(_)
        | LogicalOperator::DistributeResult(_) => {
            inputs.iter().for_each(|i| derived.absorb(i));
        }
    }
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BuiltinFunction, ConstantValue};
    use crate::plan::LogicalPlanBuilder;

    fn derive_all(plan: &LogicalPlan, op: OperatorId) -> OperatorConstraints {
        let inputs = plan
            .inputs(op)
            .iter()
            .map(|s| derive_all(plan, plan.op_at(*s)))
            .collect::<Vec<_>>();
        derive_constraints(plan, op, &inputs).unwrap()
    }

    #[test]
    fn test_select_over_assign() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(3);
        builder
            .scan("t", vars[..2].to_vec())
            .assign(vec![vars[2]], vec![LogicalExpression::var(vars[0])])
            .select(LogicalExpression::eq(
                LogicalExpression::var(vars[1]),
                LogicalExpression::constant(5),
            ));
        let plan = builder.build();
        let root = plan.op_at(plan.roots()[0]);
        let constraints = derive_all(&plan, root);

        assert!(constraints.equivalence.equivalent(vars[0], vars[2]));
        assert_eq!(
            Some(&ConstantValue::Int64(5)),
            constraints
                .equivalence
                .class_of(vars[1])
                .and_then(|c| c.constant())
        );
    }

    #[test]
    fn test_left_outer_join_keeps_outer_side_only() {
        let mut builder = LogicalPlanBuilder::new();
        let (a, b) = (builder.new_var(), builder.new_var());
        let right = builder.scan("r", vec![b]).take_root();
        builder.scan("l", vec![a]).join(
            JoinKind::LeftOuter,
            LogicalExpression::eq(LogicalExpression::var(a), LogicalExpression::var(b)),
            right,
        );
        let plan = builder.build();
        let root = plan.op_at(plan.roots()[0]);
        let constraints = derive_all(&plan, root);

        assert!(!constraints.equivalence.equivalent(a, b));
        assert_eq!(
            vec![FunctionalDependency::new(vec![a], vec![b])],
            constraints.fds
        );
    }

    #[test]
    fn test_group_by_keys_determine_aggregates() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(2);
        let (key, sum) = (builder.new_var(), builder.new_var());
        builder.scan("t", vars.clone()).group_by(
            vec![(key, LogicalExpression::var(vars[0]))],
            vec![(
                sum,
                LogicalExpression::call(
                    BuiltinFunction::Sum,
                    vec![LogicalExpression::var(vars[1])],
                ),
            )],
        );
        let plan = builder.build();
        let root = plan.op_at(plan.roots()[0]);
        let constraints = derive_all(&plan, root);

        assert_eq!(
            vec![FunctionalDependency::new(vec![key], vec![sum])],
            constraints.fds
        );
    }
}
