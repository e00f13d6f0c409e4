use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;
use std::mem::swap;

use derive_more::Display;
use itertools::Itertools;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{OptError, OptResult};
use crate::expr::{LogicalExpression, LogicalVariable};
use crate::operator::{
    Aggregate, Assign, DataSourceScan, Distinct, DistributeResult, ExecutionMode, GroupBy, Join,
    JoinKind, Limit, LogicalOperator, NestedTupleSource, Order, OrderKind, Project, Select,
    Subplan, VariablePropagationPolicy,
};
use crate::physical::PhysicalOperator;
use crate::properties::StructuralPropertiesVector;

/// Stable handle of an operator in the plan arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
#[display(fmt = "op{}", _0)]
pub struct OperatorId(u32);

/// Handle of a DAG edge cell. The cell holds the operator currently at that position.
///
/// Two parents sharing a subplan hold the same slot; replacing the slot's target rewrites
/// the input of every parent at once.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
#[display(fmt = "slot{}", _0)]
pub struct SlotId(u32);

/// A plan nested inside an operator, e.g. the aggregation pipeline of a group-by.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct NestedPlan {
    roots: Vec<SlotId>,
}

impl NestedPlan {
    pub fn new(roots: Vec<SlotId>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[SlotId] {
        &self.roots
    }
}

pub type Annotations = BTreeMap<String, String>;

/// One operator in a plan together with its cached derived state.
#[derive(Debug, Clone)]
pub struct OperatorNode {
    id: OperatorId,
    operator: LogicalOperator,
    inputs: SmallVec<[SlotId; 2]>,
    physical: Option<PhysicalOperator>,
    execution_mode: ExecutionMode,
    delivered: Option<StructuralPropertiesVector>,
    annotations: Annotations,
}

impl OperatorNode {
    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn operator(&self) -> &LogicalOperator {
        &self.operator
    }

    pub fn operator_mut(&mut self) -> &mut LogicalOperator {
        &mut self.operator
    }

    pub fn inputs(&self) -> &[SlotId] {
        &self.inputs
    }

    pub fn physical(&self) -> Option<&PhysicalOperator> {
        self.physical.as_ref()
    }

    pub fn set_physical(&mut self, physical: PhysicalOperator) {
        self.physical = Some(physical);
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
    }

    /// Properties delivered by this operator, as of the last enforcement pass.
    pub fn delivered(&self) -> Option<&StructuralPropertiesVector> {
        self.delivered.as_ref()
    }

    pub fn set_delivered(&mut self, delivered: Option<StructuralPropertiesVector>) {
        self.delivered = delivered;
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// An operator DAG with a set of root slots.
///
/// Operators and slots live in arenas and are never freed; the plan is whatever is reachable
/// from the roots. Rewrites replace slot targets instead of mutating operators that may be
/// observed by several parents.
#[derive(Debug, Clone, Default)]
pub struct LogicalPlan {
    operators: Vec<OperatorNode>,
    slots: Vec<OperatorId>,
    roots: Vec<SlotId>,
}

/// Breadth first iterator over the operators reachable from a set of slots.
struct BFSPlanNodeIter<'a> {
    plan: &'a LogicalPlan,
    visited: HashSet<OperatorId>,
    cur_level: Vec<OperatorId>,
    next_level: Vec<OperatorId>,
}

impl<'a> Iterator for BFSPlanNodeIter<'a> {
    type Item = OperatorId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
            self.cur_level.reverse();
        }

        if let Some(op) = self.cur_level.pop() {
            for slot in self.plan.children(op) {
                let child = self.plan.op_at(slot);
                if self.visited.insert(child) {
                    self.next_level.push(child);
                }
            }

            Some(op)
        } else {
            None
        }
    }
}

impl LogicalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator<I>(&mut self, operator: LogicalOperator, inputs: I) -> OperatorId
    where
        I: IntoIterator<Item = SlotId>,
    {
        let id = OperatorId(self.operators.len() as u32);
        self.operators.push(OperatorNode {
            id,
            operator,
            inputs: inputs.into_iter().collect(),
            physical: None,
            execution_mode: ExecutionMode::default(),
            delivered: None,
            annotations: Annotations::new(),
        });
        id
    }

    pub fn new_slot(&mut self, op: OperatorId) -> SlotId {
        let slot = SlotId(self.slots.len() as u32);
        self.slots.push(op);
        slot
    }

    /// Adds an operator and a fresh slot pointing at it.
    pub fn insert<I>(&mut self, operator: LogicalOperator, inputs: I) -> SlotId
    where
        I: IntoIterator<Item = SlotId>,
    {
        let op = self.add_operator(operator, inputs);
        self.new_slot(op)
    }

    pub fn op_at(&self, slot: SlotId) -> OperatorId {
        self.slots[slot.0 as usize]
    }

    /// Points `slot` at `op`. Every parent holding the slot observes the change.
    pub fn set_slot(&mut self, slot: SlotId, op: OperatorId) {
        self.slots[slot.0 as usize] = op;
    }

    pub fn node(&self, op: OperatorId) -> &OperatorNode {
        &self.operators[op.0 as usize]
    }

    pub fn node_mut(&mut self, op: OperatorId) -> &mut OperatorNode {
        &mut self.operators[op.0 as usize]
    }

    pub fn node_at(&self, slot: SlotId) -> &OperatorNode {
        self.node(self.op_at(slot))
    }

    pub fn operator_at(&self, slot: SlotId) -> &LogicalOperator {
        self.node_at(slot).operator()
    }

    pub fn operator_at_mut(&mut self, slot: SlotId) -> &mut LogicalOperator {
        let op = self.op_at(slot);
        self.node_mut(op).operator_mut()
    }

    pub fn inputs(&self, op: OperatorId) -> &[SlotId] {
        self.node(op).inputs()
    }

    pub fn input_op(&self, op: OperatorId, idx: usize) -> OperatorId {
        self.op_at(self.inputs(op)[idx])
    }

    pub fn set_input(&mut self, op: OperatorId, idx: usize, slot: SlotId) {
        self.node_mut(op).inputs[idx] = slot;
    }

    /// Input slots followed by the roots of every nested plan.
    pub fn children(&self, op: OperatorId) -> Vec<SlotId> {
        let node = self.node(op);
        node.inputs
            .iter()
            .copied()
            .chain(
                node.operator
                    .nested_plans()
                    .iter()
                    .flat_map(|p| p.roots().iter().copied()),
            )
            .collect()
    }

    pub fn roots(&self) -> &[SlotId] {
        &self.roots
    }

    pub fn add_root(&mut self, slot: SlotId) {
        self.roots.push(slot);
    }

    pub fn bfs_iterator(&self) -> impl Iterator<Item = OperatorId> + '_ {
        let cur_level: Vec<OperatorId> = self.roots.iter().rev().map(|s| self.op_at(*s)).collect();
        BFSPlanNodeIter {
            plan: self,
            visited: cur_level.iter().copied().collect(),
            cur_level,
            next_level: vec![],
        }
    }

    /// Number of (operator, input index) edges that reference each reachable slot.
    pub fn slot_parent_counts(&self) -> HashMap<SlotId, usize> {
        let mut counts = HashMap::new();
        for op in self.bfs_iterator() {
            for slot in self.inputs(op) {
                *counts.entry(*slot).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Operators that hold `slot` as one of their inputs.
    pub fn parents_of(&self, slot: SlotId) -> Vec<(OperatorId, usize)> {
        self.bfs_iterator()
            .flat_map(|op| {
                self.inputs(op)
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| **s == slot)
                    .map(|(i, _)| (op, i))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Variables produced at the roots of the nested plans of `op`.
    pub fn nested_produced_variables(&self, op: OperatorId) -> Vec<LogicalVariable> {
        self.node(op)
            .operator
            .nested_plans()
            .iter()
            .flat_map(|p| p.roots().iter())
            .flat_map(|slot| self.operator_at(*slot).produced_variables())
            .collect()
    }

    pub fn propagation_policy(&self, op: OperatorId) -> VariablePropagationPolicy {
        self.node(op)
            .operator
            .propagation_policy(self.nested_produced_variables(op))
    }

    /// Output schema of `op`, derived from its inputs through its propagation policy.
    pub fn schema_of(&self, op: OperatorId) -> OptResult<Vec<LogicalVariable>> {
        self.memoized_schema(op, &mut HashMap::new())
    }

    /// Shared inputs are derived once per call.
    fn memoized_schema(
        &self,
        op: OperatorId,
        memo: &mut HashMap<OperatorId, Vec<LogicalVariable>>,
    ) -> OptResult<Vec<LogicalVariable>> {
        if let Some(schema) = memo.get(&op) {
            return Ok(schema.clone());
        }
        let input_schemas = self
            .inputs(op)
            .iter()
            .map(|slot| self.memoized_schema(self.op_at(*slot), memo))
            .collect::<OptResult<Vec<_>>>()?;
        let outer = match self.node(op).operator() {
            LogicalOperator::NestedTupleSource(nts) => Some(self.outer_input_schema(nts.outer())?),
            _ => None,
        };
        let inputs: Vec<&[LogicalVariable]> = input_schemas.iter().map(|s| s.as_slice()).collect();
        let schema = self
            .propagation_policy(op)
            .compute_schema(op, &inputs, outer.as_deref())?;
        memo.insert(op, schema.clone());
        Ok(schema)
    }

    /// Schema seen by nested tuple sources of the nested plans of `outer`.
    pub fn outer_input_schema(&self, outer: OperatorId) -> OptResult<Vec<LogicalVariable>> {
        match self.inputs(outer).first() {
            Some(slot) => self.schema_of(self.op_at(*slot)),
            None => Err(OptError::malformed_operator(outer, "nested plan owner without input").into()),
        }
    }

    /// Variables read by any reachable operator, nested plans included.
    pub fn all_used_variables(&self) -> HashSet<LogicalVariable> {
        self.bfs_iterator()
            .flat_map(|op| self.node(op).operator().used_variables())
            .collect()
    }

    pub fn max_variable_id(&self) -> Option<u32> {
        self.bfs_iterator()
            .flat_map(|op| {
                let operator = self.node(op).operator();
                let mut vars = operator.produced_variables();
                vars.extend(operator.used_variables());
                if let LogicalOperator::DataSourceScan(scan) = operator {
                    vars.extend(scan.variables().iter().copied());
                }
                vars
            })
            .map(|v| v.id())
            .max()
    }

    /// Indented text rendering, one operator per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.explain_slot(*root, 0, &mut out);
        }
        out
    }

    fn explain_slot(&self, slot: SlotId, indent: usize, out: &mut String) {
        let node = self.node_at(slot);
        let physical = node
            .physical()
            .map(|p| format!(" [{}]", p.name()))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}{}{} -- {}",
            "  ".repeat(indent),
            describe(node.operator()),
            physical,
            node.execution_mode()
        );
        for nested in node.operator().nested_plans() {
            let _ = writeln!(out, "{}{{", "  ".repeat(indent + 1));
            for root in nested.roots() {
                self.explain_slot(*root, indent + 2, out);
            }
            let _ = writeln!(out, "{}}}", "  ".repeat(indent + 1));
        }
        for input in node.inputs() {
            self.explain_slot(*input, indent + 1, out);
        }
    }
}

fn describe(operator: &LogicalOperator) -> String {
    let bindings = |vars: &[LogicalVariable], exprs: &[&LogicalExpression]| {
        vars.iter()
            .zip(exprs.iter())
            .map(|(v, e)| format!("{} <- {}", v, e))
            .join(", ")
    };
    match operator {
        LogicalOperator::EmptyTupleSource => "empty-tuple-source".to_string(),
        LogicalOperator::NestedTupleSource(_) => "nested-tuple-source".to_string(),
        LogicalOperator::DataSourceScan(scan) => format!(
            "data-scan [{}] <- {}",
            scan.output_variables().iter().join(", "),
            scan.source()
        ),
        LogicalOperator::Assign(a) => format!(
            "assign [{}]",
            bindings(a.variables(), &a.expressions().iter().collect::<Vec<_>>())
        ),
        LogicalOperator::Select(s) => format!("select ({})", s.condition()),
        LogicalOperator::Project(p) => format!("project ([{}])", p.variables().iter().join(", ")),
        LogicalOperator::Join(j) => format!("join {} ({})", j.kind(), j.condition()),
        LogicalOperator::GroupBy(g) => format!(
            "group by ([{}]) decor ([{}])",
            g.keys().iter().map(|(v, e)| format!("{} := {}", v, e)).join(", "),
            g.decors().iter().map(|(v, e)| format!("{} := {}", v, e)).join(", ")
        ),
        LogicalOperator::Aggregate(a) => format!(
            "aggregate [{}]",
            bindings(a.variables(), &a.expressions().iter().collect::<Vec<_>>())
        ),
        LogicalOperator::Distinct(d) => format!("distinct ({})", d.expressions().iter().join(", ")),
        LogicalOperator::Order(o) => format!(
            "order {}",
            o.columns().iter().map(|(k, e)| format!("({} {})", k, e)).join(" ")
        ),
        LogicalOperator::Limit(l) => format!("limit {} offset {}", l.limit(), l.offset()),
        LogicalOperator::Exchange => "exchange".to_string(),
        LogicalOperator::Subplan(_) => "subplan".to_string(),
        LogicalOperator::DistributeResult(r) => {
            format!("distribute result [{}]", r.expressions().iter().join(", "))
        }
    }
}

/// Fluent construction of plans, used by frontends and tests.
///
/// Every method puts a new operator on top of the current root. Multi input operators take
/// their other inputs as slots obtained from [`LogicalPlanBuilder::take_root`].
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
    root: Option<SlotId>,
    next_variable: u32,
}

impl Default for LogicalPlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicalPlanBuilder {
    pub fn new() -> Self {
        Self {
            plan: LogicalPlan::new(),
            root: None,
            next_variable: 0,
        }
    }

    pub fn new_var(&mut self) -> LogicalVariable {
        self.next_variable += 1;
        LogicalVariable::new(self.next_variable)
    }

    pub fn new_vars(&mut self, n: usize) -> Vec<LogicalVariable> {
        (0..n).map(|_| self.new_var()).collect()
    }

    fn reset_root(&mut self, new_root: SlotId) -> &mut Self {
        self.root = Some(new_root);
        self
    }

    fn push_unary(&mut self, operator: LogicalOperator) -> &mut Self {
        let input = self.root.expect("operator requires an input");
        let slot = self.plan.insert(operator, [input]);
        self.reset_root(slot)
    }

    pub fn empty_tuple_source(&mut self) -> &mut Self {
        let slot = self.plan.insert(LogicalOperator::EmptyTupleSource, []);
        self.reset_root(slot)
    }

    pub fn scan<S: Into<String>>(&mut self, source: S, variables: Vec<LogicalVariable>) -> &mut Self {
        let scan = DataSourceScan::new(source, variables);
        let slot = self.plan.insert(LogicalOperator::DataSourceScan(scan), []);
        self.reset_root(slot)
    }

    pub fn scan_with_keys<S: Into<String>>(
        &mut self,
        source: S,
        variables: Vec<LogicalVariable>,
        primary_keys: Vec<LogicalVariable>,
    ) -> &mut Self {
        let scan = DataSourceScan::with_primary_keys(source, variables, primary_keys);
        let slot = self.plan.insert(LogicalOperator::DataSourceScan(scan), []);
        self.reset_root(slot)
    }

    pub fn assign(
        &mut self,
        variables: Vec<LogicalVariable>,
        expressions: Vec<LogicalExpression>,
    ) -> &mut Self {
        self.push_unary(LogicalOperator::Assign(Assign::new(variables, expressions)))
    }

    pub fn select(&mut self, condition: LogicalExpression) -> &mut Self {
        self.push_unary(LogicalOperator::Select(Select::new(condition)))
    }

    pub fn project(&mut self, variables: Vec<LogicalVariable>) -> &mut Self {
        self.push_unary(LogicalOperator::Project(Project::new(variables)))
    }

    /// Joins the current root (left) with `right`.
    pub fn join(&mut self, kind: JoinKind, condition: LogicalExpression, right: SlotId) -> &mut Self {
        let left = self.root.expect("join requires a left input");
        let slot = self
            .plan
            .insert(LogicalOperator::Join(Join::new(kind, condition)), [left, right]);
        self.reset_root(slot)
    }

    /// Group-by whose single nested plan aggregates `aggregates` over each group.
    pub fn group_by(
        &mut self,
        keys: Vec<(LogicalVariable, LogicalExpression)>,
        aggregates: Vec<(LogicalVariable, LogicalExpression)>,
    ) -> &mut Self {
        let (vars, exprs) = aggregates.into_iter().unzip();
        self.group_by_with(
            keys,
            vec![],
            vec![LogicalOperator::Aggregate(Aggregate::new(vars, exprs))],
        )
    }

    /// Group-by with a nested plan made of `nested` stacked on a nested tuple source.
    pub fn group_by_with(
        &mut self,
        keys: Vec<(LogicalVariable, LogicalExpression)>,
        decors: Vec<(LogicalVariable, LogicalExpression)>,
        nested: Vec<LogicalOperator>,
    ) -> &mut Self {
        let input = self.root.expect("group-by requires an input");
        let op = self.plan.add_operator(
            LogicalOperator::GroupBy(GroupBy::new(keys, decors, vec![])),
            [input],
        );
        let nested_plan = self.nested_chain(op, nested);
        if let LogicalOperator::GroupBy(g) = self.plan.node_mut(op).operator_mut() {
            g.nested_plans_mut().push(nested_plan);
        }
        let slot = self.plan.new_slot(op);
        self.reset_root(slot)
    }

    /// Subplan whose nested plan is `nested` stacked on a nested tuple source.
    pub fn subplan(&mut self, nested: Vec<LogicalOperator>) -> &mut Self {
        let input = self.root.expect("subplan requires an input");
        let op = self
            .plan
            .add_operator(LogicalOperator::Subplan(Subplan::new(vec![])), [input]);
        let nested_plan = self.nested_chain(op, nested);
        if let LogicalOperator::Subplan(s) = self.plan.node_mut(op).operator_mut() {
            s.nested_plans_mut().push(nested_plan);
        }
        let slot = self.plan.new_slot(op);
        self.reset_root(slot)
    }

    fn nested_chain(&mut self, outer: OperatorId, nested: Vec<LogicalOperator>) -> NestedPlan {
        let mut top = self.plan.insert(
            LogicalOperator::NestedTupleSource(NestedTupleSource::new(outer)),
            [],
        );
        for operator in nested {
            top = self.plan.insert(operator, [top]);
        }
        NestedPlan::new(vec![top])
    }

    pub fn aggregate(
        &mut self,
        variables: Vec<LogicalVariable>,
        expressions: Vec<LogicalExpression>,
    ) -> &mut Self {
        self.push_unary(LogicalOperator::Aggregate(Aggregate::new(variables, expressions)))
    }

    pub fn distinct(&mut self, expressions: Vec<LogicalExpression>) -> &mut Self {
        self.push_unary(LogicalOperator::Distinct(Distinct::new(expressions)))
    }

    pub fn order(&mut self, columns: Vec<(OrderKind, LogicalExpression)>) -> &mut Self {
        self.push_unary(LogicalOperator::Order(Order::new(columns)))
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.push_unary(LogicalOperator::Limit(Limit::new(limit)))
    }

    pub fn distribute_result(&mut self, expressions: Vec<LogicalExpression>) -> &mut Self {
        self.push_unary(LogicalOperator::DistributeResult(DistributeResult::new(
            expressions,
        )))
    }

    pub fn root(&self) -> Option<SlotId> {
        self.root
    }

    /// Hands out the current root, leaving the builder ready for another branch.
    pub fn take_root(&mut self) -> SlotId {
        self.root.take().expect("builder has no root")
    }

    pub fn set_root(&mut self, slot: SlotId) -> &mut Self {
        self.reset_root(slot)
    }

    /// The plan built so far.
    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Finishes the plan with the current root as its only root.
    pub fn build(mut self) -> LogicalPlan {
        if let Some(root) = self.root.take() {
            self.plan.add_root(root);
        }
        self.plan
    }

    pub fn build_with_roots(mut self, roots: Vec<SlotId>) -> LogicalPlan {
        for root in roots {
            self.plan.add_root(root);
        }
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_slot_is_visited_once() {
        let mut builder = LogicalPlanBuilder::new();
        let x = builder.new_var();
        let shared = builder.scan("t", vec![x]).take_root();
        let left = builder
            .set_root(shared)
            .select(LogicalExpression::true_constant())
            .take_root();
        builder
            .set_root(shared)
            .join(JoinKind::Inner, LogicalExpression::true_constant(), left);
        let plan = builder.build();

        assert_eq!(3, plan.bfs_iterator().count());
        assert_eq!(Some(&2), plan.slot_parent_counts().get(&shared));
    }

    #[test]
    fn test_schema_of_diamond() {
        let mut builder = LogicalPlanBuilder::new();
        let (x, a, b) = (builder.new_var(), builder.new_var(), builder.new_var());
        let shared = builder.scan("t", vec![x]).take_root();
        let right = builder
            .set_root(shared)
            .assign(vec![b], vec![LogicalExpression::constant(2)])
            .take_root();
        builder
            .set_root(shared)
            .assign(vec![a], vec![LogicalExpression::constant(1)])
            .join(JoinKind::Inner, LogicalExpression::true_constant(), right);
        let plan = builder.build();

        let root = plan.op_at(plan.roots()[0]);
        assert_eq!(vec![x, a, x, b], plan.schema_of(root).unwrap());
        assert_eq!(vec![x], plan.schema_of(plan.op_at(shared)).unwrap());
    }

    #[test]
    fn test_schema_of_group_by() {
        let mut builder = LogicalPlanBuilder::new();
        let vars = builder.new_vars(2);
        let (key, count) = (builder.new_var(), builder.new_var());
        builder.scan("t", vars.clone()).group_by(
            vec![(key, LogicalExpression::var(vars[0]))],
            vec![(
                count,
                LogicalExpression::call(
                    crate::expr::BuiltinFunction::Count,
                    vec![LogicalExpression::var(vars[1])],
                ),
            )],
        );
        let plan = builder.build();
        let root = plan.op_at(plan.roots()[0]);
        assert_eq!(vec![key, count], plan.schema_of(root).unwrap());
    }
}
