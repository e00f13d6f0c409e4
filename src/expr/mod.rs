//! Logical expressions.
//!
//! Every place an expression appears in a plan is owned by its operator, and rewrite rules
//! address it through `&mut LogicalExpression` handed out by the operator (see
//! [`crate::operator::LogicalOperator::expressions_mut`]). Replacing `*slot` swaps the
//! expression without restructuring the operator.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use derive_more::Display;
use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::constraint::{EquivalenceClassMap, FunctionalDependency};

mod function;
pub use function::*;

/// Opaque identity of a binding. Carries no value.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize,
)]
#[display(fmt = "$${}", _0)]
pub struct LogicalVariable(u32);

impl LogicalVariable {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConstantValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Double(OrderedFloat<f64>),
    String(String),
}

impl Display for ConstantValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for ConstantValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<i32> for ConstantValue {
    fn from(v: i32) -> Self {
        Self::Int64(v.into())
    }
}

impl From<bool> for ConstantValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for ConstantValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Optimizer hint attached to a function call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ExpressionAnnotation {
    Hint(String),
    Selectivity(OrderedFloat<f64>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumAsInner)]
pub enum LogicalExpression {
    Constant(ConstantValue),
    Variable(LogicalVariable),
    FunctionCall(FunctionCallExpression),
}

/// A call of a scalar, aggregate, stateful or unnest function.
///
/// Equality and hashing cover the function identity and the *ordered* arguments only.
/// Annotations are ignored, and `f(a, b)` never equals `f(b, a)` even for commutative `f`.
#[derive(Clone, Debug)]
pub struct FunctionCallExpression {
    function: FunctionIdentifier,
    kind: FunctionKind,
    arguments: Vec<LogicalExpression>,
    annotations: BTreeMap<String, ExpressionAnnotation>,
}

impl PartialEq for FunctionCallExpression {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function && self.arguments == other.arguments
    }
}

impl Eq for FunctionCallExpression {}

impl Hash for FunctionCallExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.function.hash(state);
        self.arguments.hash(state);
    }
}

impl FunctionCallExpression {
    pub fn new(
        function: FunctionIdentifier,
        kind: FunctionKind,
        arguments: Vec<LogicalExpression>,
    ) -> Self {
        Self {
            function,
            kind,
            arguments,
            annotations: BTreeMap::new(),
        }
    }

    pub fn function(&self) -> &FunctionIdentifier {
        &self.function
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn arguments(&self) -> &[LogicalExpression] {
        &self.arguments
    }

    pub fn arguments_mut(&mut self) -> &mut Vec<LogicalExpression> {
        &mut self.arguments
    }

    pub fn annotations(&self) -> &BTreeMap<String, ExpressionAnnotation> {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, ExpressionAnnotation> {
        &mut self.annotations
    }

    pub fn is(&self, builtin: BuiltinFunction) -> bool {
        self.function == builtin.identifier()
    }
}

impl Display for LogicalExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{}", c),
            Self::Variable(v) => write!(f, "{}", v),
            Self::FunctionCall(call) => write!(
                f,
                "{}({})",
                call.function.name(),
                call.arguments.iter().join(", ")
            ),
        }
    }
}

impl From<LogicalVariable> for LogicalExpression {
    fn from(v: LogicalVariable) -> Self {
        Self::Variable(v)
    }
}

impl From<ConstantValue> for LogicalExpression {
    fn from(c: ConstantValue) -> Self {
        Self::Constant(c)
    }
}

impl LogicalExpression {
    pub fn var(v: LogicalVariable) -> Self {
        Self::Variable(v)
    }

    pub fn constant<C: Into<ConstantValue>>(c: C) -> Self {
        Self::Constant(c.into())
    }

    pub fn true_constant() -> Self {
        Self::Constant(ConstantValue::Boolean(true))
    }

    pub fn call(function: BuiltinFunction, arguments: Vec<LogicalExpression>) -> Self {
        Self::FunctionCall(FunctionCallExpression::new(
            function.identifier(),
            function.kind(),
            arguments,
        ))
    }

    pub fn and(arguments: Vec<LogicalExpression>) -> Self {
        Self::call(BuiltinFunction::And, arguments)
    }

    pub fn eq(left: LogicalExpression, right: LogicalExpression) -> Self {
        Self::call(BuiltinFunction::Eq, vec![left, right])
    }

    /// Builds the conjunction of `conjuncts`, collapsing the trivial cases.
    pub fn conjunction(mut conjuncts: Vec<LogicalExpression>) -> Self {
        match conjuncts.len() {
            0 => Self::true_constant(),
            1 => conjuncts.remove(0),
            _ => Self::and(conjuncts),
        }
    }

    pub fn is_true_constant(&self) -> bool {
        matches!(self, Self::Constant(ConstantValue::Boolean(true)))
    }

    pub fn is_call_to(&self, builtin: BuiltinFunction) -> bool {
        matches!(self, Self::FunctionCall(call) if call.is(builtin))
    }

    /// Collects the free variables of this expression into `acc`, skipping duplicates.
    pub fn used_variables(&self, acc: &mut Vec<LogicalVariable>) {
        match self {
            Self::Constant(_) => {}
            Self::Variable(v) => {
                if !acc.contains(v) {
                    acc.push(*v);
                }
            }
            Self::FunctionCall(call) => {
                for arg in &call.arguments {
                    arg.used_variables(acc);
                }
            }
        }
    }

    pub fn variables(&self) -> Vec<LogicalVariable> {
        let mut vars = vec![];
        self.used_variables(&mut vars);
        vars
    }

    /// Renames `old` to `new` in place. Returns whether anything changed.
    pub fn substitute_var(&mut self, old: LogicalVariable, new: LogicalVariable) -> bool {
        match self {
            Self::Constant(_) => false,
            Self::Variable(v) => {
                if *v == old {
                    *v = new;
                    true
                } else {
                    false
                }
            }
            Self::FunctionCall(call) => call
                .arguments
                .iter_mut()
                .fold(false, |changed, arg| arg.substitute_var(old, new) | changed),
        }
    }

    /// Replaces every reference to `var` by a copy of `replacement`.
    pub fn inline_var(&mut self, var: LogicalVariable, replacement: &LogicalExpression) -> bool {
        match self {
            Self::Constant(_) => false,
            Self::Variable(v) => {
                if *v == var {
                    *self = replacement.clone();
                    true
                } else {
                    false
                }
            }
            Self::FunctionCall(call) => call
                .arguments
                .iter_mut()
                .fold(false, |changed, arg| arg.inline_var(var, replacement) | changed),
        }
    }

    /// Replaces every occurrence of `target` (structural equality) by `replacement`.
    pub fn replace_subexpression(
        &mut self,
        target: &LogicalExpression,
        replacement: &LogicalExpression,
    ) -> bool {
        if self == target {
            *self = replacement.clone();
            return true;
        }
        match self {
            Self::FunctionCall(call) => call.arguments.iter_mut().fold(false, |changed, arg| {
                arg.replace_subexpression(target, replacement) | changed
            }),
            _ => false,
        }
    }

    /// Deep copy. Annotation maps are copied by value, never shared with the original.
    pub fn clone_expression(&self) -> Self {
        self.clone()
    }

    /// Splits a conjunction into its arguments.
    ///
    /// Succeeds only for an `and` call with at least two arguments; otherwise returns `false`
    /// and leaves `conjuncts` untouched.
    pub fn split_into_conjuncts(&self, conjuncts: &mut Vec<LogicalExpression>) -> bool {
        match self {
            Self::FunctionCall(call)
                if call.is(BuiltinFunction::And) && call.arguments.len() >= 2 =>
            {
                conjuncts.extend(call.arguments.iter().cloned());
                true
            }
            _ => false,
        }
    }

    /// Flattened conjuncts of this predicate. `true` contributes nothing.
    pub fn conjuncts(&self) -> Vec<LogicalExpression> {
        let mut parts = vec![];
        if self.split_into_conjuncts(&mut parts) {
            parts.iter().flat_map(|p| p.conjuncts()).collect()
        } else if self.is_true_constant() {
            vec![]
        } else {
            vec![self.clone()]
        }
    }

    /// Derives functional dependencies and equivalence classes implied by this predicate.
    ///
    /// Only `and` (recursively) and `eq` between constant/variable or variable/variable
    /// operands contribute; every other predicate contributes nothing.
    pub fn get_constraints_and_equiv_classes(
        &self,
        fds: &mut Vec<FunctionalDependency>,
        equiv: &mut EquivalenceClassMap,
    ) {
        let Self::FunctionCall(call) = self else {
            return;
        };
        if call.is(BuiltinFunction::And) {
            for arg in &call.arguments {
                arg.get_constraints_and_equiv_classes(fds, equiv);
            }
        } else if call.is(BuiltinFunction::Eq) && call.arguments.len() == 2 {
            match (&call.arguments[0], &call.arguments[1]) {
                (Self::Constant(c), Self::Variable(v)) | (Self::Variable(v), Self::Constant(c)) => {
                    fds.push(FunctionalDependency::new(vec![], vec![*v]));
                    equiv.set_constant(*v, c.clone());
                }
                (Self::Variable(v1), Self::Variable(v2)) => {
                    fds.push(FunctionalDependency::new(vec![*v1], vec![*v2]));
                    fds.push(FunctionalDependency::new(vec![*v2], vec![*v1]));
                    equiv.merge(*v1, *v2);
                }
                _ => {}
            }
        }
    }

    /// Like [`Self::get_constraints_and_equiv_classes`] for an outer join condition: only
    /// dependencies whose head is a variable of the outer branch are emitted.
    pub fn get_constraints_for_outer_join(
        &self,
        fds: &mut Vec<FunctionalDependency>,
        outer_vars: &HashSet<LogicalVariable>,
    ) {
        let Self::FunctionCall(call) = self else {
            return;
        };
        if call.is(BuiltinFunction::And) {
            for arg in &call.arguments {
                arg.get_constraints_for_outer_join(fds, outer_vars);
            }
        } else if call.is(BuiltinFunction::Eq) && call.arguments.len() == 2 {
            if let (Self::Variable(v1), Self::Variable(v2)) =
                (&call.arguments[0], &call.arguments[1])
            {
                if outer_vars.contains(v1) {
                    fds.push(FunctionalDependency::new(vec![*v1], vec![*v2]));
                }
                if outer_vars.contains(v2) {
                    fds.push(FunctionalDependency::new(vec![*v2], vec![*v1]));
                }
            }
        }
    }

    /// Visits every function call of this expression, outermost first.
    pub fn for_each_call<F: FnMut(&LogicalExpression)>(&self, f: &mut F) {
        if let Self::FunctionCall(call) = self {
            f(self);
            for arg in &call.arguments {
                arg.for_each_call(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u32) -> LogicalExpression {
        LogicalExpression::var(LogicalVariable::new(id))
    }

    #[test]
    fn test_substitute_var() {
        let mut expr = LogicalExpression::eq(v(1), LogicalExpression::and(vec![v(1), v(2)]));
        assert!(expr.substitute_var(LogicalVariable::new(1), LogicalVariable::new(7)));
        assert_eq!(
            vec![LogicalVariable::new(7), LogicalVariable::new(2)],
            expr.variables()
        );
        assert!(!expr.substitute_var(LogicalVariable::new(1), LogicalVariable::new(8)));
    }

    #[test]
    fn test_clone_does_not_share_annotations() {
        let mut original = LogicalExpression::eq(v(1), v(2));
        let mut copy = original.clone_expression();
        copy.as_function_call_mut()
            .unwrap()
            .annotations_mut()
            .insert("hint".into(), ExpressionAnnotation::Hint("indexnl".into()));
        assert!(original
            .as_function_call_mut()
            .unwrap()
            .annotations()
            .is_empty());
        // Annotations are not part of structural equality.
        assert_eq!(original, copy);
    }

    #[test]
    fn test_argument_order_matters() {
        assert_ne!(LogicalExpression::eq(v(1), v(2)), LogicalExpression::eq(v(2), v(1)));
    }

    #[test]
    fn test_inline_var() {
        let mut expr = LogicalExpression::eq(v(1), v(2));
        assert!(expr.inline_var(LogicalVariable::new(2), &LogicalExpression::constant(3)));
        assert_eq!(LogicalExpression::eq(v(1), LogicalExpression::constant(3)), expr);
    }
}
