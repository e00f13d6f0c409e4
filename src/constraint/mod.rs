//! Equivalence classes and functional dependencies.
//!
//! Both are derived from predicates and per-operator semantics (see [`derive`]) and consumed by
//! physical property normalization and multi-input coordination. They are recomputed for every
//! rewrite round and are never persisted across rounds.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

mod derive;
pub use derive::*;
mod equivalence;
pub use equivalence::*;

use crate::expr::LogicalVariable;

/// `head → tail`: the head variables determine the tail variables.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionalDependency {
    head: Vec<LogicalVariable>,
    tail: Vec<LogicalVariable>,
}

impl FunctionalDependency {
    pub fn new(head: Vec<LogicalVariable>, tail: Vec<LogicalVariable>) -> Self {
        Self { head, tail }
    }

    pub fn head(&self) -> &[LogicalVariable] {
        &self.head
    }

    pub fn tail(&self) -> &[LogicalVariable] {
        &self.tail
    }
}

impl Display for FunctionalDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}} -> {{{}}}",
            self.head.iter().join(", "),
            self.tail.iter().join(", ")
        )
    }
}

/// Normalizes a grouping column set.
///
/// First every column is replaced by its equivalence class representative, and columns of
/// constant classes are dropped. Then each remaining column implied by a dependency whose head
/// lies inside the set is replaced by that head. The first matching dependency wins, so the
/// result is a cover of the input but not necessarily a minimal one.
pub fn normalize_grouping_columns(
    columns: &[LogicalVariable],
    equiv: &EquivalenceClassMap,
    fds: &[FunctionalDependency],
) -> Vec<LogicalVariable> {
    let mut by_class: Vec<LogicalVariable> = Vec::with_capacity(columns.len());
    for column in columns {
        match equiv.class_of(*column) {
            None => push_unique(&mut by_class, *column),
            Some(class) if class.is_constant() => {}
            Some(class) => push_unique(&mut by_class, class.representative()),
        }
    }

    let mut normalized = Vec::with_capacity(by_class.len());
    for column in &by_class {
        let implying = fds.iter().find(|fd| {
            fd.tail().contains(column) && fd.head().iter().all(|h| by_class.contains(h))
        });
        match implying {
            Some(fd) => {
                for h in fd.head() {
                    push_unique(&mut normalized, *h);
                }
            }
            None => push_unique(&mut normalized, *column),
        }
    }
    normalized
}

pub(crate) fn push_unique(vars: &mut Vec<LogicalVariable>, v: LogicalVariable) {
    if !vars.contains(&v) {
        vars.push(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ConstantValue;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable::new(id)
    }

    #[test]
    fn test_normalize_drops_constant_columns() {
        let mut equiv = EquivalenceClassMap::default();
        equiv.set_constant(v(1), ConstantValue::Int64(5));
        equiv.merge(v(2), v(3));
        let normalized = normalize_grouping_columns(&[v(1), v(3), v(4)], &equiv, &[]);
        assert_eq!(vec![v(2), v(4)], normalized);
    }

    #[test]
    fn test_normalize_applies_first_fd() {
        let equiv = EquivalenceClassMap::default();
        let fds = vec![
            FunctionalDependency::new(vec![v(1)], vec![v(2)]),
            FunctionalDependency::new(vec![v(3)], vec![v(2)]),
        ];
        let normalized = normalize_grouping_columns(&[v(1), v(2), v(3)], &equiv, &fds);
        assert_eq!(vec![v(1), v(3)], normalized);
    }
}
