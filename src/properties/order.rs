use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::expr::LogicalVariable;
use crate::operator::OrderKind;
use crate::properties::PhysicalProp;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderColumn {
    pub var: LogicalVariable,
    pub kind: OrderKind,
}

impl OrderColumn {
    pub fn new(var: LogicalVariable, kind: OrderKind) -> Self {
        Self { var, kind }
    }

    pub fn asc(var: LogicalVariable) -> Self {
        Self::new(var, OrderKind::Asc)
    }
}

impl Display for OrderColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.var, self.kind)
    }
}

/// Arrangement of tuples inside one partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocalProperty {
    /// Sorted on the columns, in order.
    Ordering(Vec<OrderColumn>),
    /// Tuples with equal values of the columns are adjacent. Column order is irrelevant.
    Grouping(Vec<LogicalVariable>),
}

impl LocalProperty {
    pub fn columns(&self) -> Vec<LogicalVariable> {
        match self {
            Self::Ordering(columns) => columns.iter().map(|c| c.var).collect(),
            Self::Grouping(columns) => columns.clone(),
        }
    }
}

fn same_set(a: &[LogicalVariable], b: &[LogicalVariable]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v))
}

impl PhysicalProp for LocalProperty {
    fn satisfies(&self, required: &Self) -> bool {
        match (required, self) {
            (Self::Ordering(r), Self::Ordering(d)) => d.starts_with(r),
            (Self::Grouping(g), Self::Grouping(d)) => same_set(g, d),
            (Self::Grouping(g), Self::Ordering(d)) => {
                d.len() >= g.len()
                    && same_set(
                        g,
                        &d[..g.len()].iter().map(|c| c.var).collect::<Vec<_>>(),
                    )
            }
            (Self::Ordering(_), Self::Grouping(_)) => false,
        }
    }
}

impl Display for LocalProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ordering(columns) => write!(f, "ORDER({})", columns.iter().join(", ")),
            Self::Grouping(columns) => write!(f, "GROUP({})", columns.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable::new(id)
    }

    #[test]
    fn test_ordering_prefix_satisfies_grouping() {
        let delivered = LocalProperty::Ordering(vec![
            OrderColumn::asc(v(2)),
            OrderColumn::asc(v(1)),
            OrderColumn::asc(v(3)),
        ]);
        assert!(delivered.satisfies(&LocalProperty::Grouping(vec![v(1), v(2)])));
        assert!(!delivered.satisfies(&LocalProperty::Grouping(vec![v(1), v(3)])));
        assert!(delivered.satisfies(&LocalProperty::Ordering(vec![OrderColumn::asc(v(2))])));
        assert!(!delivered.satisfies(&LocalProperty::Ordering(vec![OrderColumn::new(
            v(2),
            OrderKind::Desc
        )])));
    }
}
