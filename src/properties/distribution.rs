use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::Serialize;
use strum_macros::Display;

use crate::constraint::EquivalenceClassMap;
use crate::expr::LogicalVariable;
use crate::properties::{OrderColumn, PhysicalProp};

/// The set of execution locations a partitioning is defined over.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NodeDomain {
    locations: BTreeSet<String>,
}

impl NodeDomain {
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(|l| l.as_str())
    }

    pub fn cardinality(&self) -> usize {
        self.locations.len()
    }

    /// Two domains are compatible only when they name the same locations.
    pub fn same_as(&self, other: &NodeDomain) -> bool {
        self.locations == other.locations
    }
}

impl Display for NodeDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.locations.iter().join(", "))
    }
}

/// A missing domain on either side is not a conflict.
pub fn domains_compatible(a: Option<&NodeDomain>, b: Option<&NodeDomain>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        _ => true,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum PartitioningKind {
    Unpartitioned,
    Random,
    UnorderedPartitioned,
    OrderedPartitioned,
    Broadcast,
}

/// How tuples are spread over execution locations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Partitioning {
    /// Everything on one location.
    Unpartitioned,
    /// Partitioned, with no known relation between tuples and locations.
    Random { domain: Option<NodeDomain> },
    /// Tuples with equal values of `columns` share a location.
    UnorderedPartitioned {
        columns: Vec<LogicalVariable>,
        domain: Option<NodeDomain>,
    },
    /// Range partitioned on `columns`.
    OrderedPartitioned {
        columns: Vec<OrderColumn>,
        domain: Option<NodeDomain>,
    },
    /// Every location sees every tuple.
    Broadcast { domain: Option<NodeDomain> },
}

impl Partitioning {
    pub fn hashed(columns: Vec<LogicalVariable>, domain: Option<NodeDomain>) -> Self {
        Self::UnorderedPartitioned { columns, domain }
    }

    pub fn kind(&self) -> PartitioningKind {
        match self {
            Self::Unpartitioned => PartitioningKind::Unpartitioned,
            Self::Random { .. } => PartitioningKind::Random,
            Self::UnorderedPartitioned { .. } => PartitioningKind::UnorderedPartitioned,
            Self::OrderedPartitioned { .. } => PartitioningKind::OrderedPartitioned,
            Self::Broadcast { .. } => PartitioningKind::Broadcast,
        }
    }

    pub fn domain(&self) -> Option<&NodeDomain> {
        match self {
            Self::Unpartitioned => None,
            Self::Random { domain }
            | Self::UnorderedPartitioned { domain, .. }
            | Self::OrderedPartitioned { domain, .. }
            | Self::Broadcast { domain } => domain.as_ref(),
        }
    }

    /// Variables the partitioning is defined on.
    pub fn columns(&self) -> Vec<LogicalVariable> {
        match self {
            Self::UnorderedPartitioned { columns, .. } => columns.clone(),
            Self::OrderedPartitioned { columns, .. } => columns.iter().map(|c| c.var).collect(),
            _ => vec![],
        }
    }

    /// Rewrites partitioning columns to their equivalence class representatives.
    pub fn normalize(&self, equiv: &EquivalenceClassMap) -> Self {
        match self {
            Self::UnorderedPartitioned { columns, domain } => Self::UnorderedPartitioned {
                columns: columns
                    .iter()
                    .map(|c| equiv.representative(*c))
                    .unique()
                    .collect(),
                domain: domain.clone(),
            },
            Self::OrderedPartitioned { columns, domain } => Self::OrderedPartitioned {
                columns: columns
                    .iter()
                    .map(|c| OrderColumn::new(equiv.representative(c.var), c.kind))
                    .unique_by(|c| c.var)
                    .collect(),
                domain: domain.clone(),
            },
            other => other.clone(),
        }
    }

    /// Renames columns through `f`, e.g. to map a coordinated requirement back to an input.
    pub fn map_columns<F: Fn(LogicalVariable) -> LogicalVariable>(&self, f: F) -> Self {
        match self {
            Self::UnorderedPartitioned { columns, domain } => Self::UnorderedPartitioned {
                columns: columns.iter().map(|c| f(*c)).collect(),
                domain: domain.clone(),
            },
            Self::OrderedPartitioned { columns, domain } => Self::OrderedPartitioned {
                columns: columns
                    .iter()
                    .map(|c| OrderColumn::new(f(c.var), c.kind))
                    .collect(),
                domain: domain.clone(),
            },
            other => other.clone(),
        }
    }
}

impl PhysicalProp for Partitioning {
    fn satisfies(&self, required: &Self) -> bool {
        if !domains_compatible(self.domain(), required.domain()) {
            return false;
        }
        match (required, self) {
            (Self::Unpartitioned, Self::Unpartitioned) => true,
            (Self::Random { .. }, delivered) => !matches!(
                delivered,
                Self::Unpartitioned | Self::Broadcast { .. }
            ),
            (
                Self::UnorderedPartitioned { columns: r, .. },
                Self::UnorderedPartitioned { columns: d, .. },
            ) => !d.is_empty() && d.iter().all(|c| r.contains(c)),
            (
                Self::OrderedPartitioned { columns: r, .. },
                Self::OrderedPartitioned { columns: d, .. },
            ) => !d.is_empty() && r.starts_with(d),
            (Self::Broadcast { .. }, Self::Broadcast { .. }) => true,
            _ => false,
        }
    }
}

impl Display for Partitioning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unpartitioned => write!(f, "UNPARTITIONED"),
            Self::Random { .. } => write!(f, "RANDOM"),
            Self::UnorderedPartitioned { columns, .. } => {
                write!(f, "HASH({})", columns.iter().join(", "))
            }
            Self::OrderedPartitioned { columns, .. } => {
                write!(f, "RANGE({})", columns.iter().join(", "))
            }
            Self::Broadcast { .. } => write!(f, "BROADCAST"),
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
    fn test_hash_partitioning_on_subset_satisfies() {
        let required = Partitioning::hashed(vec![v(1), v(2)], None);
        assert!(Partitioning::hashed(vec![v(2)], None).satisfies(&required));
        assert!(!Partitioning::hashed(vec![v(3)], None).satisfies(&required));
        assert!(!Partitioning::hashed(vec![], None).satisfies(&required));
    }

    #[test]
    fn test_incompatible_domains() {
        let required = Partitioning::hashed(vec![v(1)], Some(NodeDomain::new(["a", "b"])));
        let delivered = Partitioning::hashed(vec![v(1)], Some(NodeDomain::new(["a"])));
        assert!(!delivered.satisfies(&required));
        let delivered = Partitioning::hashed(vec![v(1)], Some(NodeDomain::new(["b", "a"])));
        assert!(delivered.satisfies(&required));
    }
}
