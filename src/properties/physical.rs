use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::constraint::{normalize_grouping_columns, EquivalenceClassMap, FunctionalDependency};
use crate::expr::LogicalVariable;
use crate::properties::{LocalProperty, OrderColumn, Partitioning, PhysicalProp};

/// Partitioning plus the local properties of every partition.
///
/// A `None` partitioning means "anything": as a requirement it is always satisfied, as a
/// delivered property it carries no information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StructuralPropertiesVector {
    partitioning: Option<Partitioning>,
    local: Vec<LocalProperty>,
}

impl StructuralPropertiesVector {
    pub fn new(partitioning: Option<Partitioning>, local: Vec<LocalProperty>) -> Self {
        Self {
            partitioning,
            local,
        }
    }

    pub fn unpartitioned() -> Self {
        Self::new(Some(Partitioning::Unpartitioned), vec![])
    }

    pub fn with_partitioning(partitioning: Partitioning) -> Self {
        Self::new(Some(partitioning), vec![])
    }

    pub fn partitioning(&self) -> Option<&Partitioning> {
        self.partitioning.as_ref()
    }

    pub fn set_partitioning(&mut self, partitioning: Option<Partitioning>) {
        self.partitioning = partitioning;
    }

    pub fn local(&self) -> &[LocalProperty] {
        &self.local
    }

    pub fn set_local(&mut self, local: Vec<LocalProperty>) {
        self.local = local;
    }

    /// Ordering delivered in every partition, if any.
    pub fn ordering(&self) -> Option<&[OrderColumn]> {
        self.local.iter().find_map(|p| match p {
            LocalProperty::Ordering(columns) if !columns.is_empty() => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// Rewrites every column to its equivalence class representative. Constant columns are
    /// dropped from local properties and grouping columns are reduced with `fds`.
    pub fn normalize(
        &self,
        equiv: &EquivalenceClassMap,
        fds: &[FunctionalDependency],
    ) -> Self {
        let is_constant = |v: &LogicalVariable| {
            equiv
                .class_of(*v)
                .map(|c| c.is_constant())
                .unwrap_or(false)
        };
        let local = self
            .local
            .iter()
            .filter_map(|p| {
                let normalized = match p {
                    LocalProperty::Ordering(columns) => LocalProperty::Ordering(
                        columns
                            .iter()
                            .filter(|c| !is_constant(&c.var))
                            .map(|c| OrderColumn::new(equiv.representative(c.var), c.kind))
                            .unique_by(|c| c.var)
                            .collect(),
                    ),
                    LocalProperty::Grouping(columns) => {
                        LocalProperty::Grouping(normalize_grouping_columns(columns, equiv, fds))
                    }
                };
                (!normalized.columns().is_empty()).then_some(normalized)
            })
            .collect();
        Self {
            partitioning: self.partitioning.as_ref().map(|p| p.normalize(equiv)),
            local,
        }
    }

    /// The required partitioning if `delivered` does not satisfy it.
    pub fn unsatisfied_partitioning(
        &self,
        delivered: &StructuralPropertiesVector,
        equiv: &EquivalenceClassMap,
    ) -> Option<Partitioning> {
        let required = self.partitioning.as_ref()?;
        let required_normalized = required.normalize(equiv);
        let satisfied = delivered
            .partitioning
            .as_ref()
            .map(|d| d.normalize(equiv).satisfies(&required_normalized))
            .unwrap_or(false);
        (!satisfied).then(|| required.clone())
    }

    /// Required local properties that `delivered` does not satisfy, in requirement order.
    pub fn unsatisfied_local(
        &self,
        delivered: &StructuralPropertiesVector,
        equiv: &EquivalenceClassMap,
        fds: &[FunctionalDependency],
    ) -> Vec<LocalProperty> {
        let delivered = delivered.normalize(equiv, fds);
        self.local
            .iter()
            .filter(|required| {
                let normalized = Self::new(None, vec![(*required).clone()]).normalize(equiv, fds);
                match normalized.local.first() {
                    // Only constant columns: trivially satisfied.
                    None => false,
                    Some(r) => !delivered.local.iter().any(|d| d.satisfies(r)),
                }
            })
            .cloned()
            .collect()
    }

    pub fn is_satisfied_by(
        &self,
        delivered: &StructuralPropertiesVector,
        equiv: &EquivalenceClassMap,
        fds: &[FunctionalDependency],
    ) -> bool {
        self.unsatisfied_partitioning(delivered, equiv).is_none()
            && self.unsatisfied_local(delivered, equiv, fds).is_empty()
    }
}

impl Display for StructuralPropertiesVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.partitioning {
            Some(p) => write!(f, "{}", p)?,
            None => write!(f, "ANY")?,
        }
        write!(f, " [{}]", self.local.iter().join(", "))
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
    fn test_partitioning_matched_through_equivalence() {
        let mut equiv = EquivalenceClassMap::default();
        equiv.merge(v(1), v(2));
        let required = StructuralPropertiesVector::with_partitioning(Partitioning::hashed(
            vec![v(2)],
            None,
        ));
        let delivered = StructuralPropertiesVector::with_partitioning(Partitioning::hashed(
            vec![v(1)],
            None,
        ));
        assert!(required.is_satisfied_by(&delivered, &equiv, &[]));
        assert!(!required.is_satisfied_by(&delivered, &EquivalenceClassMap::default(), &[]));
    }

    #[test]
    fn test_constant_grouping_is_trivially_satisfied() {
        let mut equiv = EquivalenceClassMap::default();
        equiv.set_constant(v(1), ConstantValue::Int64(1));
        let required = StructuralPropertiesVector::new(None, vec![LocalProperty::Grouping(vec![v(1)])]);
        assert!(required.is_satisfied_by(&StructuralPropertiesVector::default(), &equiv, &[]));
    }

    #[test]
    fn test_missing_ordering_is_reported() {
        let required = StructuralPropertiesVector::new(
            None,
            vec![LocalProperty::Ordering(vec![OrderColumn::asc(v(1))])],
        );
        let unsatisfied = required.unsatisfied_local(
            &StructuralPropertiesVector::unpartitioned(),
            &EquivalenceClassMap::default(),
            &[],
        );
        assert_eq!(required.local().to_vec(), unsatisfied);
    }
}
