use anyhow::bail;

use crate::constraint::EquivalenceClassMap;
use crate::error::{OptError, OptResult};
use crate::properties::Partitioning;

/// How the partitioning required of a later input is reconciled with what an earlier input
/// already delivers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PropertiesCoordination {
    /// The requirement is kept as is.
    #[default]
    NoCoordination,
    /// Required columns are swapped for equivalent columns the earlier input partitions on.
    EquivalenceClasses,
}

/// Result of coordinating a requirement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatedPartitioning {
    pub partitioning: Option<Partitioning>,
    /// The requirement was rewritten to agree with the earlier input.
    pub satisfied: bool,
}

impl CoordinatedPartitioning {
    fn unchanged(required: Option<&Partitioning>) -> Self {
        Self {
            partitioning: required.cloned(),
            satisfied: false,
        }
    }
}

impl PropertiesCoordination {
    pub fn coordinate(
        &self,
        required: Option<&Partitioning>,
        first_delivered: Option<&Partitioning>,
        equiv: &EquivalenceClassMap,
    ) -> OptResult<CoordinatedPartitioning> {
        match self {
            Self::NoCoordination => Ok(CoordinatedPartitioning::unchanged(required)),
            Self::EquivalenceClasses => {
                let (Some(required), Some(delivered)) = (required, first_delivered) else {
                    return Ok(CoordinatedPartitioning::unchanged(required));
                };
                match (required, delivered) {
                    (
                        Partitioning::UnorderedPartitioned {
                            columns: required_columns,
                            domain,
                        },
                        Partitioning::UnorderedPartitioned {
                            columns: delivered_columns,
                            ..
                        },
                    ) => {
                        for column in delivered_columns {
                            if !required_columns
                                .iter()
                                .any(|r| equiv.equivalent(*column, *r))
                            {
                                bail!(OptError::Unsatisfiable(format!(
                                    "no column of {} is equivalent to {}, delivered by the first input",
                                    required, column
                                )));
                            }
                        }
                        // Required columns without a delivered equivalent are dropped.
                        Ok(CoordinatedPartitioning {
                            partitioning: Some(Partitioning::UnorderedPartitioned {
                                columns: delivered_columns.clone(),
                                domain: domain.clone(),
                            }),
                            satisfied: true,
                        })
                    }
                    (Partitioning::OrderedPartitioned { .. }, _)
                    | (_, Partitioning::OrderedPartitioned { .. }) => {
                        bail!(OptError::not_implemented(
                            "coordination of ordered partitioning"
                        ))
                    }
                    _ => Ok(CoordinatedPartitioning::unchanged(Some(required))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::expr::LogicalVariable;
    use crate::properties::OrderColumn;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable::new(id)
    }

    #[test]
    fn test_no_coordination_passes_through() {
        let required = Partitioning::hashed(vec![v(2)], None);
        let delivered = Partitioning::hashed(vec![v(1)], None);
        let coordinated = PropertiesCoordination::NoCoordination
            .coordinate(Some(&required), Some(&delivered), &EquivalenceClassMap::default())
            .unwrap();
        assert_eq!(Some(required), coordinated.partitioning);
        assert!(!coordinated.satisfied);
    }

    #[test]
    fn test_ordered_partitioning_is_not_implemented() {
        let required = Partitioning::OrderedPartitioned {
            columns: vec![OrderColumn::asc(v(1))],
            domain: None,
        };
        let err = PropertiesCoordination::EquivalenceClasses
            .coordinate(
                Some(&required),
                Some(&Partitioning::hashed(vec![v(1)], None)),
                &EquivalenceClassMap::default(),
            )
            .unwrap_err();
        assert!(matches!(error_kind(&err), Some(OptError::NotImplemented(_))));
    }
}
