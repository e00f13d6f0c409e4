use log::debug;
use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::context::OptimizationContext;
use crate::error::OptResult;
use crate::heuristic::RuleController;
use crate::plan::LogicalPlan;
use crate::rules::*;

/// The phases every plan goes through, in order. Phases never revisit earlier ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum OptimizationPhase {
    TypeInference,
    Normalization,
    PredicatePushdown,
    JoinInference,
    OperatorPushdown,
    DataExchange,
    Consolidation,
    PhysicalAllLevels,
    PhysicalTopLevel,
    JobGenPreparation,
    FinalTypeInference,
}

impl OptimizationPhase {
    pub fn controller(&self) -> RuleController {
        match self {
            Self::TypeInference | Self::FinalTypeInference => RuleController::once(),
            Self::PhysicalTopLevel => RuleController::fixpoint().top_level_only(),
            _ => RuleController::fixpoint(),
        }
    }

    pub fn rules(&self) -> RuleCollection {
        let rules: Vec<RuleImpl> = match self {
            Self::TypeInference | Self::FinalTypeInference => vec![InferTypes.into()],
            Self::Normalization => vec![
                EliminateSubplan.into(),
                IntroduceGroupByForDistinct.into(),
                BreakSelectIntoConjuncts.into(),
                PushSelectIntoJoin.into(),
                ExtractGroupByExpressions.into(),
            ],
            Self::PredicatePushdown => vec![
                PushSelectDown.into(),
                InlineVariables.into(),
                FactorRedundantGroupAndDecorVars.into(),
                EliminateSubplan.into(),
            ],
            Self::JoinInference => vec![InlineVariables.into(), ComplexJoinInference.into()],
            Self::OperatorPushdown => vec![PushProjectDown.into(), PushSelectDown.into()],
            Self::DataExchange => vec![SetExecutionMode.into()],
            Self::Consolidation => vec![
                ConsolidateSelects.into(),
                ConsolidateAssigns.into(),
                RemoveUnusedAssigns.into(),
                RemoveUnusedAggregates.into(),
            ],
            // Projections pushed after enforcement get their physical operator from the
            // second SetPhysicalOperators.
            Self::PhysicalAllLevels => vec![
                PullSelectOutOfEqJoin.into(),
                SetPhysicalOperators.into(),
                EnforceStructuralProperties.into(),
                PushProjectDown.into(),
                SetPhysicalOperators.into(),
                PushLimitDown.into(),
            ],
            Self::PhysicalTopLevel => vec![PushLimitDown.into()],
            Self::JobGenPreparation => vec![
                IsolateJobOperators.into(),
                ExtractCommonExpressions.into(),
                PushProjectIntoDataSourceScan.into(),
            ],
        };
        RuleCollection::new((*self).into(), rules)
    }
}

/// Heuristic optimizer: runs every [`OptimizationPhase`] to its own fixpoint over a plan.
pub struct HeuristicOptimizer {
    phases: Vec<OptimizationPhase>,
}

impl Default for HeuristicOptimizer {
    fn default() -> Self {
        use strum::IntoEnumIterator;
        Self {
            phases: OptimizationPhase::iter().collect(),
        }
    }
}

impl HeuristicOptimizer {
    /// Optimizer running only `phases`, in the given order.
    pub fn with_phases(phases: Vec<OptimizationPhase>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[OptimizationPhase] {
        &self.phases
    }

    /// Rewrites `plan` in place into a physical plan ready for job generation.
    ///
    /// Any rule failure aborts the whole optimization.
    pub fn optimize(&self, plan: &mut LogicalPlan, ctx: &mut OptimizationContext) -> OptResult<()> {
        ctx.observe_plan(plan);
        for phase in &self.phases {
            debug!("Starting phase {}", phase);
            let fired = phase
                .controller()
                .rewrite_with_rule_collection(&phase.rules(), plan, ctx)?;
            debug!("Finished phase {}, plan changed: {}", phase, fired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let optimizer = HeuristicOptimizer::default();
        assert_eq!(
            Some(&OptimizationPhase::TypeInference),
            optimizer.phases().first()
        );
        assert_eq!(
            Some(&OptimizationPhase::FinalTypeInference),
            optimizer.phases().last()
        );
        assert_eq!("PhysicalAllLevels", OptimizationPhase::PhysicalAllLevels.to_string());
    }

    #[test]
    fn test_top_level_phase_does_not_descend() {
        assert_eq!(
            RuleController::SequentialFixpoint {
                descend_nested: false
            },
            OptimizationPhase::PhysicalTopLevel.controller()
        );
    }
}
