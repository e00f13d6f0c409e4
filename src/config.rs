use crate::properties::NodeDomain;

/// Match order of plan tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchOrder {
    /// Offer an operator to the rule after its inputs have been visited.
    BottomUp,
    /// Offer an operator to the rule before its inputs.
    TopDown,
}

/// Knobs of one optimization and compilation run.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    /// Log the explain output of the plan after every rule firing.
    pub trace_plans: bool,
    /// Tuples per frame in fused pipelines.
    pub frame_size: usize,
    /// Locations partitioned operators run on.
    pub cluster_locations: NodeDomain,
    /// Pick the hash based group-by even without a hint on the operator.
    pub hash_group_by_by_default: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            trace_plans: false,
            frame_size: 32,
            cluster_locations: NodeDomain::new(["nc1", "nc2"]),
            hash_group_by_by_default: false,
        }
    }
}

impl OptimizerConfig {
    pub fn with_trace_plans(mut self, trace_plans: bool) -> Self {
        self.trace_plans = trace_plans;
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    pub fn with_cluster_locations(mut self, cluster_locations: NodeDomain) -> Self {
        self.cluster_locations = cluster_locations;
        self
    }

    pub fn with_hash_group_by_by_default(mut self, hash_group_by: bool) -> Self {
        self.hash_group_by_by_default = hash_group_by;
        self
    }
}
