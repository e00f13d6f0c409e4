use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use anyhow::bail;
use itertools::Itertools;
use log::debug;
use petgraph::algo::is_cyclic_directed;
use petgraph::prelude::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use prettytable::Table;
use serde::Serialize;

use crate::config::OptimizerConfig;
use crate::error::{OptError, OptResult};
use crate::jobgen::{
    ConnectorDescriptor, JobBuilder, JobOperatorDescriptor, OperatorDescriptor,
    PipelineDescriptor, TargetConstraint,
};
use crate::operator::ExecutionMode;
use crate::plan::OperatorId;
use crate::properties::NodeDomain;

pub type JobGraph = StableGraph<JobNode, JobEdge, Directed, u32>;
pub type JobNodeId = NodeIndex<u32>;

/// Where the partitions of a job operator run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LocationConstraint {
    /// Exactly one partition, on the named location.
    Single(String),
    /// One partition on every location.
    Partitioned(Vec<String>),
}

impl Display for LocationConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(location) => write!(f, "{}", location),
            Self::Partitioned(locations) => write!(f, "[{}]", locations.iter().join(", ")),
        }
    }
}

/// A job operator: one plan operator, or a chain of fused micro operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobNode {
    pub operators: Vec<OperatorId>,
    pub descriptor: JobOperatorDescriptor,
    pub location: LocationConstraint,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobEdge {
    pub src_output: usize,
    pub dst_input: usize,
    pub connector: ConnectorDescriptor,
    pub target: TargetConstraint,
}

/// The compiled job, ready to be handed to the execution engine.
#[derive(Debug, Serialize)]
pub struct JobSpecification {
    graph: JobGraph,
    roots: Vec<JobNodeId>,
}

impl JobSpecification {
    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn roots(&self) -> &[JobNodeId] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: JobNodeId) -> &JobNode {
        &self.graph[id]
    }

    /// The job node `op` ended up in.
    pub fn node_of(&self, op: OperatorId) -> Option<JobNodeId> {
        self.graph
            .node_indices()
            .find(|id| self.graph[*id].operators.contains(&op))
    }

    /// Incoming edges of `id` as `(producer, edge)`, ordered by input index.
    pub fn inputs_of(&self, id: JobNodeId) -> Vec<(JobNodeId, &JobEdge)> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .sorted_by_key(|(_, e)| e.dst_input)
            .collect()
    }

    /// Outgoing edges of `id` as `(consumer, edge)`, ordered by output index.
    pub fn outputs_of(&self, id: JobNodeId) -> Vec<(JobNodeId, &JobEdge)> {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .sorted_by_key(|(_, e)| e.src_output)
            .collect()
    }

    /// One row per job operator with its inputs and location.
    pub fn explain(&self) -> String {
        let mut table = Table::new();
        table.set_titles(row!["Node", "Operators", "Descriptor", "Location", "Inputs"]);
        for id in self.graph.node_indices() {
            let node = &self.graph[id];
            let inputs = self
                .inputs_of(id)
                .into_iter()
                .map(|(src, e)| format!("{}.{} {}", src.index(), e.src_output, e.connector))
                .join("\n");
            table.add_row(row![
                id.index(),
                node.operators.iter().join(" -> "),
                node.descriptor.descriptor,
                node.location,
                inputs
            ]);
        }
        table.to_string()
    }
}

/// Edge between two contributed operators once exchanges are folded into connectors.
struct ResolvedEdge {
    src: OperatorId,
    src_output: usize,
    dst: OperatorId,
    dst_input: usize,
    connector: Option<(ConnectorDescriptor, TargetConstraint)>,
}

/// [`JobBuilder`] producing a [`JobSpecification`].
///
/// Exchange operators become connectors on the edge they sit on. Chains of micro operators
/// linked by plain edges, with a single consumer each and the same execution mode, are fused
/// into pipelines. Every other plain edge gets a one-to-one connector.
pub struct JobGraphBuilder {
    cluster: NodeDomain,
    operators: BTreeMap<OperatorId, JobOperatorDescriptor>,
    connectors: BTreeMap<OperatorId, (ConnectorDescriptor, TargetConstraint)>,
    /// `(dst, dst input) -> (src, src output)`
    edges: BTreeMap<(OperatorId, usize), (OperatorId, usize)>,
}

impl JobGraphBuilder {
    pub fn new(cluster: NodeDomain) -> Self {
        Self {
            cluster,
            operators: BTreeMap::new(),
            connectors: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn with_config(config: &OptimizerConfig) -> Self {
        Self::new(config.cluster_locations.clone())
    }

    fn location_of(&self, op: OperatorId, mode: ExecutionMode) -> OptResult<LocationConstraint> {
        match mode {
            ExecutionMode::Partitioned => Ok(LocationConstraint::Partitioned(
                self.cluster.locations().map(String::from).collect(),
            )),
            ExecutionMode::Unpartitioned => match self.cluster.locations().next() {
                Some(location) => Ok(LocationConstraint::Single(location.to_string())),
                None => bail!(OptError::Compilation("empty cluster".to_string())),
            },
            ExecutionMode::Local | ExecutionMode::Unassigned => bail!(OptError::Compilation(
                format!("operator {} has no location in execution mode {}", op, mode)
            )),
        }
    }

    fn resolve_edges(&self) -> OptResult<Vec<ResolvedEdge>> {
        let mut resolved = vec![];
        for (&(dst, dst_input), &(src, src_output)) in &self.edges {
            if self.connectors.contains_key(&dst) {
                continue;
            }
            let (src, src_output, connector) = match self.connectors.get(&src) {
                Some(connector) => {
                    if src_output > 0 {
                        bail!(OptError::Compilation(format!(
                            "exchange {} has more than one consumer",
                            src
                        )));
                    }
                    let &(producer, output) = self.edges.get(&(src, 0)).ok_or_else(|| {
                        OptError::Compilation(format!("exchange {} has no input", src))
                    })?;
                    if self.connectors.contains_key(&producer) {
                        bail!(OptError::Compilation(format!(
                            "exchange {} sits directly on exchange {}",
                            src, producer
                        )));
                    }
                    (producer, output, Some(connector.clone()))
                }
                None => (src, src_output, None),
            };
            for op in [src, dst] {
                if !self.operators.contains_key(&op) {
                    bail!(OptError::Compilation(format!(
                        "edge references {} which was never contributed",
                        op
                    )));
                }
            }
            resolved.push(ResolvedEdge {
                src,
                src_output,
                dst,
                dst_input,
                connector,
            });
        }
        Ok(resolved)
    }

    /// Successor of every operator fused with its consumer.
    fn fusions(&self, edges: &[ResolvedEdge]) -> HashMap<OperatorId, OperatorId> {
        let outputs = edges.iter().counts_by(|e| e.src);
        edges
            .iter()
            .filter(|e| {
                let (src, dst) = (&self.operators[&e.src], &self.operators[&e.dst]);
                e.connector.is_none()
                    && outputs[&e.src] == 1
                    && src.descriptor.as_micro().is_some()
                    && dst.descriptor.as_micro().is_some()
                    && dst.input_schemas.len() == 1
                    && src.execution_mode == dst.execution_mode
            })
            .map(|e| (e.src, e.dst))
            .collect()
    }

    fn fused_descriptor(&self, chain: &[OperatorId]) -> JobOperatorDescriptor {
        let first = &self.operators[&chain[0]];
        if chain.len() == 1 {
            return first.clone();
        }
        let last = &self.operators[&chain[chain.len() - 1]];
        let members: Vec<&JobOperatorDescriptor> =
            chain.iter().map(|op| &self.operators[op]).collect();
        JobOperatorDescriptor {
            descriptor: OperatorDescriptor::Pipeline(PipelineDescriptor {
                operators: members
                    .iter()
                    .filter_map(|m| m.descriptor.as_micro().cloned())
                    .collect(),
                input_layout: first.input_schemas.first().cloned().unwrap_or_default(),
                layouts: members.iter().map(|m| m.schema.clone()).collect(),
            }),
            schema: last.schema.clone(),
            input_schemas: first.input_schemas.clone(),
            execution_mode: last.execution_mode,
        }
    }
}

impl JobBuilder for JobGraphBuilder {
    type Spec = JobSpecification;

    fn contribute_operator(
        &mut self,
        op: OperatorId,
        descriptor: JobOperatorDescriptor,
    ) -> OptResult<()> {
        if self.operators.insert(op, descriptor).is_some() {
            bail!(OptError::Compilation(format!("{} contributed twice", op)));
        }
        Ok(())
    }

    fn contribute_graph_edge(
        &mut self,
        src: OperatorId,
        src_output: usize,
        dst: OperatorId,
        dst_input: usize,
    ) -> OptResult<()> {
        if self
            .edges
            .insert((dst, dst_input), (src, src_output))
            .is_some()
        {
            bail!(OptError::Compilation(format!(
                "input {} of {} connected twice",
                dst_input, dst
            )));
        }
        Ok(())
    }

    fn contribute_connector(
        &mut self,
        op: OperatorId,
        connector: ConnectorDescriptor,
        target: TargetConstraint,
    ) -> OptResult<()> {
        if self.connectors.insert(op, (connector, target)).is_some() {
            bail!(OptError::Compilation(format!("{} contributed twice", op)));
        }
        Ok(())
    }

    fn build_spec(self, roots: &[OperatorId]) -> OptResult<JobSpecification> {
        let edges = self.resolve_edges()?;
        let fusions = self.fusions(&edges);
        let fused_inputs: HashSet<OperatorId> = fusions.values().copied().collect();

        let mut graph = JobGraph::default();
        let mut node_of: HashMap<OperatorId, JobNodeId> = HashMap::new();
        for head in self.operators.keys().filter(|op| !fused_inputs.contains(op)) {
            let mut chain = vec![*head];
            while let Some(next) = fusions.get(&chain[chain.len() - 1]) {
                chain.push(*next);
            }
            let descriptor = self.fused_descriptor(&chain);
            let location = self.location_of(*head, descriptor.execution_mode)?;
            if chain.len() > 1 {
                debug!("Fused [{}] into one pipeline", chain.iter().join(", "));
            }
            let id = graph.add_node(JobNode {
                operators: chain.clone(),
                descriptor,
                location,
            });
            for op in chain {
                node_of.insert(op, id);
            }
        }

        for edge in edges.iter().filter(|e| fusions.get(&e.src) != Some(&e.dst)) {
            let (connector, target) = edge
                .connector
                .clone()
                .unwrap_or((ConnectorDescriptor::OneToOne, TargetConstraint::SameCount));
            graph.add_edge(
                node_of[&edge.src],
                node_of[&edge.dst],
                JobEdge {
                    src_output: edge.src_output,
                    dst_input: edge.dst_input,
                    connector,
                    target,
                },
            );
        }

        if is_cyclic_directed(&graph) {
            bail!(OptError::Compilation("job graph has a cycle".to_string()));
        }
        let roots = roots
            .iter()
            .map(|op| {
                node_of.get(op).copied().ok_or_else(|| {
                    OptError::Compilation(format!("root {} was never contributed", op)).into()
                })
            })
            .collect::<OptResult<Vec<_>>>()?;
        Ok(JobSpecification { graph, roots })
    }
}
