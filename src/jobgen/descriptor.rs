//! Runtime descriptors handed to the execution engine.

use serde::Serialize;
use strum_macros::Display;

use crate::expr::{ConstantValue, FunctionIdentifier, LogicalVariable};
use crate::operator::{ExecutionMode, JoinKind, OrderKind};

/// Field layout of the records crossing a boundary.
pub type RecordLayout = Vec<LogicalVariable>;

/// An expression compiled against a record layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RuntimeExpression {
    Constant(ConstantValue),
    /// Field at this index of the input record.
    Field(usize),
    Call {
        function: FunctionIdentifier,
        arguments: Vec<RuntimeExpression>,
    },
}

/// A one-input, one-output operator that can be fused into a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Display)]
pub enum MicroOperatorDescriptor {
    EmptyTupleSource,
    NestedTupleSource,
    /// Appends the evaluated expressions to every record.
    Assign { expressions: Vec<RuntimeExpression> },
    StreamSelect { condition: RuntimeExpression },
    StreamProject { fields: Vec<usize> },
    StreamLimit { limit: u64, offset: u64 },
    Aggregate { expressions: Vec<RuntimeExpression> },
    Subplan { pipelines: Vec<PipelineDescriptor> },
    /// Hands every record to the result printer.
    Printer { expressions: Vec<RuntimeExpression> },
}

/// A linear chain of micro operators with the layout after each of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PipelineDescriptor {
    pub operators: Vec<MicroOperatorDescriptor>,
    pub input_layout: RecordLayout,
    pub layouts: Vec<RecordLayout>,
}

impl PipelineDescriptor {
    pub fn output_layout(&self) -> &[LogicalVariable] {
        self.layouts
            .last()
            .map(|l| l.as_slice())
            .unwrap_or(&self.input_layout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Display)]
pub enum OperatorDescriptor {
    Micro(MicroOperatorDescriptor),
    /// Several micro operators fused into one.
    Pipeline(PipelineDescriptor),
    DataSourceScan {
        source: String,
        /// Positions of the produced fields among the source's fields.
        fields: Vec<usize>,
    },
    HybridHashJoin {
        kind: JoinKind,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },
    NestedLoopJoin {
        kind: JoinKind,
        /// Evaluated over the left record followed by the right record.
        condition: RuntimeExpression,
    },
    Sort { columns: Vec<(usize, OrderKind)> },
    PreclusteredGroupBy {
        keys: Vec<usize>,
        decors: Vec<usize>,
        nested: Vec<PipelineDescriptor>,
    },
    ExternalGroupBy {
        keys: Vec<usize>,
        decors: Vec<usize>,
        nested: Vec<PipelineDescriptor>,
    },
}

impl OperatorDescriptor {
    pub fn as_micro(&self) -> Option<&MicroOperatorDescriptor> {
        match self {
            Self::Micro(micro) => Some(micro),
            _ => None,
        }
    }
}

/// Data movement strategy of an edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Display)]
pub enum ConnectorDescriptor {
    OneToOne,
    MToNHashPartitioning { fields: Vec<usize> },
    MToNRandomMerge,
    MToNSortMerging { columns: Vec<(usize, OrderKind)> },
    MToNBroadcast,
}

/// Partition count of the consumer side of a connector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Display)]
pub enum TargetConstraint {
    /// Exactly one consumer partition.
    One,
    /// As many partitions as the producer.
    SameCount,
}

/// What the compiler contributes for one operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobOperatorDescriptor {
    pub descriptor: OperatorDescriptor,
    pub schema: RecordLayout,
    pub input_schemas: Vec<RecordLayout>,
    pub execution_mode: ExecutionMode,
}

/// What a physical operator turns into at job generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeContribution {
    Operator(OperatorDescriptor),
    Connector(ConnectorDescriptor, TargetConstraint),
}
