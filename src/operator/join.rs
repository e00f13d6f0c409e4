use serde::Serialize;
use strum_macros::Display;

use crate::expr::LogicalExpression;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display, Serialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// Logical join operator. Input 0 is the left (outer) branch, input 1 the right branch.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Join {
    kind: JoinKind,
    condition: LogicalExpression,
}

impl Join {
    pub fn new(kind: JoinKind, condition: LogicalExpression) -> Self {
        Self { kind, condition }
    }

    pub fn inner(condition: LogicalExpression) -> Self {
        Self::new(JoinKind::Inner, condition)
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn condition(&self) -> &LogicalExpression {
        &self.condition
    }

    pub fn condition_mut(&mut self) -> &mut LogicalExpression {
        &mut self.condition
    }
}
