use serde::Serialize;
use strum_macros::Display;

use crate::expr::LogicalExpression;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Limit {
    limit: u64,
    offset: u64,
}

impl Limit {
    pub fn new(limit: u64) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn with_offset(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Display, Serialize)]
pub enum OrderKind {
    #[strum(serialize = "ASC")]
    Asc,
    #[strum(serialize = "DESC")]
    Desc,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Order {
    columns: Vec<(OrderKind, LogicalExpression)>,
}

impl Order {
    pub fn new(columns: Vec<(OrderKind, LogicalExpression)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(OrderKind, LogicalExpression)] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut Vec<(OrderKind, LogicalExpression)> {
        &mut self.columns
    }
}
