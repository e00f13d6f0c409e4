//! Implementation of heuristic optimizer.
//!
//! Heuristic optimizer optimizes query plan by applying batches of rewrite rules to query plan
//! until a fixed point is reached. Each batch is one [`OptimizationPhase`]; phases run in a
//! fixed order and never backtrack. The rule controllers are inspired by
//! [apache calcite](https://github.com/apache/calcite)'s HepPlanner.

mod controller;
pub use controller::*;
mod optimizer;
pub use optimizer::*;
