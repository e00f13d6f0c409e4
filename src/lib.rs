//! ## Background
//!
//! The query optimizer accepts an unoptimized logical query plan, and outputs a physical plan
//! ready to be handed to a distributed execution engine. This crate implements the rule based
//! flavor of query optimization: a fixed sequence of rewrite phases, each applied to the plan
//! until it no longer changes. No alternative plans are enumerated and no costs are compared.
//!
//! ## Design
//!
//! ### Plan representation
//!
//! A [`plan::LogicalPlan`] is an arena of operators connected through slots. A slot is the
//! edge cell between a parent and an input; parents sharing a subplan hold the same slot, so a
//! plan is a DAG and rewriting the slot rewrites every parent at once. Operators carry
//! [`expr::LogicalExpression`]s that rules mutate in place.
//!
//! ### Constraints and properties
//!
//! Every operator's output is described by equivalence classes and functional dependencies
//! ([`constraint`]) and, after physical operators are chosen, by structural properties
//! ([`properties`]): partitioning across the cluster and ordering or grouping inside each
//! partition. Inputs of a multi-input operator are coordinated so that they agree on the
//! columns they are partitioned on.
//!
//! ### Heuristic Optimizer
//!
//! [`heuristic::HeuristicOptimizer`] runs batches of [`rules`] through a rule controller:
//! every rule is applied until a pass fires nothing, and the batch is repeated until a whole
//! round fires nothing.
//!
//! ### Job generation
//!
//! [`jobgen::PlanCompiler`] lowers the optimized plan into runtime descriptors and
//! connectors. Chains of one-input micro operators are fused into pipelines, which
//! [`pipeline::PipelineAssembler`] turns into push based runtimes.

#[macro_use]
extern crate prettytable;

pub mod config;
pub mod constraint;
pub mod context;
pub mod error;
pub mod expr;
pub mod heuristic;
pub mod jobgen;
pub mod operator;
pub mod physical;
pub mod pipeline;
pub mod plan;
pub mod properties;
pub mod rules;
