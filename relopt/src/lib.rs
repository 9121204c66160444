//! ## Background
//!
//! A SQL compiler translates a query into a tree of relational algebra operators. The tree is
//! logically a dag: subplans may be referenced by several parents, e.g. a common table
//! expression used twice. Before the tree is handed to code generation it is rewritten into an
//! equivalent but cheaper tree. This crate implements that rewriting.
//!
//! Optimization comes in two flavors here. Heuristic rewrites are applied repeatedly until the
//! plan no longer changes (a fix point) or an iteration cap is reached; they remove redundant
//! work such as stacked projections, unnecessary `DISTINCT`s or selections that could be
//! evaluated closer to the base tables. Join ordering is cost based: the relations of an n-way
//! inner join are enumerated bottom-up in a memo [1], every alternative is costed with a simple
//! build/probe model and the cheapest tree is kept. When the join graph is disconnected or too
//! large a greedy ordering is used instead.
//!
//! Rewrites are gated by facts about each node, e.g. which columns are constant, which columns
//! ancestors still need, and on which columns the output is unique. These facts are inferred
//! before every rewrite pass and are never patched incrementally.
//!
//! ## Design
//!
//! * [`expr`] Scalar expressions.
//! * [`plan`] Relational nodes, traversal engine and plan explain.
//! * [`operator`] Relational operators.
//! * [`properties`] Constant, needed column and uniqueness inference.
//! * [`rules`] Rewrite rule definition and implementation.
//! * [`heuristic`] Rewrite passes driven by the traversal engine.
//! * [`join_order`] Memo based join order planner.
//! * [`cost`] Cost model and cardinality estimation.
//! * [`optimizer`] Optimizer driver.
//!
//! ## Reference
//!
//! 1. Selinger, P. Griffiths, et al. "Access path selection in a relational database management
//! system." Readings in Artificial Intelligence and Databases. Morgan Kaufmann, 1989. 511-522.
//! 2. Moerkotte, G. and Neumann, T., 2006. Analysis of two existing and one new dynamic
//! programming algorithm for the generation of optimal bushy join trees without cross
//! products. In Proceedings of the 32nd international conference on Very large data bases.

#[macro_use]
extern crate lazy_static;

pub mod catalog;
pub mod cost;
pub mod error;
pub mod expr;
pub mod heuristic;
pub mod join_order;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod rules;
pub mod stat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{OptResult, OptimizerError};
pub use optimizer::{optimize, OptimizeReport, Optimizer, OptimizerConfig, OptimizerContext};
