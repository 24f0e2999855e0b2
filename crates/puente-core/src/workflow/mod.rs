//! Workflow core: definitions, graph validation, and the reference runner.
//!
//! - `definition` -- export-form parsing, validation, filesystem load/save
//! - `graph` -- petgraph reachability and shape comparison
//! - `builder` -- typed `Workflow` and its fluent builder
//! - `form` -- citizen form checks and per-field submission validation
//! - `context` -- run context accumulator (last write wins)
//! - `expression` -- JEXL evaluator for conditional predicates
//! - `handler` -- `StepHandler` trait and the canned handler
//! - `runner` -- single-run reference runner with suspension and approvals

pub mod builder;
pub mod context;
pub mod definition;
pub mod expression;
pub mod form;
pub mod graph;
pub mod handler;
pub mod runner;
