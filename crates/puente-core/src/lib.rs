//! Workflow definitions for the Catastro/RPP bridge.
//!
//! This crate holds the business logic: building and validating step graphs,
//! exporting them to the plain definition format, the catalog of municipal
//! workflows, and an in-memory reference runner. It depends only on
//! `puente-types` -- never on `puente-infra` or any configuration I/O.

pub mod catalog;
pub mod workflow;
