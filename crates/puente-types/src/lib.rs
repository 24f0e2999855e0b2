//! Shared domain types for Puente Catastral.
//!
//! This crate contains the types shared across the workspace: the plain-data
//! workflow export format, the typed step model, citizen input forms, run
//! tracking records, and global configuration.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, chrono, schemars.

pub mod config;
pub mod form;
pub mod run;
pub mod step;
pub mod workflow;
