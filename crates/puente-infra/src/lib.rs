//! Infrastructure layer for Puente Catastral.
//!
//! Loads `config.toml` from the data directory, resolves where that
//! directory and the export directory live, and writes exported workflow
//! definitions to disk.

pub mod config;
pub mod filesystem;
