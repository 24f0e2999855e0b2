//! Logging and trace export setup for the `puente` binary.

pub mod tracing_setup;
