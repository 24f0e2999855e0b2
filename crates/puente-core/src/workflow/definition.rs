//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts between JSON/YAML files and the exported `WorkflowDefinition`,
//! validates the structural rules every definition must satisfy, and provides
//! discovery for definition files on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use puente_types::workflow::{StepType, WorkflowDefinition};
use thiserror::Error;

use super::graph::StepGraph;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while building, validating or storing workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure not covered by a more specific variant.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Two steps share an identifier.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStep(String),

    /// A transition or next-step entry names a step that does not exist.
    #[error("unknown step: {0}")]
    UnknownStep(String),

    /// The designated start step is not in the step collection.
    #[error("start step '{0}' is not defined")]
    StartStepMissing(String),

    /// Outgoing transitions do not match what the step kind requires.
    #[error("transition mismatch: {0}")]
    TransitionMismatch(String),

    /// A step cannot be reached from the start step.
    #[error("step '{0}' is unreachable from the start step")]
    UnreachableStep(String),

    /// No terminal step can be reached from a step.
    #[error("no terminal step is reachable from '{0}'")]
    NoTerminalPath(String),

    /// A citizen form is malformed or disagrees with the step's inputs.
    #[error("invalid form: {0}")]
    InvalidForm(String),

    /// An integration or approval binding is malformed.
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// JEXL expression error.
    #[error("expression error: {0}")]
    ExpressionError(String),

    /// Runtime failure while running a workflow.
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// No catalog entry has this workflow ID.
    #[error("unknown workflow: '{0}'")]
    UnknownWorkflow(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON string into a validated `WorkflowDefinition`.
pub fn parse_definition_json(json: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_definition_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to pretty-printed JSON.
pub fn serialize_definition_json(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_json::to_string_pretty(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Serialize a `WorkflowDefinition` to YAML.
pub fn serialize_definition_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the structural rules of a `WorkflowDefinition`.
///
/// Checks:
/// - `workflow_id` is non-empty lowercase snake case
/// - `version` is a semantic version
/// - At least one step exists and all step IDs are unique
/// - `start_step_id` names an existing step
/// - Every `next_steps` entry names an existing step, without repeats
/// - Terminal steps have no successors; every other step has at least one
/// - Conditional and approval steps have exactly two successors
/// - Every step is reachable from the start step
/// - A terminal step is reachable from every step
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    check_structure(def)?;
    check_reachability(def, &HashSet::new())
}

/// Every rule of [`validate_definition`] except reachability.
pub(crate) fn check_structure(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.workflow_id.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow_id must not be empty".to_string(),
        ));
    }
    if !def
        .workflow_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(WorkflowError::ValidationError(format!(
            "workflow_id '{}' contains invalid characters (only lowercase letters, digits and underscores allowed)",
            def.workflow_id
        )));
    }

    if let Err(e) = semver::Version::parse(&def.version) {
        return Err(WorkflowError::ValidationError(format!(
            "version '{}' is not a semantic version: {e}",
            def.version
        )));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !seen_ids.insert(step.step_id.as_str()) {
            return Err(WorkflowError::DuplicateStep(step.step_id.clone()));
        }
    }

    if !seen_ids.contains(def.start_step_id.as_str()) {
        return Err(WorkflowError::StartStepMissing(def.start_step_id.clone()));
    }

    for step in &def.steps {
        let mut targets = HashSet::new();
        for next in &step.next_steps {
            if !seen_ids.contains(next.as_str()) {
                return Err(WorkflowError::UnknownStep(format!(
                    "step '{}' transitions to unknown step '{}'",
                    step.step_id, next
                )));
            }
            if !targets.insert(next.as_str()) {
                return Err(WorkflowError::TransitionMismatch(format!(
                    "step '{}' lists '{}' more than once",
                    step.step_id, next
                )));
            }
        }

        match step.step_type {
            StepType::Terminal if !step.next_steps.is_empty() => {
                return Err(WorkflowError::TransitionMismatch(format!(
                    "terminal step '{}' must not have outgoing transitions",
                    step.step_id
                )));
            }
            StepType::Conditional | StepType::Approval if step.next_steps.len() != 2 => {
                return Err(WorkflowError::TransitionMismatch(format!(
                    "{} step '{}' must have exactly 2 outgoing transitions, found {}",
                    step.step_type,
                    step.step_id,
                    step.next_steps.len()
                )));
            }
            StepType::Action | StepType::Integration if step.next_steps.is_empty() => {
                return Err(WorkflowError::TransitionMismatch(format!(
                    "non-terminal step '{}' has no outgoing transition",
                    step.step_id
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Reachability rules. Steps named in `islands` may be unreachable from the
/// start step; they still need a path to a terminal.
pub(crate) fn check_reachability(
    def: &WorkflowDefinition,
    islands: &HashSet<&str>,
) -> Result<(), WorkflowError> {
    let graph = StepGraph::from_definition(def)?;

    let reachable = graph.reachable_from(&def.start_step_id);
    for step in &def.steps {
        if !reachable.contains(&step.step_id) && !islands.contains(step.step_id.as_str()) {
            return Err(WorkflowError::UnreachableStep(step.step_id.clone()));
        }
    }

    let exits = graph.reaching_any(&def.terminal_step_ids());
    for step in &def.steps {
        if !exits.contains(&step.step_id) {
            return Err(WorkflowError::NoTerminalPath(step.step_id.clone()));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

fn is_yaml(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("json"))
}

/// Load a definition from a `.json`, `.yaml` or `.yml` file.
pub fn load_definition_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    if is_json(path) {
        parse_definition_json(&content)
    } else if is_yaml(path) {
        parse_definition_yaml(&content)
    } else {
        Err(WorkflowError::ParseError(format!(
            "unsupported definition file extension: {}",
            path.display()
        )))
    }
}

/// Save a definition, choosing the encoding from the file extension.
///
/// Creates parent directories if they don't exist.
pub fn save_definition_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let content = if is_yaml(path) {
        serialize_definition_yaml(def)?
    } else if is_json(path) {
        serialize_definition_json(def)?
    } else {
        return Err(WorkflowError::ParseError(format!(
            "unsupported definition file extension: {}",
            path.display()
        )));
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Discover all definition files under `base_dir`.
///
/// Scans for `.json`, `.yaml` and `.yml` files recursively. Files that fail
/// to parse or validate are skipped with a warning.
pub fn discover_definitions(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDefinition)>,
) -> Result<(), WorkflowError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if is_json(&path) || is_yaml(&path) {
            match load_definition_file(&path) {
                Ok(def) => results.push((path, def)),
                Err(error) => {
                    tracing::warn!(?path, %error, "skipping invalid workflow definition file");
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
