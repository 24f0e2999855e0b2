//! Step handlers for action and integration steps.
//!
//! The runner never talks to Catastro or the RPP directly. Each action or
//! integration step is handed to a [`StepHandler`], which returns a status and
//! a payload to merge into the run context. [`CannedHandler`] answers from a
//! fixed table and backs simulations and tests.

use std::collections::HashMap;

use puente_types::step::{Step, StepKind};
use serde_json::{Map, Value};

use super::context::WorkflowContext;

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    Failed,
}

/// Outcome of one action or integration step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub status: StepStatus,
    /// Merged into the run context, last write wins.
    pub payload: Map<String, Value>,
    pub message: Option<String>,
}

impl StepResult {
    pub fn success(payload: Map<String, Value>) -> Self {
        Self {
            status: StepStatus::Success,
            payload,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: Map::new(),
            message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors a handler raises when it cannot produce a result at all.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    #[error("no handler for step '{0}'")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// StepHandler trait
// ---------------------------------------------------------------------------

/// Executes action and integration steps.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the rest of the workspace.
pub trait StepHandler: Send + Sync {
    fn execute(
        &self,
        step: &Step,
        ctx: &WorkflowContext,
    ) -> impl std::future::Future<Output = Result<StepResult, StepError>> + Send;
}

// ---------------------------------------------------------------------------
// CannedHandler
// ---------------------------------------------------------------------------

/// Answers action and integration steps from a fixed table. Steps without
/// an entry succeed with an empty payload; other step kinds are refused.
#[derive(Debug, Clone, Default)]
pub struct CannedHandler {
    responses: HashMap<String, StepResult>,
}

impl CannedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed `step_id` with `payload`. Non-object payloads are stored
    /// under a `value` key.
    pub fn respond(mut self, step_id: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            other => Map::from_iter([("value".to_string(), other)]),
        };
        self.responses.insert(step_id.into(), StepResult::success(payload));
        self
    }

    /// Fail `step_id` with `message`.
    pub fn fail(mut self, step_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.insert(step_id.into(), StepResult::failed(message));
        self
    }

    /// Override one key of a step's canned payload.
    pub fn set(&mut self, step_id: &str, key: impl Into<String>, value: Value) {
        self.responses
            .entry(step_id.to_string())
            .or_insert_with(|| StepResult::success(Map::new()))
            .payload
            .insert(key.into(), value);
    }

    pub fn response(&self, step_id: &str) -> Option<&StepResult> {
        self.responses.get(step_id)
    }
}

impl StepHandler for CannedHandler {
    async fn execute(&self, step: &Step, _ctx: &WorkflowContext) -> Result<StepResult, StepError> {
        if !matches!(step.kind, StepKind::Action { .. } | StepKind::Integration { .. }) {
            return Err(StepError::Unsupported(step.id.clone()));
        }
        Ok(self
            .responses
            .get(&step.id)
            .cloned()
            .unwrap_or_else(|| StepResult::success(Map::new())))
    }
}
