//! Reference runner: walks a built [`Workflow`] for a single run.
//!
//! Action and integration steps go to a [`StepHandler`] and their payloads
//! are merged into the run context. Conditional steps evaluate their
//! predicate and follow the matching guarded transition. Actions with a form
//! suspend until [`WorkflowRunner::submit_input`] supplies valid values, and
//! approval steps suspend until [`WorkflowRunner::record_decision`] or
//! [`WorkflowRunner::check_timeout`] resolves them. Terminal steps complete
//! the run.
//!
//! No persistence, scheduling or retries: a `WorkflowRun` lives in memory and
//! is owned by the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use puente_types::config::{ApprovalConfig, GlobalConfig, TimeoutDisposition};
use puente_types::form::InputForm;
use puente_types::run::{ApprovalDecision, StepOutcome, StepRecord, WorkflowRunStatus};
use puente_types::step::{Step, StepKind, TerminalOutcome};
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::builder::Workflow;
use super::context::WorkflowContext;
use super::definition::WorkflowError;
use super::expression::WorkflowEvaluator;
use super::form::{FieldError, validate_submission};
use super::handler::{StepHandler, StepStatus};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Why a run is waiting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Suspension {
    AwaitingInput {
        step_id: String,
        form: InputForm,
    },
    AwaitingApproval {
        step_id: String,
        /// Roles currently allowed to decide. Replaced by the escalation
        /// role when an expired approval is escalated.
        roles: Vec<String>,
        requested_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
        overdue: bool,
    },
}

impl Suspension {
    pub fn step_id(&self) -> &str {
        match self {
            Suspension::AwaitingInput { step_id, .. } | Suspension::AwaitingApproval { step_id, .. } => step_id,
        }
    }
}

/// State of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: WorkflowRunStatus,
    /// Step the run is at; `None` once finished.
    pub current_step: Option<String>,
    pub context: WorkflowContext,
    pub history: Vec<StepRecord>,
    pub suspension: Option<Suspension>,
    pub outcome: Option<TerminalOutcome>,
    pub error: Option<String>,
    /// Form step whose input has been accepted but not yet executed.
    #[serde(skip)]
    accepted_input: Option<String>,
}

impl WorkflowRun {
    fn new(workflow: &Workflow, initial: Map<String, Value>) -> Self {
        let run_id = Uuid::now_v7();
        Self {
            run_id,
            workflow_id: workflow.workflow_id().to_string(),
            status: WorkflowRunStatus::Running,
            current_step: Some(workflow.start_step_id().to_string()),
            context: WorkflowContext::new(workflow.workflow_id(), run_id, initial),
            history: Vec::new(),
            suspension: None,
            outcome: None,
            error: None,
            accepted_input: None,
        }
    }

    /// Whether the run ever arrived at `step_id`.
    pub fn visited(&self, step_id: &str) -> bool {
        self.history.iter().any(|r| r.step_id == step_id)
    }

    /// Step IDs in visit order, consecutive repeats collapsed.
    pub fn path(&self) -> Vec<&str> {
        let mut path: Vec<&str> = Vec::new();
        for record in &self.history {
            if path.last() != Some(&record.step_id.as_str()) {
                path.push(&record.step_id);
            }
        }
        path
    }

    fn record(&mut self, step: &Step, outcome: StepOutcome, branch: Option<bool>, note: Option<String>) {
        self.history.push(StepRecord {
            step_id: step.id.clone(),
            step_type: step.step_type(),
            outcome,
            branch,
            at: Utc::now(),
            note,
        });
    }

    fn suspend(&mut self, suspension: Suspension) {
        self.status = match suspension {
            Suspension::AwaitingInput { .. } => WorkflowRunStatus::AwaitingInput,
            Suspension::AwaitingApproval { .. } => WorkflowRunStatus::AwaitingApproval,
        };
        self.suspension = Some(suspension);
    }

    fn fail(&mut self, error: String) {
        tracing::warn!(run_id = %self.run_id, step = ?self.current_step, %error, "workflow run failed");
        self.status = WorkflowRunStatus::Failed;
        self.error = Some(error);
        self.suspension = None;
    }
}

// ---------------------------------------------------------------------------
// RunnerError
// ---------------------------------------------------------------------------

fn join_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Errors returned by runner operations.
///
/// Failures inside the workflow itself (a failed integration without a
/// failure route, a predicate that cannot be evaluated) do not surface here:
/// they move the run to `Failed` and set `WorkflowRun::error`.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Submitted form values failed validation; one entry per field.
    #[error("invalid input: {}", join_field_errors(.0))]
    InvalidInput(Vec<FieldError>),

    /// Operation does not apply to the run in its current state.
    #[error("run is {status}, cannot {operation}")]
    InvalidState {
        status: WorkflowRunStatus,
        operation: &'static str,
    },

    #[error("role '{role}' may not decide approval step '{step_id}'")]
    UnauthorizedApprover { role: String, step_id: String },

    #[error("step '{step_id}' failed: {error}")]
    StepFailed { step_id: String, error: String },

    #[error("predicate of step '{step_id}' failed: {error}")]
    Predicate { step_id: String, error: String },

    #[error("run exceeded {0} transitions without suspending or finishing")]
    TransitionLimit(u32),
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

pub struct WorkflowRunner<H: StepHandler> {
    workflow: Arc<Workflow>,
    handler: H,
    evaluator: WorkflowEvaluator,
    approval: ApprovalConfig,
    max_transitions: u32,
}

impl<H: StepHandler> WorkflowRunner<H> {
    pub fn new(workflow: Arc<Workflow>, handler: H) -> Self {
        let defaults = GlobalConfig::default();
        Self {
            workflow,
            handler,
            evaluator: WorkflowEvaluator::new(),
            approval: defaults.approval,
            max_transitions: defaults.runner.max_transitions,
        }
    }

    /// Apply approval and runner settings from the global configuration.
    pub fn with_config(mut self, config: &GlobalConfig) -> Self {
        self.approval = config.approval.clone();
        self.max_transitions = config.runner.max_transitions;
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Start a run and advance it until it suspends or finishes.
    pub async fn start(&self, initial: Map<String, Value>) -> WorkflowRun {
        let mut run = WorkflowRun::new(&self.workflow, initial);
        tracing::debug!(run_id = %run.run_id, workflow_id = %run.workflow_id, "starting workflow run");
        self.drive(&mut run).await;
        run
    }

    /// Supply citizen input for a run suspended on a form.
    ///
    /// Every failing field is reported in `RunnerError::InvalidInput`; the
    /// run stays suspended in that case.
    pub async fn submit_input(&self, run: &mut WorkflowRun, values: Map<String, Value>) -> Result<(), RunnerError> {
        let Some(Suspension::AwaitingInput { step_id, form }) = &run.suspension else {
            return Err(RunnerError::InvalidState {
                status: run.status,
                operation: "accept input",
            });
        };
        validate_submission(form, &values).map_err(RunnerError::InvalidInput)?;

        let step_id = step_id.clone();
        run.context.merge(&step_id, values)?;
        run.suspension = None;
        run.accepted_input = Some(step_id);
        self.drive(run).await;
        Ok(())
    }

    /// Decide a pending approval.
    pub async fn record_decision(&self, run: &mut WorkflowRun, decision: ApprovalDecision) -> Result<(), RunnerError> {
        let Some(Suspension::AwaitingApproval { step_id, roles, .. }) = &run.suspension else {
            return Err(RunnerError::InvalidState {
                status: run.status,
                operation: "record an approval decision",
            });
        };
        if !roles.contains(&decision.role) {
            return Err(RunnerError::UnauthorizedApprover {
                role: decision.role,
                step_id: step_id.clone(),
            });
        }

        let step = self.step(step_id)?;
        tracing::debug!(step_id = %step.id, role = %decision.role, approved = decision.approved, "approval decided");
        let payload = Map::from_iter([(
            format!("{}_decision", step.id),
            json!({
                "approved": decision.approved,
                "role": decision.role,
                "comment": decision.comment,
            }),
        )]);
        run.context.merge(&step.id, payload)?;
        run.record(step, StepOutcome::Branched, Some(decision.approved), decision.comment.clone());
        run.suspension = None;
        self.follow(run, step, Some(decision.approved))?;
        self.drive(run).await;
        Ok(())
    }

    /// Apply the timeout disposition if a pending approval is past its
    /// deadline at `now`. Returns whether the deadline had passed.
    ///
    /// A timed-out approval never follows the approved branch.
    pub async fn check_timeout(&self, run: &mut WorkflowRun, now: DateTime<Utc>) -> Result<bool, RunnerError> {
        let Some(Suspension::AwaitingApproval {
            step_id,
            deadline,
            overdue,
            ..
        }) = &run.suspension
        else {
            return Err(RunnerError::InvalidState {
                status: run.status,
                operation: "check an approval timeout",
            });
        };
        if now < *deadline {
            return Ok(false);
        }
        if *overdue {
            return Ok(true);
        }

        let step = self.step(step_id)?;
        let disposition = self.approval.timeout_disposition;
        tracing::warn!(step_id = %step.id, %disposition, deadline = %deadline, "approval timed out");

        match disposition {
            TimeoutDisposition::Block => {
                if let Some(Suspension::AwaitingApproval { overdue, .. }) = &mut run.suspension {
                    *overdue = true;
                }
                run.record(step, StepOutcome::TimedOut, None, Some("blocked awaiting decision".to_string()));
            }
            TimeoutDisposition::Escalate => {
                let role = self.approval.escalation_role.clone();
                if let Some(Suspension::AwaitingApproval { overdue, roles, .. }) = &mut run.suspension {
                    *overdue = true;
                    *roles = vec![role.clone()];
                }
                run.status = WorkflowRunStatus::Escalated;
                run.record(step, StepOutcome::TimedOut, None, Some(format!("escalated to {role}")));
            }
            TimeoutDisposition::Reject => {
                run.suspension = None;
                run.record(step, StepOutcome::TimedOut, Some(false), Some("rejected on timeout".to_string()));
                self.follow(run, step, Some(false))?;
                self.drive(run).await;
            }
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn step(&self, step_id: &str) -> Result<&Step, WorkflowError> {
        self.workflow
            .step(step_id)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))
    }

    /// Move the run along the transition out of `step` matching `guard`.
    fn follow(&self, run: &mut WorkflowRun, step: &Step, guard: Option<bool>) -> Result<(), WorkflowError> {
        let next = self.workflow.next_step(&step.id, guard).ok_or_else(|| {
            WorkflowError::UnknownStep(format!("step '{}' has no transition for guard {guard:?}", step.id))
        })?;
        run.current_step = Some(next.to_string());
        Ok(())
    }

    /// Advance, turning in-workflow errors into a failed run.
    async fn drive(&self, run: &mut WorkflowRun) {
        if let Err(e) = self.advance(run).await {
            run.fail(e.to_string());
        }
    }

    async fn advance(&self, run: &mut WorkflowRun) -> Result<(), RunnerError> {
        run.status = WorkflowRunStatus::Running;

        for _ in 0..self.max_transitions {
            let Some(step_id) = run.current_step.clone() else {
                return Ok(());
            };
            let step = self.step(&step_id)?;

            match &step.kind {
                StepKind::Action { form: Some(form) } if run.accepted_input.as_deref() != Some(step.id.as_str()) => {
                    tracing::debug!(step_id = %step.id, "suspending for citizen input");
                    run.record(step, StepOutcome::Suspended, None, None);
                    run.suspend(Suspension::AwaitingInput {
                        step_id: step.id.clone(),
                        form: form.clone(),
                    });
                    return Ok(());
                }
                StepKind::Action { .. } => {
                    run.accepted_input = None;
                    if self.execute(run, step).await? == StepStatus::Failed {
                        return Err(RunnerError::StepFailed {
                            step_id: step.id.clone(),
                            error: "action reported failure".to_string(),
                        });
                    }
                    self.follow(run, step, None)?;
                }
                StepKind::Integration { binding } => match self.execute(run, step).await? {
                    StepStatus::Success => self.follow(run, step, None)?,
                    StepStatus::Failed => match &binding.on_failure {
                        Some(target) => {
                            tracing::warn!(step_id = %step.id, service = %binding.service_name, route = %target, "integration failed, taking failure route");
                            run.current_step = Some(target.clone());
                        }
                        None => {
                            return Err(RunnerError::StepFailed {
                                step_id: step.id.clone(),
                                error: format!("{} {} reported failure", binding.service_name, binding.endpoint),
                            });
                        }
                    },
                },
                StepKind::Conditional { predicate } => {
                    let branch = self
                        .evaluator
                        .evaluate_in_workflow_context(predicate, &run.context)
                        .map_err(|e| RunnerError::Predicate {
                            step_id: step.id.clone(),
                            error: e.to_string(),
                        })?;
                    tracing::debug!(step_id = %step.id, predicate = %predicate, branch, "conditional evaluated");
                    run.record(step, StepOutcome::Branched, Some(branch), None);
                    self.follow(run, step, Some(branch))?;
                }
                StepKind::Approval { binding } => {
                    let requested_at = Utc::now();
                    let deadline = requested_at + Duration::hours(i64::from(binding.timeout_hours));
                    tracing::debug!(step_id = %step.id, roles = ?binding.approver_roles, %deadline, "suspending for approval");
                    run.record(step, StepOutcome::Suspended, None, None);
                    run.suspend(Suspension::AwaitingApproval {
                        step_id: step.id.clone(),
                        roles: binding.approver_roles.clone(),
                        requested_at,
                        deadline,
                        overdue: false,
                    });
                    return Ok(());
                }
                StepKind::Terminal { outcome, .. } => {
                    run.record(step, StepOutcome::Completed, None, None);
                    run.status = WorkflowRunStatus::Completed;
                    run.outcome = Some(*outcome);
                    run.current_step = None;
                    tracing::info!(run_id = %run.run_id, workflow_id = %run.workflow_id, step_id = %step.id, %outcome, "workflow run completed");
                    return Ok(());
                }
            }
        }

        Err(RunnerError::TransitionLimit(self.max_transitions))
    }

    /// Run an action or integration step through the handler and merge its
    /// payload.
    async fn execute(&self, run: &mut WorkflowRun, step: &Step) -> Result<StepStatus, RunnerError> {
        let missing: Vec<&str> = step
            .required_inputs
            .iter()
            .filter(|k| run.context.get(k).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(RunnerError::StepFailed {
                step_id: step.id.clone(),
                error: format!("missing required inputs: {}", missing.join(", ")),
            });
        }

        tracing::debug!(step_id = %step.id, step_type = %step.step_type(), "executing step");
        let result = self
            .handler
            .execute(step, &run.context)
            .await
            .map_err(|e| RunnerError::StepFailed {
                step_id: step.id.clone(),
                error: e.to_string(),
            })?;

        run.context.merge(&step.id, result.payload)?;
        let outcome = match result.status {
            StepStatus::Success => StepOutcome::Completed,
            StepStatus::Failed => StepOutcome::Failed,
        };
        run.record(step, outcome, None, result.message);
        Ok(result.status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
