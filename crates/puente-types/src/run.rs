//! Execution tracking types for the reference runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::StepType;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    /// Suspended on a citizen form.
    AwaitingInput,
    /// Suspended on an approval gate.
    AwaitingApproval,
    /// Approval timed out and was handed to the escalation role.
    Escalated,
    Completed,
    Failed,
}

impl WorkflowRunStatus {
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            WorkflowRunStatus::AwaitingInput | WorkflowRunStatus::AwaitingApproval | WorkflowRunStatus::Escalated
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, WorkflowRunStatus::Completed | WorkflowRunStatus::Failed)
    }
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowRunStatus::Running => write!(f, "running"),
            WorkflowRunStatus::AwaitingInput => write!(f, "awaiting_input"),
            WorkflowRunStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            WorkflowRunStatus::Escalated => write!(f, "escalated"),
            WorkflowRunStatus::Completed => write!(f, "completed"),
            WorkflowRunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to a step when the runner visited it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Suspended,
    /// Predicate or decision selected a branch.
    Branched,
    /// Approval deadline passed without a decision.
    TimedOut,
    Failed,
}

/// One entry in a run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub step_type: StepType,
    pub outcome: StepOutcome,
    /// Branch taken by conditional and approval steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A decision recorded against a pending approval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Role the decider is acting under.
    pub role: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            approved: true,
            comment: None,
        }
    }

    pub fn reject(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            approved: false,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_helpers() {
        assert!(WorkflowRunStatus::AwaitingInput.is_suspended());
        assert!(WorkflowRunStatus::Escalated.is_suspended());
        assert!(!WorkflowRunStatus::Running.is_suspended());
        assert!(WorkflowRunStatus::Failed.is_finished());
        assert_eq!(WorkflowRunStatus::AwaitingApproval.to_string(), "awaiting_approval");
    }

    #[test]
    fn record_serializes_branch_only_when_set() {
        let record = StepRecord {
            step_id: "collect".into(),
            step_type: StepType::Action,
            outcome: StepOutcome::Completed,
            branch: None,
            at: Utc::now(),
            note: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("branch").is_none());
        assert_eq!(json["outcome"], "completed");
    }

    #[test]
    fn decision_constructors() {
        let d = ApprovalDecision::reject("supervisor_avaluos").with_comment("valor fuera de rango");
        assert!(!d.approved);
        assert_eq!(d.comment.as_deref(), Some("valor fuera de rango"));
    }
}
