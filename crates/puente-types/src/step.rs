//! Typed step model used by the workflow builder.
//!
//! Where the export form only records a `step_type` string, the typed form
//! carries the data each kind needs: the citizen form of an action, the
//! service binding of an integration, the predicate of a conditional, the
//! approver roles of an approval gate, and the outcome of a terminal step.

use serde::{Deserialize, Serialize};

use crate::form::InputForm;
use crate::workflow::StepType;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A step in a typed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within a workflow.
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: StepKind,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub optional_inputs: Vec<String>,
}

impl Step {
    fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            kind,
            required_inputs: Vec::new(),
            optional_inputs: Vec::new(),
        }
    }

    /// An automated action with no citizen interaction.
    pub fn action(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, name, description, StepKind::Action { form: None })
    }

    /// An action that suspends until the citizen submits `form`.
    pub fn form_action(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        form: InputForm,
    ) -> Self {
        Self::new(id, name, description, StepKind::Action { form: Some(form) })
    }

    pub fn integration(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        binding: IntegrationBinding,
    ) -> Self {
        Self::new(id, name, description, StepKind::Integration { binding })
    }

    /// A branch point; `predicate` is a JEXL expression over the run context.
    pub fn conditional(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        predicate: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            description,
            StepKind::Conditional {
                predicate: predicate.into(),
            },
        )
    }

    pub fn approval(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        binding: ApprovalBinding,
    ) -> Self {
        Self::new(id, name, description, StepKind::Approval { binding })
    }

    pub fn terminal(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        outcome: TerminalOutcome,
    ) -> Self {
        Self::new(
            id,
            name,
            description,
            StepKind::Terminal {
                outcome,
                standalone: false,
            },
        )
    }

    /// Mark a terminal step as an intentional island that may be unreachable
    /// from the start step. Has no effect on other kinds.
    pub fn standalone(mut self) -> Self {
        if let StepKind::Terminal { standalone, .. } = &mut self.kind {
            *standalone = true;
        }
        self
    }

    pub fn with_required_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_optional_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// The export-form step type for this kind.
    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }

    /// The citizen form, for input-collecting actions.
    pub fn form(&self) -> Option<&InputForm> {
        match &self.kind {
            StepKind::Action { form } => form.as_ref(),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StepKind::Terminal { .. })
    }
}

// ---------------------------------------------------------------------------
// Step kinds
// ---------------------------------------------------------------------------

/// Closed set of step kinds. Consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Action {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form: Option<InputForm>,
    },
    Integration {
        binding: IntegrationBinding,
    },
    Conditional {
        predicate: String,
    },
    Approval {
        binding: ApprovalBinding,
    },
    Terminal {
        outcome: TerminalOutcome,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        standalone: bool,
    },
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::Action { .. } => StepType::Action,
            StepKind::Integration { .. } => StepType::Integration,
            StepKind::Conditional { .. } => StepType::Conditional,
            StepKind::Approval { .. } => StepType::Approval,
            StepKind::Terminal { .. } => StepType::Terminal,
        }
    }
}

/// Binding of an integration step to an external service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationBinding {
    /// Logical service name, e.g. `rpp_service`.
    pub service_name: String,
    /// Endpoint path on that service, e.g. `/api/v1/rpp/search`.
    pub endpoint: String,
    /// Terminal step taken when the call reports failure. Without one a
    /// failed call fails the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
}

impl IntegrationBinding {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            on_failure: None,
        }
    }

    pub fn on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.on_failure = Some(step_id.into());
        self
    }
}

/// Who may decide an approval step, and for how long it may wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalBinding {
    pub approver_roles: Vec<String>,
    pub timeout_hours: u32,
}

impl ApprovalBinding {
    pub fn new<I, S>(approver_roles: I, timeout_hours: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approver_roles: approver_roles.into_iter().map(Into::into).collect(),
            timeout_hours,
        }
    }

    pub fn allows(&self, role: &str) -> bool {
        self.approver_roles.iter().any(|r| r == role)
    }
}

/// How a run ends when it reaches a terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Success,
    Rejected,
    ManualReview,
    RolledBack,
    NotFound,
    Incomplete,
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalOutcome::Success => write!(f, "success"),
            TerminalOutcome::Rejected => write!(f, "rejected"),
            TerminalOutcome::ManualReview => write!(f, "manual_review"),
            TerminalOutcome::RolledBack => write!(f, "rolled_back"),
            TerminalOutcome::NotFound => write!(f, "not_found"),
            TerminalOutcome::Incomplete => write!(f, "incomplete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// A directed edge between two steps.
///
/// `guard` is `None` for the single successor of an action or integration
/// step. Conditional steps carry one `Some(true)` and one `Some(false)` edge;
/// approval steps use `true` for approved and `false` for rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<bool>,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
        }
    }

    pub fn guarded(from: impl Into<String>, to: impl Into<String>, guard: bool) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: Some(guard),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_tagged_by_type() {
        let step = Step::conditional("linking_decision", "Decisión", "", "match_score >= 90");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["kind"]["type"], "conditional");
        assert_eq!(json["kind"]["predicate"], "match_score >= 90");
    }

    #[test]
    fn standalone_only_applies_to_terminals() {
        let island = Step::terminal("rollback", "Rollback", "", TerminalOutcome::RolledBack).standalone();
        assert!(matches!(island.kind, StepKind::Terminal { standalone: true, .. }));

        let action = Step::action("a", "A", "").standalone();
        assert_eq!(action.kind, StepKind::Action { form: None });
    }

    #[test]
    fn standalone_flag_omitted_when_false() {
        let step = Step::terminal("done", "Done", "", TerminalOutcome::Success);
        let json = serde_json::to_value(&step).unwrap();
        assert!(json["kind"].get("standalone").is_none());
        assert_eq!(json["kind"]["outcome"], "success");
    }

    #[test]
    fn step_type_follows_kind() {
        let binding = IntegrationBinding::new("rpp_service", "/api/v1/rpp/search");
        assert_eq!(Step::integration("s", "S", "", binding).step_type(), StepType::Integration);
        let approval = ApprovalBinding::new(["supervisor_avaluos"], 48);
        assert_eq!(Step::approval("r", "R", "", approval).step_type(), StepType::Approval);
    }

    #[test]
    fn approval_roles() {
        let binding = ApprovalBinding::new(["supervisor_avaluos"], 48);
        assert!(binding.allows("supervisor_avaluos"));
        assert!(!binding.allows("ciudadano"));
    }

    #[test]
    fn transition_guard_roundtrip() {
        let t = Transition::guarded("a", "b", false);
        let json = serde_json::to_string(&t).unwrap();
        let back: Transition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.guard, Some(false));

        let plain = serde_json::to_value(Transition::new("a", "b")).unwrap();
        assert!(plain.get("guard").is_none());
    }
}
