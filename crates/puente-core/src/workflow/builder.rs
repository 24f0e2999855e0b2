//! Typed workflows and the fluent builder that assembles them.
//!
//! Steps and transitions are declared explicitly and checked as a whole in
//! [`WorkflowBuilder::build`]. A built [`Workflow`] is immutable and exports
//! to the plain [`WorkflowDefinition`] form with [`Workflow::to_definition`].

use std::collections::HashSet;

use puente_types::step::{Step, StepKind, Transition};
use puente_types::workflow::{StepDefinition, WorkflowDefinition, WorkflowStatus};
use serde::Serialize;

use super::definition::{WorkflowError, check_reachability, check_structure};
use super::expression::check_syntax;
use super::form::check_form;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A validated workflow. Construct with [`Workflow::builder`].
#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    workflow_id: String,
    name: String,
    description: String,
    version: String,
    status: WorkflowStatus,
    steps: Vec<Step>,
    transitions: Vec<Transition>,
    start_step_id: String,
}

impl Workflow {
    pub fn builder(workflow_id: impl Into<String>, name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(workflow_id, name)
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn start_step_id(&self) -> &str {
        &self.start_step_id
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Outgoing transitions of a step, in declaration order.
    pub fn outgoing<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.from == step_id)
    }

    /// Successor of `step_id` along the transition whose guard equals `guard`.
    pub fn next_step(&self, step_id: &str, guard: Option<bool>) -> Option<&str> {
        self.transitions
            .iter()
            .find(|t| t.from == step_id && t.guard == guard)
            .map(|t| t.to.as_str())
    }

    /// Export to the plain-data form.
    ///
    /// `next_steps` lists unguarded successors in declaration order, then the
    /// `true` branch, then the `false` branch.
    pub fn to_definition(&self) -> WorkflowDefinition {
        let steps = self
            .steps
            .iter()
            .map(|step| {
                let mut next_steps: Vec<String> = self
                    .outgoing(&step.id)
                    .filter(|t| t.guard.is_none())
                    .map(|t| t.to.clone())
                    .collect();
                for guard in [true, false] {
                    if let Some(to) = self.next_step(&step.id, Some(guard)) {
                        next_steps.push(to.to_string());
                    }
                }
                StepDefinition {
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                    step_type: step.step_type(),
                    description: step.description.clone(),
                    required_inputs: step.required_inputs.clone(),
                    optional_inputs: step.optional_inputs.clone(),
                    next_steps,
                }
            })
            .collect();

        WorkflowDefinition {
            workflow_id: self.workflow_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            status: self.status,
            steps,
            start_step_id: self.start_step_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Workflow`].
///
/// ```ignore
/// let wf = Workflow::builder("demo_v1", "Demo")
///     .step(Step::action("collect", "Recopilar", ""))
///     .step(Step::conditional("check", "Verificar", "", "found == true"))
///     .step(Step::terminal("done", "Listo", "", TerminalOutcome::Success))
///     .step(Step::terminal("missing", "No encontrado", "", TerminalOutcome::NotFound))
///     .chain(["collect", "check"])
///     .branch("check", "done", "missing")
///     .start("collect")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow_id: String,
    name: String,
    description: String,
    version: String,
    status: WorkflowStatus,
    steps: Vec<Step>,
    transitions: Vec<Transition>,
    start_step_id: Option<String>,
}

impl WorkflowBuilder {
    pub fn new(workflow_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            status: WorkflowStatus::Draft,
            steps: Vec::new(),
            transitions: Vec::new(),
            start_step_id: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Unconditional edge `from -> to`.
    pub fn transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions.push(Transition::new(from, to));
        self
    }

    /// Unconditional edges between consecutive IDs.
    pub fn chain<I, S>(mut self, step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = step_ids.into_iter().map(Into::into).collect();
        for pair in ids.windows(2) {
            self.transitions.push(Transition::new(pair[0].clone(), pair[1].clone()));
        }
        self
    }

    /// Guarded edges out of a conditional or approval step.
    pub fn branch(
        mut self,
        step_id: impl Into<String>,
        if_true: impl Into<String>,
        if_false: impl Into<String>,
    ) -> Self {
        let step_id = step_id.into();
        self.transitions.push(Transition::guarded(step_id.clone(), if_true, true));
        self.transitions.push(Transition::guarded(step_id, if_false, false));
        self
    }

    pub fn start(mut self, step_id: impl Into<String>) -> Self {
        self.start_step_id = Some(step_id.into());
        self
    }

    /// Validate the graph and produce an immutable [`Workflow`].
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let start_step_id = self.start_step_id.clone().ok_or_else(|| {
            WorkflowError::ValidationError(format!(
                "workflow '{}' has no start step",
                self.workflow_id
            ))
        })?;

        let workflow = Workflow {
            workflow_id: self.workflow_id,
            name: self.name,
            description: self.description,
            version: self.version,
            status: self.status,
            steps: self.steps,
            transitions: self.transitions,
            start_step_id,
        };

        validate_workflow(&workflow)?;
        tracing::debug!(
            workflow_id = %workflow.workflow_id,
            steps = workflow.steps.len(),
            transitions = workflow.transitions.len(),
            "workflow built"
        );
        Ok(workflow)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_workflow(wf: &Workflow) -> Result<(), WorkflowError> {
    let mut ids = HashSet::new();
    for step in &wf.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStep(step.id.clone()));
        }
    }
    if !ids.contains(wf.start_step_id.as_str()) {
        return Err(WorkflowError::StartStepMissing(wf.start_step_id.clone()));
    }

    let mut seen = HashSet::new();
    for t in &wf.transitions {
        for end in [&t.from, &t.to] {
            if !ids.contains(end.as_str()) {
                return Err(WorkflowError::UnknownStep(format!(
                    "transition '{}' -> '{}' references unknown step '{}'",
                    t.from, t.to, end
                )));
            }
        }
        if !seen.insert((t.from.as_str(), t.to.as_str())) {
            return Err(WorkflowError::TransitionMismatch(format!(
                "duplicate transition '{}' -> '{}'",
                t.from, t.to
            )));
        }
    }

    let mut islands = HashSet::new();
    for step in &wf.steps {
        check_outgoing(wf, step)?;
        match &step.kind {
            StepKind::Action { form: Some(form) } => check_form(step, form)?,
            StepKind::Action { form: None } => {}
            StepKind::Integration { binding } => {
                if binding.service_name.trim().is_empty() {
                    return Err(WorkflowError::InvalidBinding(format!(
                        "integration step '{}' has no service name",
                        step.id
                    )));
                }
                if !binding.endpoint.starts_with('/') {
                    return Err(WorkflowError::InvalidBinding(format!(
                        "integration step '{}' endpoint '{}' must start with '/'",
                        step.id, binding.endpoint
                    )));
                }
                if let Some(target) = &binding.on_failure {
                    match wf.step(target) {
                        Some(t) if t.is_terminal() => {
                            islands.insert(target.as_str());
                        }
                        Some(_) => {
                            return Err(WorkflowError::InvalidBinding(format!(
                                "failure route of '{}' must be a terminal step, '{}' is not",
                                step.id, target
                            )));
                        }
                        None => {
                            return Err(WorkflowError::UnknownStep(format!(
                                "failure route of '{}' references unknown step '{}'",
                                step.id, target
                            )));
                        }
                    }
                }
            }
            StepKind::Conditional { predicate } => {
                if predicate.trim().is_empty() {
                    return Err(WorkflowError::ExpressionError(format!(
                        "conditional step '{}' has an empty predicate",
                        step.id
                    )));
                }
                check_syntax(predicate).map_err(|e| {
                    WorkflowError::ExpressionError(format!("predicate of conditional step '{}': {e}", step.id))
                })?;
            }
            StepKind::Approval { binding } => {
                if binding.approver_roles.is_empty() {
                    return Err(WorkflowError::InvalidBinding(format!(
                        "approval step '{}' has no approver roles",
                        step.id
                    )));
                }
                if binding.timeout_hours == 0 {
                    return Err(WorkflowError::InvalidBinding(format!(
                        "approval step '{}' must have a timeout of at least one hour",
                        step.id
                    )));
                }
            }
            StepKind::Terminal { standalone, .. } => {
                if *standalone {
                    islands.insert(step.id.as_str());
                }
            }
        }
    }

    let def = wf.to_definition();
    check_structure(&def)?;
    check_reachability(&def, &islands)
}

/// Outgoing transitions must match the step kind.
fn check_outgoing(wf: &Workflow, step: &Step) -> Result<(), WorkflowError> {
    let out: Vec<&Transition> = wf.outgoing(&step.id).collect();
    let mismatch = |detail: String| {
        Err(WorkflowError::TransitionMismatch(format!(
            "{} step '{}' {detail}",
            step.step_type(),
            step.id
        )))
    };

    match &step.kind {
        StepKind::Terminal { .. } => {
            if !out.is_empty() {
                return mismatch("must not have outgoing transitions".to_string());
            }
        }
        StepKind::Action { .. } | StepKind::Integration { .. } => {
            if out.len() != 1 {
                return mismatch(format!(
                    "must have exactly one outgoing transition, found {}",
                    out.len()
                ));
            }
            if out[0].guard.is_some() {
                return mismatch("cannot have a guarded transition".to_string());
            }
        }
        StepKind::Conditional { .. } | StepKind::Approval { .. } => {
            let guards: HashSet<Option<bool>> = out.iter().map(|t| t.guard).collect();
            let expected = HashSet::from([Some(true), Some(false)]);
            if out.len() != 2 || guards != expected {
                return mismatch(
                    "must have exactly one true and one false transition".to_string(),
                );
            }
            if out[0].to == out[1].to {
                return mismatch("branches to the same step twice".to_string());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use puente_types::form::{FormField, InputForm};
    use puente_types::step::{ApprovalBinding, IntegrationBinding, TerminalOutcome};
    use puente_types::workflow::StepType;

    fn base() -> WorkflowBuilder {
        Workflow::builder("demo_v1", "Demo")
            .description("Demo workflow")
            .step(Step::action("collect", "Recopilar", ""))
            .step(Step::integration(
                "search",
                "Buscar",
                "",
                IntegrationBinding::new("rpp_service", "/api/v1/rpp/search"),
            ))
            .step(Step::conditional("check", "Verificar", "", "found == true"))
            .step(Step::terminal("done", "Listo", "", TerminalOutcome::Success))
            .step(Step::terminal("missing", "No encontrado", "", TerminalOutcome::NotFound))
            .chain(["collect", "search", "check"])
            .branch("check", "done", "missing")
            .start("collect")
    }

    fn build_err(builder: WorkflowBuilder) -> String {
        builder.build().unwrap_err().to_string()
    }

    #[test]
    fn test_build_valid_workflow() {
        let wf = base().build().unwrap();
        assert_eq!(wf.workflow_id(), "demo_v1");
        assert_eq!(wf.steps().len(), 5);
        assert_eq!(wf.next_step("collect", None), Some("search"));
        assert_eq!(wf.next_step("check", Some(true)), Some("done"));
        assert_eq!(wf.next_step("check", Some(false)), Some("missing"));
        assert_eq!(wf.next_step("done", None), None);
    }

    #[test]
    fn test_to_definition_lists_true_branch_first() {
        // Declare the false branch first; export order is still true, false.
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "ok"))
            .step(Step::terminal("yes", "Sí", "", TerminalOutcome::Success))
            .step(Step::terminal("no", "No", "", TerminalOutcome::Rejected))
            .start("check");
        let wf = WorkflowBuilder {
            transitions: vec![
                Transition::guarded("check", "no", false),
                Transition::guarded("check", "yes", true),
            ],
            ..wf
        }
        .build()
        .unwrap();

        let def = wf.to_definition();
        assert_eq!(def.steps[0].next_steps, vec!["yes", "no"]);
        assert_eq!(def.steps[0].step_type, StepType::Conditional);
        assert_eq!(def.status, WorkflowStatus::Draft);
    }

    #[test]
    fn test_missing_start() {
        let builder = WorkflowBuilder {
            start_step_id: None,
            ..base()
        };
        assert!(build_err(builder).contains("no start step"));
    }

    #[test]
    fn test_start_not_defined() {
        assert!(matches!(
            base().start("ghost").build().unwrap_err(),
            WorkflowError::StartStepMissing(_)
        ));
    }

    #[test]
    fn test_duplicate_step() {
        let err = base()
            .step(Step::action("collect", "Otra", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateStep(ref id) if id == "collect"));
    }

    #[test]
    fn test_dangling_transition() {
        let err = base().transition("done", "ghost").build().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_transition() {
        let msg = build_err(base().transition("collect", "search"));
        assert!(msg.contains("duplicate transition"));
    }

    #[test]
    fn test_terminal_with_transition() {
        let msg = build_err(base().transition("done", "collect"));
        assert!(msg.contains("must not have outgoing transitions"), "got: {msg}");
    }

    #[test]
    fn test_action_without_transition() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::action("a", "A", ""))
            .start("a");
        assert!(build_err(wf).contains("exactly one outgoing transition"));
    }

    #[test]
    fn test_action_with_guarded_transition() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::action("a", "A", ""))
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .start("a");
        let wf = WorkflowBuilder {
            transitions: vec![Transition::guarded("a", "end", true)],
            ..wf
        };
        assert!(build_err(wf).contains("cannot have a guarded transition"));
    }

    #[test]
    fn test_conditional_needs_both_guards() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "ok"))
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .transition("check", "end")
            .start("check");
        assert!(build_err(wf).contains("one true and one false"));
    }

    #[test]
    fn test_conditional_same_target_twice() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "ok"))
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .branch("check", "end", "end")
            .start("check");
        let msg = build_err(wf);
        assert!(msg.contains("duplicate transition") || msg.contains("same step"), "got: {msg}");
    }

    #[test]
    fn test_unreachable_step() {
        let err = base()
            .step(Step::terminal("orphan", "Huérfano", "", TerminalOutcome::Rejected))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnreachableStep(ref id) if id == "orphan"));
    }

    #[test]
    fn test_standalone_terminal_may_be_unreachable() {
        let wf = base()
            .step(Step::terminal("orphan", "Isla", "", TerminalOutcome::RolledBack).standalone())
            .build()
            .unwrap();
        assert_eq!(wf.steps().len(), 6);
    }

    #[test]
    fn test_failure_route_counts_as_reachable() {
        let binding = IntegrationBinding::new("rpp_service", "/api/v1/rpp/sync").on_failure("rollback");
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::integration("sync", "Sincronizar", "", binding))
            .step(Step::terminal("done", "Listo", "", TerminalOutcome::Success))
            .step(Step::terminal("rollback", "Revertir", "", TerminalOutcome::RolledBack))
            .transition("sync", "done")
            .start("sync")
            .build()
            .unwrap();
        assert_eq!(wf.steps().len(), 3);
    }

    #[test]
    fn test_failure_route_must_be_terminal() {
        let binding = IntegrationBinding::new("rpp_service", "/api/v1/rpp/sync").on_failure("collect");
        let wf = base()
            .step(Step::integration("sync", "Sincronizar", "", binding))
            .transition("sync", "done");
        assert!(build_err(wf).contains("must be a terminal step"));
    }

    #[test]
    fn test_dead_loop_rejected() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "ok"))
            .step(Step::action("spin", "Girar", ""))
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .branch("check", "end", "spin")
            .transition("spin", "spin")
            .start("check")
            .build()
            .unwrap_err();
        assert!(matches!(wf, WorkflowError::NoTerminalPath(ref id) if id == "spin"));
    }

    #[test]
    fn test_invalid_bindings() {
        let bad_endpoint = IntegrationBinding::new("rpp_service", "api/no-slash");
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::integration("s", "S", "", bad_endpoint))
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .transition("s", "end")
            .start("s");
        assert!(build_err(wf).contains("must start with '/'"));

        let no_roles = ApprovalBinding::new(Vec::<String>::new(), 48);
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::approval("r", "R", "", no_roles))
            .step(Step::terminal("ok", "Ok", "", TerminalOutcome::Success))
            .step(Step::terminal("ko", "Ko", "", TerminalOutcome::Rejected))
            .branch("r", "ok", "ko")
            .start("r");
        assert!(build_err(wf).contains("no approver roles"));

        let zero = ApprovalBinding::new(["supervisor"], 0);
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::approval("r", "R", "", zero))
            .step(Step::terminal("ok", "Ok", "", TerminalOutcome::Success))
            .step(Step::terminal("ko", "Ko", "", TerminalOutcome::Rejected))
            .branch("r", "ok", "ko")
            .start("r");
        assert!(build_err(wf).contains("at least one hour"));
    }

    #[test]
    fn test_empty_predicate() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "  "))
            .step(Step::terminal("a", "A", "", TerminalOutcome::Success))
            .step(Step::terminal("b", "B", "", TerminalOutcome::Rejected))
            .branch("check", "a", "b")
            .start("check");
        assert!(build_err(wf).contains("empty predicate"));
    }

    #[test]
    fn test_malformed_predicate_fails_build() {
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(Step::conditional("check", "Verificar", "", "property_found >="))
            .step(Step::terminal("a", "A", "", TerminalOutcome::Success))
            .step(Step::terminal("b", "B", "", TerminalOutcome::NotFound))
            .branch("check", "a", "b")
            .start("check");
        let err = wf.build().unwrap_err();
        assert!(matches!(err, WorkflowError::ExpressionError(ref msg) if msg.contains("'check'")));
    }

    #[test]
    fn test_form_checked_at_build() {
        let form = InputForm::new("Datos").field(FormField::text("solicitante", "Solicitante"));
        let step = Step::form_action("collect", "Recopilar", "", form).with_required_inputs(["solicitante"]);
        let wf = Workflow::builder("demo_v1", "Demo")
            .step(step)
            .step(Step::terminal("end", "Fin", "", TerminalOutcome::Success))
            .transition("collect", "end")
            .start("collect");
        assert!(matches!(wf.build().unwrap_err(), WorkflowError::InvalidForm(_)));
    }

    #[test]
    fn test_identifier_and_version_rules_apply() {
        assert!(build_err(base().version("v1")).contains("semantic version"));
        let bad_id = WorkflowBuilder {
            workflow_id: "Demo-V1".to_string(),
            ..base()
        };
        assert!(build_err(bad_id).contains("invalid characters"));
    }
}
