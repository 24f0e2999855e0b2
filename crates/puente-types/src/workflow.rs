//! Plain-data workflow definitions.
//!
//! `WorkflowDefinition` is the export format consumed by the external
//! workflow engine. Every workflow in the catalog can be expressed in this
//! shape, and it is the canonical serialization when the typed builder form
//! and the plain form disagree. Field names are part of the wire contract.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow Definition (export form)
// ---------------------------------------------------------------------------

/// The exported workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowDefinition {
    /// Versioned identifier, e.g. `actualizacion_catastral_v1`.
    pub workflow_id: String,
    /// Human-readable workflow name.
    pub name: String,
    pub description: String,
    /// Semantic version string (e.g. "1.0.0").
    pub version: String,
    pub status: WorkflowStatus,
    /// Step catalog in declaration order.
    pub steps: Vec<StepDefinition>,
    /// Identifier of the step every instance starts at.
    pub start_step_id: String,
}

impl WorkflowDefinition {
    /// Look up a step by identifier.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Identifiers of every terminal step, in declaration order.
    pub fn terminal_step_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.step_type == StepType::Terminal)
            .map(|s| s.step_id.as_str())
            .collect()
    }
}

/// Lifecycle status of a published definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Deprecated,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Draft => write!(f, "draft"),
            WorkflowStatus::Active => write!(f, "active"),
            WorkflowStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in the exported graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    /// Unique within a workflow (e.g. "collect_catastral_data").
    pub step_id: String,
    pub name: String,
    pub step_type: StepType,
    pub description: String,
    /// Context keys that must be present before the step can complete.
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub optional_inputs: Vec<String>,
    /// Successor step IDs. For conditional and approval steps the first entry
    /// is the `true` / approved branch and the second the `false` / rejected one.
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// The kind of step, as exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Action,
    Integration,
    Conditional,
    Approval,
    Terminal,
}

impl StepType {
    /// Steps of these kinds choose between exactly two successors.
    pub fn is_branching(self) -> bool {
        matches!(self, StepType::Conditional | StepType::Approval)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Action => write!(f, "action"),
            StepType::Integration => write!(f, "integration"),
            StepType::Conditional => write!(f, "conditional"),
            StepType::Approval => write!(f, "approval"),
            StepType::Terminal => write!(f, "terminal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: "demo_v1".to_string(),
            name: "Demo".to_string(),
            description: "Two-step demo".to_string(),
            version: "1.0.0".to_string(),
            status: WorkflowStatus::Active,
            steps: vec![
                StepDefinition {
                    step_id: "collect".to_string(),
                    name: "Collect".to_string(),
                    step_type: StepType::Action,
                    description: "Collect data".to_string(),
                    required_inputs: vec!["clave_catastral".to_string()],
                    optional_inputs: vec![],
                    next_steps: vec!["done".to_string()],
                },
                StepDefinition {
                    step_id: "done".to_string(),
                    name: "Done".to_string(),
                    step_type: StepType::Terminal,
                    description: "Finished".to_string(),
                    required_inputs: vec![],
                    optional_inputs: vec![],
                    next_steps: vec![],
                },
            ],
            start_step_id: "collect".to_string(),
        }
    }

    #[test]
    fn export_uses_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "workflow_id",
            "name",
            "description",
            "version",
            "status",
            "steps",
            "start_step_id",
        ] {
            assert!(keys.contains(&key), "missing key {key}");
        }
        let step = &json["steps"][0];
        assert_eq!(step["step_type"], "action");
        assert_eq!(step["required_inputs"][0], "clave_catastral");
        assert_eq!(step["next_steps"][0], "done");
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn missing_input_lists_default_to_empty() {
        let json = r#"{
            "workflow_id": "demo_v1",
            "name": "Demo",
            "description": "",
            "version": "1.0.0",
            "status": "draft",
            "start_step_id": "done",
            "steps": [
                { "step_id": "done", "name": "Done", "step_type": "terminal", "description": "" }
            ]
        }"#;
        let def: WorkflowDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.status, WorkflowStatus::Draft);
        assert!(def.steps[0].next_steps.is_empty());
        assert!(def.steps[0].required_inputs.is_empty());
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let json = r#"{ "step_id": "x", "name": "X", "step_type": "loop", "description": "" }"#;
        assert!(serde_json::from_str::<StepDefinition>(json).is_err());
    }

    #[test]
    fn yaml_encoding_matches_json() {
        let def = sample();
        let yaml = serde_yaml_ng::to_string(&def).unwrap();
        assert!(yaml.contains("step_type: terminal"));
        let back: WorkflowDefinition = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn lookup_helpers() {
        let def = sample();
        assert_eq!(def.step("done").unwrap().step_type, StepType::Terminal);
        assert!(def.step("missing").is_none());
        assert_eq!(def.terminal_step_ids(), vec!["done"]);
        assert!(StepType::Approval.is_branching());
        assert!(!StepType::Integration.is_branching());
        assert_eq!(StepType::Conditional.to_string(), "conditional");
    }
}
