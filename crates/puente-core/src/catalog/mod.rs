//! Built-in Puente Catastral workflows.
//!
//! Each workflow comes in two forms: a plain [`WorkflowDefinition`]
//! (`create_*_workflow`), which is what gets exported, and a typed
//! [`Workflow`] (`build_*_workflow`) carrying forms, service bindings,
//! predicates and approval settings for the reference runner. Each module
//! also provides canned step outputs for simulation.

pub mod actualizacion_catastral;
pub mod avaluo_catastral;
pub mod certificado_libertad;

use puente_types::workflow::{StepDefinition, StepType, WorkflowDefinition};

use crate::workflow::builder::Workflow;
use crate::workflow::definition::WorkflowError;
use crate::workflow::handler::CannedHandler;

pub use actualizacion_catastral::{
    build_actualizacion_catastral_workflow, create_actualizacion_catastral_workflow,
};
pub use avaluo_catastral::{build_avaluo_catastral_workflow, create_avaluo_catastral_workflow};
pub use certificado_libertad::{
    build_certificado_libertad_workflow, create_certificado_libertad_workflow,
};

/// `NN-NNN-NNN-NNN`, e.g. `01-001-023-004`.
pub(crate) const CLAVE_CATASTRAL_PATTERN: &str = "[0-9]{2}-[0-9]{3}-[0-9]{3}-[0-9]{3}";

pub(crate) fn step_def(
    step_id: &str,
    name: &str,
    step_type: StepType,
    description: &str,
    required_inputs: &[&str],
    optional_inputs: &[&str],
    next_steps: &[&str],
) -> StepDefinition {
    let owned = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    StepDefinition {
        step_id: step_id.to_string(),
        name: name.to_string(),
        step_type,
        description: description.to_string(),
        required_inputs: owned(required_inputs),
        optional_inputs: owned(optional_inputs),
        next_steps: owned(next_steps),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One catalog workflow and its constructors.
pub struct CatalogEntry {
    pub workflow_id: &'static str,
    pub create: fn() -> WorkflowDefinition,
    pub build: fn() -> Result<Workflow, WorkflowError>,
    pub canned: fn() -> CannedHandler,
}

pub static CATALOG: [CatalogEntry; 3] = [
    CatalogEntry {
        workflow_id: actualizacion_catastral::WORKFLOW_ID,
        create: create_actualizacion_catastral_workflow,
        build: build_actualizacion_catastral_workflow,
        canned: actualizacion_catastral::canned_responses,
    },
    CatalogEntry {
        workflow_id: avaluo_catastral::WORKFLOW_ID,
        create: create_avaluo_catastral_workflow,
        build: build_avaluo_catastral_workflow,
        canned: avaluo_catastral::canned_responses,
    },
    CatalogEntry {
        workflow_id: certificado_libertad::WORKFLOW_ID,
        create: create_certificado_libertad_workflow,
        build: build_certificado_libertad_workflow,
        canned: certificado_libertad::canned_responses,
    },
];

fn entry(workflow_id: &str) -> Result<&'static CatalogEntry, WorkflowError> {
    CATALOG
        .iter()
        .find(|e| e.workflow_id == workflow_id)
        .ok_or_else(|| WorkflowError::UnknownWorkflow(workflow_id.to_string()))
}

pub fn workflow_ids() -> Vec<&'static str> {
    CATALOG.iter().map(|e| e.workflow_id).collect()
}

/// Plain definitions of every catalog workflow, in catalog order.
pub fn definitions() -> Vec<WorkflowDefinition> {
    CATALOG.iter().map(|e| (e.create)()).collect()
}

pub fn find_definition(workflow_id: &str) -> Result<WorkflowDefinition, WorkflowError> {
    entry(workflow_id).map(|e| (e.create)())
}

/// Build the typed form of a catalog workflow.
pub fn build(workflow_id: &str) -> Result<Workflow, WorkflowError> {
    entry(workflow_id).and_then(|e| (e.build)())
}

pub fn canned_handler(workflow_id: &str) -> Result<CannedHandler, WorkflowError> {
    entry(workflow_id).map(|e| (e.canned)())
}
