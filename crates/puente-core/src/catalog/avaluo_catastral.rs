//! Avalúo Catastral Unificado.
//!
//! Property records are pulled from both registries, market data for the
//! zone is gathered, and the computed valuation goes to a supervisor before
//! the appraisal report is issued.

use puente_types::form::{FormField, InputForm};
use puente_types::step::{ApprovalBinding, IntegrationBinding, Step, TerminalOutcome};
use puente_types::workflow::{StepType, WorkflowDefinition, WorkflowStatus};
use serde_json::json;

use super::{CLAVE_CATASTRAL_PATTERN, step_def};
use crate::workflow::builder::Workflow;
use crate::workflow::definition::WorkflowError;
use crate::workflow::handler::CannedHandler;

pub const WORKFLOW_ID: &str = "avaluo_catastral_v1";

pub const REVIEWER_ROLE: &str = "supervisor_avaluos";

/// Hours a valuation may wait for review before the timeout disposition applies.
pub const REVIEW_TIMEOUT_HOURS: u32 = 48;

pub fn create_avaluo_catastral_workflow() -> WorkflowDefinition {
    use StepType::*;
    WorkflowDefinition {
        workflow_id: WORKFLOW_ID.to_string(),
        name: "Avalúo Catastral Unificado".to_string(),
        description: "Generar avalúo catastral considerando información completa de Catastro y RPP".to_string(),
        version: "1.0.0".to_string(),
        status: WorkflowStatus::Active,
        steps: vec![
            step_def(
                "collect_avaluo_request",
                "Recopilar Solicitud de Avalúo",
                Action,
                "Recolección de información para solicitud de avalúo",
                &["clave_catastral", "proposito_avaluo", "solicitante", "tipo_avaluo"],
                &["urgencia"],
                &["search_property_records"],
            ),
            step_def(
                "search_property_records",
                "Buscar Registros de Propiedad",
                Integration,
                "Búsqueda de información completa en Catastro y RPP",
                &[],
                &[],
                &["property_records_check"],
            ),
            step_def(
                "property_records_check",
                "Verificación de Registros",
                Conditional,
                "Verificar si se encontraron los registros necesarios",
                &[],
                &[],
                &["gather_market_data", "incomplete_records_found"],
            ),
            step_def(
                "gather_market_data",
                "Recopilar Datos de Mercado",
                Integration,
                "Obtener información de mercado inmobiliario de la zona",
                &[],
                &[],
                &["perform_valuation"],
            ),
            step_def(
                "perform_valuation",
                "Realizar Valuación",
                Action,
                "Valuación considerando todos los datos disponibles",
                &[],
                &[],
                &["valuation_review"],
            ),
            step_def(
                "valuation_review",
                "Revisión de Valuación",
                Approval,
                "Revisión técnica del avalúo por supervisor",
                &[],
                &[],
                &["generate_appraisal_report", "valuation_requires_correction"],
            ),
            step_def(
                "generate_appraisal_report",
                "Generar Reporte de Avalúo",
                Action,
                "Generar reporte oficial de avalúo",
                &[],
                &[],
                &["avaluo_completado"],
            ),
            step_def(
                "avaluo_completado",
                "Avalúo Completado",
                Terminal,
                "Avalúo catastral unificado completado exitosamente",
                &[],
                &[],
                &[],
            ),
            step_def(
                "incomplete_records_found",
                "Registros Incompletos",
                Terminal,
                "No se encontró información suficiente para realizar el avalúo",
                &[],
                &[],
                &[],
            ),
            step_def(
                "valuation_requires_correction",
                "Valuación Requiere Corrección",
                Terminal,
                "La valuación fue rechazada y requiere correcciones",
                &[],
                &[],
                &[],
            ),
        ],
        start_step_id: "collect_avaluo_request".to_string(),
    }
}

fn request_form() -> InputForm {
    InputForm::new("Solicitud de Avalúo")
        .field(
            FormField::text("clave_catastral", "Clave catastral")
                .required()
                .pattern(CLAVE_CATASTRAL_PATTERN),
        )
        .field(
            FormField::select(
                "proposito_avaluo",
                "Propósito del avalúo",
                ["compraventa", "credito_hipotecario", "sucesion", "donacion", "fiscal"],
            )
            .required(),
        )
        .field(FormField::text("solicitante", "Nombre del solicitante").required())
        .field(
            FormField::select("tipo_avaluo", "Tipo de avalúo", ["catastral", "comercial", "referido"])
                .required(),
        )
        .field(
            FormField::select("urgencia", "Urgencia", ["normal", "urgente"])
                .help("Los avalúos urgentes se entregan en 48 horas"),
        )
}

pub fn build_avaluo_catastral_workflow() -> Result<Workflow, WorkflowError> {
    let def = create_avaluo_catastral_workflow();
    Workflow::builder(def.workflow_id, def.name)
        .description(def.description)
        .version(def.version)
        .status(def.status)
        .step(
            Step::form_action(
                "collect_avaluo_request",
                "Recopilar Solicitud de Avalúo",
                "Recolección de información para solicitud de avalúo",
                request_form(),
            )
            .with_required_inputs(["clave_catastral", "proposito_avaluo", "solicitante", "tipo_avaluo"])
            .with_optional_inputs(["urgencia"]),
        )
        .step(Step::integration(
            "search_property_records",
            "Buscar Registros de Propiedad",
            "Búsqueda de información completa en Catastro y RPP",
            IntegrationBinding::new("puente_service", "/api/v1/unified/search")
                .on_failure("incomplete_records_found"),
        ))
        .step(Step::conditional(
            "property_records_check",
            "Verificación de Registros",
            "Verificar si se encontraron los registros necesarios",
            "records_complete == true",
        ))
        .step(Step::integration(
            "gather_market_data",
            "Recopilar Datos de Mercado",
            "Obtener información de mercado inmobiliario de la zona",
            IntegrationBinding::new("market_data_service", "/api/v1/market/zone"),
        ))
        .step(Step::action(
            "perform_valuation",
            "Realizar Valuación",
            "Valuación considerando todos los datos disponibles",
        ))
        .step(Step::approval(
            "valuation_review",
            "Revisión de Valuación",
            "Revisión técnica del avalúo por supervisor",
            ApprovalBinding::new([REVIEWER_ROLE], REVIEW_TIMEOUT_HOURS),
        ))
        .step(Step::action(
            "generate_appraisal_report",
            "Generar Reporte de Avalúo",
            "Generar reporte oficial de avalúo",
        ))
        .step(Step::terminal(
            "avaluo_completado",
            "Avalúo Completado",
            "Avalúo catastral unificado completado exitosamente",
            TerminalOutcome::Success,
        ))
        .step(Step::terminal(
            "incomplete_records_found",
            "Registros Incompletos",
            "No se encontró información suficiente para realizar el avalúo",
            TerminalOutcome::Incomplete,
        ))
        .step(Step::terminal(
            "valuation_requires_correction",
            "Valuación Requiere Corrección",
            "La valuación fue rechazada y requiere correcciones",
            TerminalOutcome::Rejected,
        ))
        .chain(["collect_avaluo_request", "search_property_records", "property_records_check"])
        .branch("property_records_check", "gather_market_data", "incomplete_records_found")
        .chain(["gather_market_data", "perform_valuation", "valuation_review"])
        .branch("valuation_review", "generate_appraisal_report", "valuation_requires_correction")
        .transition("generate_appraisal_report", "avaluo_completado")
        .start("collect_avaluo_request")
        .build()
}

pub fn canned_responses() -> CannedHandler {
    CannedHandler::new()
        .respond(
            "search_property_records",
            json!({
                "records_complete": true,
                "superficie_terreno_m2": 250.0,
                "superficie_construccion_m2": 180.0,
                "gravamenes_activos": 0,
            }),
        )
        .respond(
            "gather_market_data",
            json!({ "valor_m2_zona": 12500.0, "comparables": 8 }),
        )
        .respond(
            "perform_valuation",
            json!({ "valor_catastral": 1850000.0, "valor_comercial": 2300000.0 }),
        )
        .respond("generate_appraisal_report", json!({ "report_id": "AV-2024-000123" }))
}
