//! Certificado de Libertad de Gravamen.
//!
//! Both registries are searched at once. A found property has its linking
//! verified and its liens analyzed; the clean certificate or the lien report
//! is then signed. Either document ends in `certificado_emitido`.

use puente_types::form::{FormField, InputForm};
use puente_types::step::{IntegrationBinding, Step, TerminalOutcome};
use puente_types::workflow::{StepType, WorkflowDefinition, WorkflowStatus};
use serde_json::json;

use super::{CLAVE_CATASTRAL_PATTERN, step_def};
use crate::workflow::builder::Workflow;
use crate::workflow::definition::WorkflowError;
use crate::workflow::handler::CannedHandler;

pub const WORKFLOW_ID: &str = "certificado_libertad_v1";

const FOLIO_REAL_PATTERN: &str = "FR-[0-9]{4}-[0-9]{6}";

pub fn create_certificado_libertad_workflow() -> WorkflowDefinition {
    use StepType::*;
    WorkflowDefinition {
        workflow_id: WORKFLOW_ID.to_string(),
        name: "Certificado de Libertad de Gravamen".to_string(),
        description: "Generar certificado unificado consultando Catastro y RPP simultáneamente".to_string(),
        version: "1.0.0".to_string(),
        status: WorkflowStatus::Active,
        steps: vec![
            step_def(
                "collect_search_criteria",
                "Recopilar Criterios de Búsqueda",
                Action,
                "Recolección de criterios para búsqueda de la propiedad",
                &["search_type", "solicitante_nombre"],
                &["clave_catastral", "folio_real", "direccion", "propietario"],
                &["search_unified_records"],
            ),
            step_def(
                "search_unified_records",
                "Buscar Registros Unificados",
                Integration,
                "Búsqueda simultánea en Catastro y RPP",
                &[],
                &[],
                &["search_results_check"],
            ),
            step_def(
                "search_results_check",
                "Verificación de Resultados",
                Conditional,
                "Verificar si se encontró la propiedad",
                &[],
                &[],
                &["verify_linking_status", "property_not_found"],
            ),
            step_def(
                "verify_linking_status",
                "Verificar Estado de Vinculación",
                Integration,
                "Verificar que los registros estén correctamente vinculados",
                &[],
                &[],
                &["analyze_lien_status"],
            ),
            step_def(
                "analyze_lien_status",
                "Analizar Estado de Gravámenes",
                Action,
                "Analizar información de gravámenes de ambos sistemas",
                &[],
                &[],
                &["lien_analysis_result"],
            ),
            step_def(
                "lien_analysis_result",
                "Resultado de Análisis de Gravámenes",
                Conditional,
                "Evaluar si la propiedad está libre de gravámenes",
                &[],
                &[],
                &["generate_clean_certificate", "generate_lien_report"],
            ),
            step_def(
                "generate_clean_certificate",
                "Generar Certificado Libre",
                Action,
                "Generar certificado oficial de libertad de gravamen",
                &[],
                &[],
                &["sign_certificate"],
            ),
            step_def(
                "generate_lien_report",
                "Generar Reporte de Gravámenes",
                Action,
                "Generar reporte detallado de gravámenes encontrados",
                &[],
                &[],
                &["sign_certificate"],
            ),
            step_def(
                "sign_certificate",
                "Firmar Certificado",
                Action,
                "Aplicar firma digital al certificado",
                &[],
                &[],
                &["certificado_emitido"],
            ),
            step_def(
                "certificado_emitido",
                "Certificado Emitido",
                Terminal,
                "Certificado de libertad de gravamen emitido exitosamente",
                &[],
                &[],
                &[],
            ),
            step_def(
                "property_not_found",
                "Propiedad No Encontrada",
                Terminal,
                "No se pudo localizar la propiedad con los criterios proporcionados",
                &[],
                &[],
                &[],
            ),
        ],
        start_step_id: "collect_search_criteria".to_string(),
    }
}

fn search_form() -> InputForm {
    InputForm::new("Búsqueda de Propiedad")
        .with_description("Indique el criterio que corresponda al tipo de búsqueda")
        .field(
            FormField::select(
                "search_type",
                "Buscar por",
                ["clave_catastral", "folio_real", "direccion", "propietario"],
            )
            .required(),
        )
        .field(FormField::text("solicitante_nombre", "Nombre del solicitante").required())
        .field(
            FormField::text("clave_catastral", "Clave catastral")
                .pattern(CLAVE_CATASTRAL_PATTERN)
                .required_when("search_type", "clave_catastral"),
        )
        .field(
            FormField::text("folio_real", "Folio real")
                .pattern(FOLIO_REAL_PATTERN)
                .help("Formato: FR-2024-001234")
                .required_when("search_type", "folio_real"),
        )
        .field(FormField::textarea("direccion", "Dirección").required_when("search_type", "direccion"))
        .field(FormField::text("propietario", "Propietario").required_when("search_type", "propietario"))
}

pub fn build_certificado_libertad_workflow() -> Result<Workflow, WorkflowError> {
    let def = create_certificado_libertad_workflow();
    Workflow::builder(def.workflow_id, def.name)
        .description(def.description)
        .version(def.version)
        .status(def.status)
        .step(
            Step::form_action(
                "collect_search_criteria",
                "Recopilar Criterios de Búsqueda",
                "Recolección de criterios para búsqueda de la propiedad",
                search_form(),
            )
            .with_required_inputs(["search_type", "solicitante_nombre"])
            .with_optional_inputs(["clave_catastral", "folio_real", "direccion", "propietario"]),
        )
        .step(Step::integration(
            "search_unified_records",
            "Buscar Registros Unificados",
            "Búsqueda simultánea en Catastro y RPP",
            IntegrationBinding::new("puente_service", "/api/v1/unified/search"),
        ))
        .step(Step::conditional(
            "search_results_check",
            "Verificación de Resultados",
            "Verificar si se encontró la propiedad",
            "property_found == true",
        ))
        .step(Step::integration(
            "verify_linking_status",
            "Verificar Estado de Vinculación",
            "Verificar que los registros estén correctamente vinculados",
            IntegrationBinding::new("puente_service", "/api/v1/linking/status"),
        ))
        .step(Step::action(
            "analyze_lien_status",
            "Analizar Estado de Gravámenes",
            "Analizar información de gravámenes de ambos sistemas",
        ))
        .step(Step::conditional(
            "lien_analysis_result",
            "Resultado de Análisis de Gravámenes",
            "Evaluar si la propiedad está libre de gravámenes",
            "has_liens == false",
        ))
        .step(Step::action(
            "generate_clean_certificate",
            "Generar Certificado Libre",
            "Generar certificado oficial de libertad de gravamen",
        ))
        .step(Step::action(
            "generate_lien_report",
            "Generar Reporte de Gravámenes",
            "Generar reporte detallado de gravámenes encontrados",
        ))
        .step(Step::action(
            "sign_certificate",
            "Firmar Certificado",
            "Aplicar firma digital al certificado",
        ))
        .step(Step::terminal(
            "certificado_emitido",
            "Certificado Emitido",
            "Certificado de libertad de gravamen emitido exitosamente",
            TerminalOutcome::Success,
        ))
        .step(Step::terminal(
            "property_not_found",
            "Propiedad No Encontrada",
            "No se pudo localizar la propiedad con los criterios proporcionados",
            TerminalOutcome::NotFound,
        ))
        .chain(["collect_search_criteria", "search_unified_records", "search_results_check"])
        .branch("search_results_check", "verify_linking_status", "property_not_found")
        .chain(["verify_linking_status", "analyze_lien_status", "lien_analysis_result"])
        .branch("lien_analysis_result", "generate_clean_certificate", "generate_lien_report")
        .transition("generate_clean_certificate", "sign_certificate")
        .transition("generate_lien_report", "sign_certificate")
        .transition("sign_certificate", "certificado_emitido")
        .start("collect_search_criteria")
        .build()
}

/// Stub outputs for a found, linked property with no liens.
pub fn canned_responses() -> CannedHandler {
    CannedHandler::new()
        .respond(
            "search_unified_records",
            json!({ "property_found": true, "property_id": "PRED-000123", "folio_real_encontrado": "FR-2024-001234" }),
        )
        .respond("verify_linking_status", json!({ "linking_status": "vinculado" }))
        .respond("analyze_lien_status", json!({ "has_liens": false, "liens": [] }))
        .respond(
            "generate_clean_certificate",
            json!({ "certificate_type": "libre_de_gravamen" }),
        )
        .respond("generate_lien_report", json!({ "certificate_type": "con_gravamenes" }))
        .respond(
            "sign_certificate",
            json!({ "signed": true, "signature_id": "FIRMA-2024-000987" }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::same_shape;
    use crate::workflow::runner::{RunnerError, WorkflowRun, WorkflowRunner};
    use crate::workflow::form::FieldErrorKind;
    use puente_types::run::WorkflowRunStatus;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn criteria() -> Map<String, Value> {
        json!({
            "search_type": "folio_real",
            "solicitante_nombre": "Juan Pérez",
            "folio_real": "FR-2024-001234",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn runner(handler: CannedHandler) -> WorkflowRunner<CannedHandler> {
        WorkflowRunner::new(Arc::new(build_certificado_libertad_workflow().unwrap()), handler)
    }

    async fn run_with(handler: CannedHandler) -> WorkflowRun {
        let runner = runner(handler);
        let mut run = runner.start(Map::new()).await;
        runner.submit_input(&mut run, criteria()).await.unwrap();
        run
    }

    #[test]
    fn test_builder_form_matches_export_graph() {
        let wf = build_certificado_libertad_workflow().unwrap();
        assert_eq!(wf.steps().len(), 11);
        assert!(same_shape(&wf.to_definition(), &create_certificado_libertad_workflow()).unwrap());
    }

    #[tokio::test]
    async fn test_clean_property_gets_clean_certificate() {
        let run = run_with(canned_responses()).await;
        assert_eq!(run.status, WorkflowRunStatus::Completed);
        assert_eq!(
            run.path(),
            vec![
                "collect_search_criteria",
                "search_unified_records",
                "search_results_check",
                "verify_linking_status",
                "analyze_lien_status",
                "lien_analysis_result",
                "generate_clean_certificate",
                "sign_certificate",
                "certificado_emitido",
            ]
        );
        assert_eq!(run.context.get("certificate_type"), Some(&json!("libre_de_gravamen")));
    }

    #[tokio::test]
    async fn test_liens_produce_lien_report() {
        let mut handler = canned_responses();
        handler.set("analyze_lien_status", "has_liens", json!(true));
        handler.set("analyze_lien_status", "liens", json!([{ "tipo": "hipoteca", "acreedor": "Banco del Norte" }]));
        let run = run_with(handler).await;
        assert_eq!(run.outcome, Some(TerminalOutcome::Success));
        assert!(run.visited("generate_lien_report"));
        assert!(!run.visited("generate_clean_certificate"));
        assert_eq!(run.context.get("certificate_type"), Some(&json!("con_gravamenes")));
    }

    #[tokio::test]
    async fn test_missing_property_never_analyzes_liens() {
        let mut handler = canned_responses();
        handler.set("search_unified_records", "property_found", json!(false));
        let run = run_with(handler).await;
        assert_eq!(run.outcome, Some(TerminalOutcome::NotFound));
        assert_eq!(run.current_step, None);
        assert!(!run.visited("analyze_lien_status"));
        assert!(!run.visited("verify_linking_status"));
    }

    #[tokio::test]
    async fn test_bad_folio_is_rejected_per_field() {
        let runner = runner(canned_responses());
        let mut run = runner.start(Map::new()).await;
        let mut values = criteria();
        values.insert("folio_real".to_string(), json!("12345"));
        values.remove("solicitante_nombre");

        let err = runner.submit_input(&mut run, values).await.unwrap_err();
        let RunnerError::InvalidInput(errors) = err else {
            panic!("expected per-field errors");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field_id == "solicitante_nombre" && e.kind == FieldErrorKind::Missing));
        assert!(errors.iter().any(|e| e.field_id == "folio_real" && matches!(e.kind, FieldErrorKind::PatternMismatch(_))));
        assert_eq!(run.status, WorkflowRunStatus::AwaitingInput);
    }

    #[tokio::test]
    async fn test_search_type_requires_matching_criterion() {
        let runner = runner(canned_responses());
        let mut run = runner.start(Map::new()).await;
        let mut values = criteria();
        values.remove("folio_real");
        values.insert("propietario".to_string(), json!("Juan Pérez"));

        let err = runner.submit_input(&mut run, values).await.unwrap_err();
        let RunnerError::InvalidInput(errors) = err else {
            panic!("expected per-field errors");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field_id, "folio_real");
        assert_eq!(errors[0].kind, FieldErrorKind::Missing);
        assert_eq!(run.status, WorkflowRunStatus::AwaitingInput);
        assert!(run.context.get("propietario").is_none());
    }
}
