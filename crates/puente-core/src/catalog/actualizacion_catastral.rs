//! Actualización Catastral Unificada.
//!
//! The citizen submits an update, the RPP is searched for the matching
//! record, the automatic linking score decides between updating Catastro and
//! manual review, and the update is synchronized to the RPP and verified
//! before the citizen is notified. A failed or unverified synchronization
//! ends in rollback.
//!
//! The exported form lists `verify_synchronization` as an `action` with two
//! successors. The typed form models it as a conditional on `sync_verified`;
//! both describe the same graph.

use puente_types::form::{FormField, InputForm};
use puente_types::step::{IntegrationBinding, Step, TerminalOutcome};
use puente_types::workflow::{StepType, WorkflowDefinition, WorkflowStatus};
use serde_json::json;

use super::{CLAVE_CATASTRAL_PATTERN, step_def};
use crate::workflow::builder::Workflow;
use crate::workflow::definition::WorkflowError;
use crate::workflow::handler::CannedHandler;

pub const WORKFLOW_ID: &str = "actualizacion_catastral_v1";

/// Minimum linking score for automatic linking.
pub const MATCH_SCORE_THRESHOLD: u32 = 90;

/// Plain-data definition, the canonical export.
pub fn create_actualizacion_catastral_workflow() -> WorkflowDefinition {
    use StepType::*;
    WorkflowDefinition {
        workflow_id: WORKFLOW_ID.to_string(),
        name: "Actualización Catastral Unificada".to_string(),
        description: "Actualizar registro catastral con sincronización automática bidireccional al RPP"
            .to_string(),
        version: "1.0.0".to_string(),
        status: WorkflowStatus::Active,
        steps: vec![
            step_def(
                "collect_catastral_data",
                "Recopilar Datos Catastrales",
                Action,
                "Recolección de información catastral del ciudadano",
                &["clave_catastral", "tipo_actualizacion", "datos_propiedades"],
                &["observaciones"],
                &["validate_catastral_data"],
            ),
            step_def(
                "validate_catastral_data",
                "Validar Datos Catastrales",
                Action,
                "Validación de la información catastral proporcionada",
                &[],
                &[],
                &["search_rpp_records"],
            ),
            step_def(
                "search_rpp_records",
                "Buscar Registros RPP",
                Integration,
                "Búsqueda automática de registros correspondientes en RPP",
                &[],
                &[],
                &["auto_linking_process"],
            ),
            step_def(
                "auto_linking_process",
                "Proceso de Vinculación Automática",
                Action,
                "Algoritmo de vinculación automática entre Catastro y RPP",
                &[],
                &[],
                &["linking_decision"],
            ),
            step_def(
                "linking_decision",
                "Decisión de Vinculación",
                Conditional,
                "Evaluar resultado de vinculación automática",
                &[],
                &[],
                &["update_catastral_record", "manual_review_required"],
            ),
            step_def(
                "update_catastral_record",
                "Actualizar Registro Catastral",
                Integration,
                "Actualizar información en sistema catastral",
                &[],
                &[],
                &["sync_to_rpp"],
            ),
            step_def(
                "sync_to_rpp",
                "Sincronizar al RPP",
                Integration,
                "Sincronización bidireccional con RPP",
                &[],
                &[],
                &["verify_synchronization"],
            ),
            step_def(
                "verify_synchronization",
                "Verificar Sincronización",
                Action,
                "Verificar que la sincronización fue exitosa",
                &[],
                &[],
                &["send_notification", "rollback_changes"],
            ),
            step_def(
                "send_notification",
                "Enviar Notificación",
                Action,
                "Notificar al ciudadano sobre actualización exitosa",
                &[],
                &[],
                &["actualizacion_completada"],
            ),
            step_def(
                "actualizacion_completada",
                "Actualización Completada",
                Terminal,
                "Actualización catastral unificada completada exitosamente",
                &[],
                &[],
                &[],
            ),
            step_def(
                "manual_review_required",
                "Revisión Manual Requerida",
                Terminal,
                "La vinculación automática requiere revisión manual",
                &[],
                &[],
                &[],
            ),
            step_def(
                "rollback_changes",
                "Revertir Cambios",
                Terminal,
                "Sincronización falló, cambios revertidos automáticamente",
                &[],
                &[],
                &[],
            ),
        ],
        start_step_id: "collect_catastral_data".to_string(),
    }
}

fn update_form() -> InputForm {
    InputForm::new("Actualización Catastral")
        .with_description("Datos del predio a actualizar en Catastro y RPP")
        .field(
            FormField::text("clave_catastral", "Clave catastral")
                .required()
                .pattern(CLAVE_CATASTRAL_PATTERN)
                .help("Formato: 01-001-023-004"),
        )
        .field(
            FormField::select(
                "tipo_actualizacion",
                "Tipo de actualización",
                ["cambio_propietario", "superficie", "construccion", "uso_suelo", "domicilio"],
            )
            .required(),
        )
        .field(
            FormField::textarea("datos_propiedades", "Datos de la propiedad")
                .required()
                .help("Describa los cambios a registrar"),
        )
        .field(FormField::textarea("observaciones", "Observaciones"))
}

/// Typed definition with form, service bindings and predicates.
pub fn build_actualizacion_catastral_workflow() -> Result<Workflow, WorkflowError> {
    let def = create_actualizacion_catastral_workflow();
    Workflow::builder(def.workflow_id, def.name)
        .description(def.description)
        .version(def.version)
        .status(def.status)
        .step(
            Step::form_action(
                "collect_catastral_data",
                "Recopilar Datos Catastrales",
                "Recolección de información catastral del ciudadano",
                update_form(),
            )
            .with_required_inputs(["clave_catastral", "tipo_actualizacion", "datos_propiedades"])
            .with_optional_inputs(["observaciones"]),
        )
        .step(Step::action(
            "validate_catastral_data",
            "Validar Datos Catastrales",
            "Validación de la información catastral proporcionada",
        ))
        .step(Step::integration(
            "search_rpp_records",
            "Buscar Registros RPP",
            "Búsqueda automática de registros correspondientes en RPP",
            IntegrationBinding::new("rpp_service", "/api/v1/rpp/search"),
        ))
        .step(Step::action(
            "auto_linking_process",
            "Proceso de Vinculación Automática",
            "Algoritmo de vinculación automática entre Catastro y RPP",
        ))
        .step(Step::conditional(
            "linking_decision",
            "Decisión de Vinculación",
            "Evaluar resultado de vinculación automática",
            format!("match_score >= {MATCH_SCORE_THRESHOLD}"),
        ))
        .step(Step::integration(
            "update_catastral_record",
            "Actualizar Registro Catastral",
            "Actualizar información en sistema catastral",
            IntegrationBinding::new("catastro_service", "/api/v1/catastro/update")
                .on_failure("manual_review_required"),
        ))
        .step(Step::integration(
            "sync_to_rpp",
            "Sincronizar al RPP",
            "Sincronización bidireccional con RPP",
            IntegrationBinding::new("rpp_service", "/api/v1/rpp/sync").on_failure("rollback_changes"),
        ))
        .step(Step::conditional(
            "verify_synchronization",
            "Verificar Sincronización",
            "Verificar que la sincronización fue exitosa",
            "sync_verified == true",
        ))
        .step(Step::action(
            "send_notification",
            "Enviar Notificación",
            "Notificar al ciudadano sobre actualización exitosa",
        ))
        .step(Step::terminal(
            "actualizacion_completada",
            "Actualización Completada",
            "Actualización catastral unificada completada exitosamente",
            TerminalOutcome::Success,
        ))
        .step(Step::terminal(
            "manual_review_required",
            "Revisión Manual Requerida",
            "La vinculación automática requiere revisión manual",
            TerminalOutcome::ManualReview,
        ))
        .step(Step::terminal(
            "rollback_changes",
            "Revertir Cambios",
            "Sincronización falló, cambios revertidos automáticamente",
            TerminalOutcome::RolledBack,
        ))
        .chain([
            "collect_catastral_data",
            "validate_catastral_data",
            "search_rpp_records",
            "auto_linking_process",
            "linking_decision",
        ])
        .branch("linking_decision", "update_catastral_record", "manual_review_required")
        .chain(["update_catastral_record", "sync_to_rpp", "verify_synchronization"])
        .branch("verify_synchronization", "send_notification", "rollback_changes")
        .transition("send_notification", "actualizacion_completada")
        .start("collect_catastral_data")
        .build()
}

/// Stub outputs for a successful update with a high-confidence link.
pub fn canned_responses() -> CannedHandler {
    CannedHandler::new()
        .respond("validate_catastral_data", json!({ "validation_passed": true }))
        .respond(
            "search_rpp_records",
            json!({ "rpp_records_found": 1, "folio_real": "FR-2024-001234" }),
        )
        .respond(
            "auto_linking_process",
            json!({ "match_score": 95, "linking_method": "automatico" }),
        )
        .respond("update_catastral_record", json!({ "catastro_updated": true }))
        .respond(
            "sync_to_rpp",
            json!({ "sync_status": "completed", "sync_verified": true }),
        )
        .respond(
            "send_notification",
            json!({ "notification_sent": true, "channel": "email" }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::same_shape;
    use crate::workflow::runner::WorkflowRunner;
    use puente_types::run::WorkflowRunStatus;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn citizen_input() -> Map<String, Value> {
        json!({
            "clave_catastral": "01-001-023-004",
            "tipo_actualizacion": "superficie",
            "datos_propiedades": "Ampliación de 40 m2 en planta alta",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    async fn run_with(handler: CannedHandler) -> crate::workflow::runner::WorkflowRun {
        let wf = Arc::new(build_actualizacion_catastral_workflow().unwrap());
        let runner = WorkflowRunner::new(wf, handler);
        let mut run = runner.start(Map::new()).await;
        runner.submit_input(&mut run, citizen_input()).await.unwrap();
        run
    }

    #[test]
    fn test_definition_identity() {
        let def = create_actualizacion_catastral_workflow();
        assert_eq!(def.workflow_id, "actualizacion_catastral_v1");
        assert_eq!(def.start_step_id, "collect_catastral_data");
        assert_eq!(def.steps.len(), 12);
    }

    #[test]
    fn test_builder_form_matches_export_graph() {
        let wf = build_actualizacion_catastral_workflow().unwrap();
        assert_eq!(wf.steps().len(), 12);
        let exported = wf.to_definition();
        assert!(same_shape(&exported, &create_actualizacion_catastral_workflow()).unwrap());
        let verify = exported.step("verify_synchronization").unwrap();
        assert_eq!(verify.step_type, StepType::Conditional);
    }

    #[tokio::test]
    async fn test_high_score_updates_catastro() {
        let run = run_with(canned_responses()).await;
        assert_eq!(run.status, WorkflowRunStatus::Completed);
        assert_eq!(run.outcome, Some(TerminalOutcome::Success));
        assert!(run.visited("update_catastral_record"));
        assert!(!run.visited("manual_review_required"));
        let decision = run.history.iter().find(|r| r.step_id == "linking_decision").unwrap();
        assert_eq!(decision.branch, Some(true));
    }

    #[tokio::test]
    async fn test_low_score_goes_to_manual_review() {
        let mut handler = canned_responses();
        handler.set("auto_linking_process", "match_score", json!(72));
        let run = run_with(handler).await;
        assert_eq!(run.outcome, Some(TerminalOutcome::ManualReview));
        assert!(!run.visited("update_catastral_record"));
    }

    #[tokio::test]
    async fn test_unverified_sync_rolls_back() {
        let mut handler = canned_responses();
        handler.set("sync_to_rpp", "sync_verified", json!(false));
        let run = run_with(handler).await;
        assert_eq!(run.outcome, Some(TerminalOutcome::RolledBack));
        assert!(!run.visited("send_notification"));
    }

    #[tokio::test]
    async fn test_failed_sync_takes_rollback_route() {
        let handler = canned_responses().fail("sync_to_rpp", "RPP fuera de servicio");
        let run = run_with(handler).await;
        assert_eq!(run.outcome, Some(TerminalOutcome::RolledBack));
        assert!(!run.visited("verify_synchronization"));
    }
}
