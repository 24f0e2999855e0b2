//! Catalog subcommands: list, show, export, validate and schema.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use puente_core::catalog;
use puente_core::workflow::definition::{WorkflowError, load_definition_file, validate_definition};
use puente_infra::filesystem::{export_definitions, resolve_export_dir};
use puente_types::config::{ExportFormat, GlobalConfig};
use puente_types::step::StepKind;
use puente_types::workflow::{StepType, WorkflowDefinition};

fn styled_step_type(step_type: StepType) -> Cell {
    let color = match step_type {
        StepType::Action => Color::White,
        StepType::Integration => Color::Blue,
        StepType::Conditional => Color::Yellow,
        StepType::Approval => Color::Magenta,
        StepType::Terminal => Color::Green,
    };
    Cell::new(step_type).fg(color)
}

fn table_with_header(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub fn handle_list(json: bool) -> Result<()> {
    let defs = catalog::definitions();

    if json {
        let out: Vec<_> = defs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "workflow_id": d.workflow_id,
                    "name": d.name,
                    "version": d.version,
                    "status": d.status,
                    "steps": d.steps.len(),
                    "start_step_id": d.start_step_id,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = table_with_header(vec![
        Cell::new("Workflow").fg(Color::Cyan),
        Cell::new("Name"),
        Cell::new("Version"),
        Cell::new("Status"),
        Cell::new("Steps"),
    ]);
    for d in &defs {
        table.add_row(vec![
            Cell::new(&d.workflow_id),
            Cell::new(&d.name),
            Cell::new(&d.version),
            Cell::new(d.status),
            Cell::new(d.steps.len()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

pub fn handle_show(workflow_id: &str, json: bool) -> Result<()> {
    let def = catalog::find_definition(workflow_id)?;
    let wf = catalog::build(workflow_id)
        .with_context(|| format!("Failed to build typed form of '{workflow_id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&def)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(&def.name).bold().cyan(),
        style(format!("({} v{})", def.workflow_id, def.version)).dim()
    );
    println!("  {}", def.description);
    println!();

    let mut table = table_with_header(vec![
        Cell::new("Step").fg(Color::Cyan),
        Cell::new("Type"),
        Cell::new("Next"),
        Cell::new("Detail"),
    ]);
    for step in &def.steps {
        // Detail comes from the typed form: what the step binds to or tests.
        let detail = match wf.step(&step.step_id).map(|s| &s.kind) {
            Some(StepKind::Action { form: Some(form) }) => format!("form: {}", form.title),
            Some(StepKind::Integration { binding }) => match &binding.on_failure {
                Some(route) => format!("{} {} (on failure: {route})", binding.service_name, binding.endpoint),
                None => format!("{} {}", binding.service_name, binding.endpoint),
            },
            Some(StepKind::Conditional { predicate }) => predicate.clone(),
            Some(StepKind::Approval { binding }) => {
                format!("{} within {}h", binding.approver_roles.join(", "), binding.timeout_hours)
            }
            Some(StepKind::Terminal { outcome, .. }) => outcome.to_string(),
            _ => String::new(),
        };
        let marker = if step.step_id == def.start_step_id { "▶ " } else { "" };
        table.add_row(vec![
            Cell::new(format!("{marker}{}", step.step_id)),
            styled_step_type(step.step_type),
            Cell::new(step.next_steps.join(", ")),
            Cell::new(detail),
        ]);
    }
    println!("{table}");

    if let Some(form) = def
        .steps
        .iter()
        .find_map(|s| wf.step(&s.step_id).and_then(|typed| typed.form()))
    {
        println!();
        println!("  {} {}", style("Citizen form:").bold(), form.title);
        for field in &form.fields {
            let required = if field.required {
                style("required").yellow().to_string()
            } else if let Some(cond) = &field.required_when {
                style(format!("required if {} = {}", cond.field, cond.equals)).yellow().to_string()
            } else {
                style("optional").dim().to_string()
            };
            let options = if field.options.is_empty() {
                String::new()
            } else {
                format!(" [{}]", field.options.join(" | "))
            };
            println!("    {} {} {}{}", style("•").dim(), field.id, required, options);
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

pub async fn handle_export(
    workflow_id: Option<&str>,
    format: Option<ExportFormat>,
    out: Option<PathBuf>,
    data_dir: &Path,
    config: &GlobalConfig,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let defs = match workflow_id {
        Some(id) => vec![catalog::find_definition(id)?],
        None => catalog::definitions(),
    };
    for def in &defs {
        validate_definition(def).with_context(|| format!("Refusing to export '{}'", def.workflow_id))?;
    }

    let format = format.unwrap_or(config.export.format);
    let dir = out.unwrap_or_else(|| resolve_export_dir(data_dir, &config.export));
    let written = export_definitions(&dir, &defs, format)
        .await
        .with_context(|| format!("Failed to export to {}", dir.display()))?;

    if json {
        let paths: Vec<_> = written.iter().map(|p| p.display().to_string()).collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "written": paths }))?);
    } else if !quiet {
        println!();
        for path in &written {
            println!("  {} {}", style("✓").green(), path.display());
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

struct ValidationReport {
    source: String,
    result: Result<WorkflowDefinition, WorkflowError>,
}

pub fn handle_validate(file: Option<&Path>, json: bool, quiet: bool) -> Result<()> {
    let reports = match file {
        Some(path) => vec![ValidationReport {
            source: path.display().to_string(),
            result: load_definition_file(path),
        }],
        None => catalog::definitions()
            .into_iter()
            .map(|def| ValidationReport {
                source: def.workflow_id.clone(),
                result: validate_definition(&def).map(|()| def),
            })
            .collect(),
    };
    let failures = reports.iter().filter(|r| r.result.is_err()).count();

    if json {
        let out: Vec<_> = reports
            .iter()
            .map(|r| match &r.result {
                Ok(def) => serde_json::json!({
                    "source": r.source,
                    "workflow_id": def.workflow_id,
                    "valid": true,
                }),
                Err(e) => serde_json::json!({
                    "source": r.source,
                    "valid": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !quiet || failures > 0 {
        println!();
        for r in &reports {
            match &r.result {
                Ok(def) => println!(
                    "  {} {} ({} steps)",
                    style("✓").green(),
                    r.source,
                    def.steps.len()
                ),
                Err(e) => println!("  {} {}: {e}", style("✗").red(), r.source),
            }
        }
        println!();
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} definitions failed validation", reports.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub fn handle_schema() -> Result<()> {
    let schema = schemars::schema_for!(WorkflowDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use puente_core::workflow::definition::save_definition_file;
    use tempfile::tempdir;

    #[test]
    fn test_validate_catalog() {
        handle_validate(None, true, true).unwrap();
    }

    #[test]
    fn test_validate_rejects_broken_file() {
        let dir = tempdir().unwrap();
        let mut def = catalog::find_definition("certificado_libertad_v1").unwrap();
        def.start_step_id = "inicio".to_string();
        let path = dir.path().join("roto.json");
        std::fs::write(&path, serde_json::to_string(&def).unwrap()).unwrap();

        assert!(handle_validate(Some(&path), true, true).is_err());
    }

    #[test]
    fn test_validate_accepts_saved_catalog_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("avaluo.yaml");
        save_definition_file(&path, &catalog::find_definition("avaluo_catastral_v1").unwrap()).unwrap();
        handle_validate(Some(&path), true, true).unwrap();
    }

    #[tokio::test]
    async fn test_export_single_workflow_to_out_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("salida");
        handle_export(
            Some("avaluo_catastral_v1"),
            Some(ExportFormat::Json),
            Some(out.clone()),
            dir.path(),
            &GlobalConfig::default(),
            true,
            true,
        )
        .await
        .unwrap();
        assert!(out.join("avaluo_catastral_v1.json").exists());
        assert!(!out.join("certificado_libertad_v1.json").exists());
    }

    #[tokio::test]
    async fn test_export_uses_configured_directory() {
        let dir = tempdir().unwrap();
        handle_export(None, None, None, dir.path(), &GlobalConfig::default(), true, true)
            .await
            .unwrap();
        assert!(dir.path().join("workflows").join("actualizacion_catastral_v1.json").exists());
    }

    #[test]
    fn test_show_unknown_workflow_fails() {
        assert!(handle_show("predial_v1", true).is_err());
    }
}
