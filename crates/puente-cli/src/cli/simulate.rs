//! `puente simulate`: walk a catalog workflow with canned service responses.
//!
//! The run starts, receives `--input` values when it stops at the citizen
//! form, and takes `--approve`/`--reject`/`--expire` when it stops at an
//! approval. A run that is still suspended afterwards is reported as such.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Duration;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};

use puente_core::catalog;
use puente_core::workflow::handler::CannedHandler;
use puente_core::workflow::runner::{RunnerError, Suspension, WorkflowRun, WorkflowRunner};
use puente_types::config::GlobalConfig;
use puente_types::run::{ApprovalDecision, StepOutcome, WorkflowRunStatus};

use super::parse_key_value;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Catalog workflow ID.
    pub workflow_id: String,

    /// Citizen form value, KEY=VALUE (repeatable).
    #[arg(long = "input", short = 'i', value_parser = parse_key_value)]
    pub inputs: Vec<(String, String)>,

    /// Override a canned step output, STEP:KEY=VALUE (repeatable).
    /// VALUE is read as JSON when it parses, otherwise as a string.
    #[arg(long = "respond", short = 'r', value_parser = parse_response)]
    pub responses: Vec<(String, String, Value)>,

    /// Make a step's handler report failure (repeatable).
    #[arg(long = "fail")]
    pub failures: Vec<String>,

    /// Approve the pending approval step.
    #[arg(long, conflicts_with_all = ["reject", "expire"])]
    pub approve: bool,

    /// Reject the pending approval step.
    #[arg(long, conflicts_with = "expire")]
    pub reject: bool,

    /// Let the pending approval pass its deadline without a decision.
    #[arg(long)]
    pub expire: bool,

    /// Role deciding the approval (default: first allowed role).
    #[arg(long)]
    pub role: Option<String>,

    /// Comment attached to the approval decision.
    #[arg(long)]
    pub comment: Option<String>,
}

/// Split `STEP:KEY=VALUE`.
fn parse_response(s: &str) -> Result<(String, String, Value), String> {
    let (step, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected STEP:KEY=VALUE, got '{s}'"))?;
    if step.is_empty() {
        return Err(format!("empty step in '{s}'"));
    }
    let (key, raw) = parse_key_value(rest)?;
    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    Ok((step.to_string(), key, value))
}

fn handler_for(args: &SimulateArgs) -> Result<CannedHandler> {
    let mut handler = catalog::canned_handler(&args.workflow_id)?;
    for (step, key, value) in &args.responses {
        handler.set(step, key.clone(), value.clone());
    }
    for step in &args.failures {
        handler = handler.fail(step.clone(), "simulated failure");
    }
    Ok(handler)
}

/// Drive the run through the supplied input and decision.
pub async fn run_simulation(args: &SimulateArgs, config: &GlobalConfig) -> Result<WorkflowRun> {
    let workflow = catalog::build(&args.workflow_id)?;
    for step in args.responses.iter().map(|(s, _, _)| s).chain(&args.failures) {
        if workflow.step(step).is_none() {
            bail!("'{step}' is not a step of {}", args.workflow_id);
        }
    }

    let runner = WorkflowRunner::new(Arc::new(workflow), handler_for(args)?).with_config(config);
    let mut run = runner.start(Map::new()).await;

    if matches!(run.suspension, Some(Suspension::AwaitingInput { .. })) {
        let values: Map<String, Value> = args
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        match runner.submit_input(&mut run, values).await {
            Ok(()) => {}
            Err(RunnerError::InvalidInput(errors)) => {
                let lines: Vec<_> = errors.iter().map(|e| format!("  - {e}")).collect();
                bail!("citizen input rejected:\n{}", lines.join("\n"));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(Suspension::AwaitingApproval { roles, deadline, .. }) = &run.suspension {
        let deadline = *deadline;
        let role = match &args.role {
            Some(role) => role.clone(),
            None => roles.first().cloned().unwrap_or_default(),
        };
        let decision = if args.approve {
            Some(ApprovalDecision::approve(role))
        } else if args.reject {
            Some(ApprovalDecision::reject(role))
        } else {
            None
        };

        if let Some(mut decision) = decision {
            if let Some(comment) = &args.comment {
                decision = decision.with_comment(comment.clone());
            }
            runner
                .record_decision(&mut run, decision)
                .await
                .context("approval decision refused")?;
        } else if args.expire {
            runner
                .check_timeout(&mut run, deadline + Duration::seconds(1))
                .await
                .context("approval timeout could not be applied")?;
        }
    }

    Ok(run)
}

pub async fn handle_simulate(args: &SimulateArgs, config: &GlobalConfig, json: bool, quiet: bool) -> Result<()> {
    let run = run_simulation(args, config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else if !quiet {
        print_run(&run);
    }

    if run.status == WorkflowRunStatus::Failed {
        bail!("run failed: {}", run.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

fn print_run(run: &WorkflowRun) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Outcome"),
            Cell::new("Branch"),
            Cell::new("Note"),
        ]);

    for record in &run.history {
        let outcome = match record.outcome {
            StepOutcome::Completed => Cell::new("completed").fg(Color::Green),
            StepOutcome::Suspended => Cell::new("suspended").fg(Color::Yellow),
            StepOutcome::Branched => Cell::new("branched").fg(Color::Blue),
            StepOutcome::TimedOut => Cell::new("timed out").fg(Color::Magenta),
            StepOutcome::Failed => Cell::new("failed").fg(Color::Red),
        };
        let branch = match record.branch {
            Some(true) => "true",
            Some(false) => "false",
            None => "",
        };
        table.add_row(vec![
            Cell::new(&record.step_id),
            Cell::new(record.step_type),
            outcome,
            Cell::new(branch),
            Cell::new(record.note.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!(
        "  {} {} {}",
        style("Run").bold(),
        style(run.run_id).dim(),
        style(&run.workflow_id).cyan()
    );
    println!("{table}");

    let status = style(run.status.to_string());
    let status = if run.status.is_suspended() {
        status.yellow()
    } else if run.status == WorkflowRunStatus::Failed {
        status.red()
    } else if run.status.is_finished() {
        status.green()
    } else {
        status.dim()
    };
    print!("  Status: {status}");
    if let Some(outcome) = run.outcome {
        print!(" ({outcome})");
    }
    println!();

    match &run.suspension {
        Some(Suspension::AwaitingInput { step_id, form }) => {
            let fields: Vec<_> = form.required_field_ids().collect();
            println!(
                "  Waiting at {} for: {}",
                style(step_id).bold(),
                fields.join(", ")
            );
            println!("  Supply values with {}", style("--input KEY=VALUE").dim());
        }
        Some(Suspension::AwaitingApproval {
            step_id,
            roles,
            deadline,
            overdue,
            ..
        }) => {
            let due = if *overdue {
                style(format!("overdue since {deadline}")).red().to_string()
            } else {
                format!("due {deadline}")
            };
            println!(
                "  Waiting at {} for {} ({due})",
                style(step_id).bold(),
                roles.join(" or ")
            );
        }
        None => {}
    }
    if let Some(error) = &run.error {
        println!("  {} {error}", style("Error:").red().bold());
    }
    println!();
}
