//! Command execution.

use crate::{Commands, GraphSource};
use colored::Colorize;
use primflow_core::{
    Catalog, ExecutionContext, IssueSeverity, RunReport, StateExecutor, StateStatus, Termination,
    WorkflowRunner,
};
use primflow_storage::{GraphStore, StoredState};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands) -> CliResult<String> {
    match cmd {
        Commands::Run {
            source,
            initial,
            context,
            halt_on,
            max_steps,
            json,
        } => {
            let catalog = load_catalog(&source)?;
            let registry = Arc::new(primflow_primitives::default_registry());
            reject_invalid(&catalog, &registry)?;

            let mut runner = WorkflowRunner::new(StateExecutor::new(Arc::new(catalog), registry))
                .with_halt_states(halt_on);
            // 0 means unbounded, as in the server's engine.max_steps
            if let Some(max) = max_steps.filter(|&n| n > 0) {
                runner = runner.with_max_steps(max);
            }

            let mut ctx = match context {
                Some(arg) => match parse_json_arg(&arg)? {
                    Value::Object(data) => ExecutionContext::with_data(data),
                    _ => return Err("context must be a JSON object".into()),
                },
                None => ExecutionContext::new(),
            };

            let report = runner.run(&initial, &mut ctx)?;

            if json {
                Ok(format_json(&serde_json::json!({
                    "report": report,
                    "context": ctx,
                })))
            } else {
                Ok(format_report(&report, &ctx))
            }
        }

        Commands::Validate { source } => {
            let catalog = load_catalog(&source)?;
            let registry = primflow_primitives::default_registry();
            let issues = catalog.validate(&registry);

            if issues.is_empty() {
                return Ok(format!(
                    "{} {} state(s), checksum {}",
                    "Valid".green(),
                    catalog.len(),
                    catalog.checksum()
                ));
            }

            let mut output = String::new();
            for issue in &issues {
                let tag = match issue.severity {
                    IssueSeverity::Error => "error".red(),
                    IssueSeverity::Warning => "warning".yellow(),
                };
                output.push_str(&format!("  {} {}: {}\n", tag, issue.state.cyan(), issue.message));
            }
            let errors = issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Error)
                .count();
            if errors > 0 {
                return Err(format!("{}{} error(s) found", output, errors).into());
            }
            Ok(output.trim_end().to_string())
        }

        Commands::Primitives => {
            let registry = primflow_primitives::default_registry();
            Ok(registry
                .names()
                .iter()
                .map(|n| format!("  {}", n.cyan()))
                .collect::<Vec<_>>()
                .join("\n"))
        }

        Commands::ListStates { store } => {
            let store = GraphStore::open(&store)?;
            let states = store.list();
            if states.is_empty() {
                return Ok("No states stored".yellow().to_string());
            }

            let mut output = String::new();
            for state in &states {
                let def = &state.definition;
                output.push_str(&format!(
                    "  {} [main: {}, chains: {}] success -> {}, failure -> {}\n",
                    def.name.cyan(),
                    def.main_action().unwrap_or("-"),
                    def.preliminary_actions.len(),
                    def.transitions.on_success().unwrap_or("-"),
                    def.transitions.on_failure().unwrap_or("-"),
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::PutState { store, definition } => {
            let state: StoredState = serde_json::from_value(parse_json_arg(&definition)?)?;
            let name = state.name().to_string();
            let store = GraphStore::open(&store)?;

            match store.save(state)? {
                Some(_) => Ok(format!("{} state {}", "Replaced".yellow(), name.cyan())),
                None => Ok(format!("{} state {}", "Created".green(), name.cyan())),
            }
        }

        Commands::Import { store, file } => {
            let catalog = Catalog::from_json(&read_graph_file(&file)?)?;
            let store = GraphStore::open(&store)?;
            let saved = store.save_all(
                catalog
                    .states()
                    .into_iter()
                    .cloned()
                    .map(StoredState::from),
            )?;
            Ok(format!(
                "{} {} state(s) from {}",
                "Imported".green(),
                saved,
                file.display()
            ))
        }

        Commands::DeleteState { store, name } => {
            let store = GraphStore::open(&store)?;
            if store.delete(&name)? {
                Ok(format!("{} state {}", "Deleted".green(), name.cyan()))
            } else {
                Err(format!("state '{}' not found", name).into())
            }
        }
    }
}

fn load_catalog(source: &GraphSource) -> CliResult<Catalog> {
    let catalog = match (&source.graph, &source.store) {
        (Some(file), _) => Catalog::from_json(&read_graph_file(file)?)?,
        (None, Some(dir)) => GraphStore::open(dir)?.catalog()?,
        (None, None) => return Err("either --graph or --store is required".into()),
    };
    tracing::debug!(
        "Loaded {} state(s), checksum {}",
        catalog.len(),
        catalog.checksum()
    );
    Ok(catalog)
}

fn reject_invalid(
    catalog: &Catalog,
    registry: &primflow_core::PrimitiveRegistry,
) -> CliResult<()> {
    let errors: Vec<String> = catalog
        .validate(registry)
        .into_iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .map(|i| format!("{}: {}", i.state, i.message))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("graph is not runnable: {}", errors.join("; ")).into())
    }
}

/// Reads a graph document. `.yaml`/`.yml` files are parsed as YAML, anything
/// else as JSON.
fn read_graph_file(path: &Path) -> CliResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Parses JSON from argument (supports @file syntax).
fn parse_json_arg(arg: &str) -> CliResult<Value> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn format_report(report: &RunReport, ctx: &ExecutionContext) -> String {
    let mut output = format!(
        "{} {} (catalog {})\n",
        "Run".bold(),
        report.run_id.cyan(),
        report.catalog_checksum
    );

    for (i, step) in report.steps.iter().enumerate() {
        let status = match &step.status {
            StateStatus::Succeeded => "succeeded".green(),
            StateStatus::Failed { primitive, .. } => format!("failed at {}", primitive).red(),
            StateStatus::NotFound => "not found".yellow(),
        };
        output.push_str(&format!(
            "  {:>3}. {} {} -> {}\n",
            i + 1,
            step.state.cyan(),
            status,
            step.next_state.as_deref().unwrap_or("<end>")
        ));
    }

    let termination = match &report.termination {
        Termination::Completed { last_state } => format!("completed at {}", last_state).green(),
        Termination::Halted { state } => format!("halted before {}", state).yellow(),
        Termination::StepBudgetExhausted { steps } => {
            format!("step budget exhausted after {} step(s)", steps).red()
        }
    };
    output.push_str(&format!("  {}\n", termination));
    output.push_str(&format!(
        "{}\n{}",
        "Context".bold(),
        format_json(&ctx.clone().into_value())
    ));
    output
}
