// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::Graph;
use crate::engine::RuntimeOptions;
use crate::types::RunStatus;

pub use crate::dag::{RetryPolicy, TaskCommand, TaskSpec};
pub use crate::engine::{execute_graph, execute_graph_with_cancel};
pub use crate::exec::Executor;
pub use crate::report::{RunReport, TaskResult};
pub use crate::types::{TaskStatus, TriggerRule};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - runtime + executor
/// - Ctrl-C handling
/// - report output
///
/// Returns the overall run status; the caller decides the exit code.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config '{}'", config_path.display()))?;
    let graph = Graph::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph);
        return Ok(RunStatus::Success);
    }

    if graph.always_run_tasks().next().is_none() {
        warn!("no task uses trigger_rule = \"all_done\"; nothing reports on a failed run");
    }

    let options = RuntimeOptions {
        max_concurrency: args.max_concurrency.unwrap_or(cfg.config.max_concurrency),
        working_dir: cfg.config.working_dir.clone(),
    };
    info!(
        tasks = graph.len(),
        max_concurrency = options.max_concurrency,
        "starting run"
    );

    // Ctrl-C → cancel the run; running tasks are killed, the rest skipped.
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        })
    };

    let report = execute_graph_with_cancel(&graph, options, cancel).await;
    ctrl_c.abort();
    let report = report?;

    print!("{}", report.render());

    if let Some(path) = &args.report {
        let json = report.to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing report to '{path}'"))?;
        info!(path = %path, "wrote JSON run report");
    }

    Ok(report.summary())
}

/// Dry-run output: tasks in execution order with their settings.
fn print_dry_run(cfg: &ConfigFile, graph: &Graph) {
    println!("dagrun dry-run");
    println!("  config.max_concurrency = {}", cfg.config.max_concurrency);
    if let Some(dir) = &cfg.config.working_dir {
        println!("  config.working_dir = {}", dir.display());
    }
    println!();

    println!("tasks ({}), in execution order:", graph.len());
    for id in graph.topological_order() {
        let Some(spec) = graph.task(id) else {
            continue;
        };

        println!("  - {id}");
        println!("      cmd: {}", spec.command);
        let deps = graph.dependencies_of(id);
        if !deps.is_empty() {
            println!("      after: {:?}", deps);
        }
        println!("      trigger_rule: {}", spec.trigger_rule);
        if spec.retry.max_attempts > 1 {
            println!(
                "      retry: {} attempts, {:?} delay",
                spec.retry.max_attempts, spec.retry.delay
            );
        }
        if let Some(dir) = &spec.working_dir {
            println!("      working_dir: {}", dir.display());
        }
        if !graph.counts_toward_outcome(id) {
            println!("      best_effort: true");
        }
    }

    debug!("dry-run complete (no execution)");
}
