//! STACKFLOW CLI
//!
//! Builds, validates, plans and diffs stack projects.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod output;
mod progress;
mod project;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use console::style;
use progress::BarProgress;
use project::Project;
use stackflow_core::{diff_leaves, DiffSummary, Document, LeafChange, Path};
use stackflow_plan::{Stack, DEFAULT_COMPONENTS_PATH};
use stackflow_policy::DEFAULT_BUILDERS_PATH;
use stackflow_runtime::{EngineConfig, Metrics, StackEngine};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "STACKFLOW_LOG";

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "STACKFLOW - build concrete infrastructure stacks from traits and flows", long_about = None)]
struct Cli {
    /// Project file or directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Path of the components section
    #[arg(long, global = true, default_value = DEFAULT_COMPONENTS_PATH)]
    stack_path: String,

    /// Path of the environments section
    #[arg(long, global = true, default_value = DEFAULT_BUILDERS_PATH)]
    builders_path: String,

    /// Ignore traits not fulfilled by any flow
    #[arg(short = 'S', long, global = true)]
    no_strict: bool,

    /// More logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the stack for an environment and write driver outputs
    Build {
        /// Environment name
        environment: String,
        /// Print the transformed stack instead of writing outputs
        #[arg(long)]
        dry_run: bool,
        /// Write driver outputs to stdout
        #[arg(long)]
        stdout: bool,
    },
    /// Check required fields and trait fulfillment
    Validate,
    /// Show the processing order and dependencies
    Plan,
    /// Compare the built stacks of two projects
    Diff {
        /// Environment name
        environment: String,
        /// First project
        #[arg(long)]
        left: PathBuf,
        /// Second project
        #[arg(long)]
        right: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings {
        stack_path: Path::parse(&cli.stack_path)?,
        builders_path: Path::parse(&cli.builders_path)?,
        strict: !cli.no_strict,
    };

    match cli.command {
        Commands::Build {
            environment,
            dry_run,
            stdout,
        } => {
            let project = Project::load(&cli.project)?;
            let (stack, metrics) = build(&project, &settings, &environment, !stdout).await?;
            info!(
                components = metrics.components_processed,
                flows = metrics.flows_applied,
                resources = metrics.resources_emitted,
                "Build finished"
            );

            if dry_run {
                let components = stack.components().map(|c| c.to_json()).unwrap_or_default();
                println!("{}", serde_json::to_string_pretty(&components)?);
                return Ok(());
            }

            let environments = project.environments(&settings.builders_path)?;
            let env = environments.get(&environment)?;
            output::write_outputs(&stack, env, stdout)?;
            Ok(())
        }
        Commands::Validate => {
            let project = Project::load(&cli.project)?;
            let stack = project.stack(&settings.stack_path)?;
            let environments = project.environments(&settings.builders_path)?;
            engine(&project, &settings).validate(&stack, &environments)?;
            println!(
                "{} {} components, {} environments",
                style("valid").green().bold(),
                stack.component_ids().len(),
                environments.len()
            );
            Ok(())
        }
        Commands::Plan => {
            let project = Project::load(&cli.project)?;
            let stack = project.stack(&settings.stack_path)?;
            for (position, id) in stack.tasks().iter().enumerate() {
                let deps = stack.get_dependencies(id)?;
                if deps.is_empty() {
                    println!("{:>3}. {}", position + 1, style(id).bold());
                } else {
                    let names: Vec<_> = deps.iter().map(|d| d.as_str()).collect();
                    println!(
                        "{:>3}. {} {} {}",
                        position + 1,
                        style(id).bold(),
                        style("<-").dim(),
                        names.join(", ")
                    );
                }
            }
            Ok(())
        }
        Commands::Diff {
            environment,
            left,
            right,
        } => {
            let left_project = Project::load(&left)?;
            let right_project = Project::load(&right)?;
            let (left_stack, _) = build(&left_project, &settings, &environment, false).await?;
            let (right_stack, _) = build(&right_project, &settings, &environment, false).await?;

            let old = left_stack.components().map(|c| c.leaves()).unwrap_or_default();
            let new = right_stack.components().map(|c| c.leaves()).unwrap_or_default();
            let changes = diff_leaves(&old, &new);
            print_diff(&changes);
            Ok(())
        }
    }
}

struct Settings {
    stack_path: Path,
    builders_path: Path,
    strict: bool,
}

fn init_tracing(verbose: u8) {
    let filter = if verbose > 0 {
        EnvFilter::new("stackflow=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("stackflow=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn engine(project: &Project, settings: &Settings) -> StackEngine {
    StackEngine::new(
        EngineConfig::new()
            .with_base_dir(project.base_dir())
            .with_strict(settings.strict),
    )
}

/// Validate and transform `project` for `environment` on a blocking task
///
/// Ctrl-C cancels the build between components, flows and steps.
async fn build(
    project: &Project,
    settings: &Settings,
    environment: &str,
    show_progress: bool,
) -> Result<(Stack, Metrics)> {
    let mut stack = project.stack(&settings.stack_path)?;
    let environments = project.environments(&settings.builders_path)?;
    let engine = engine(project, settings);
    engine.validate(&stack, &environments)?;
    let env = environments.get(environment)?.clone();

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling build");
                cancel.cancel();
            }
        })
    };

    let progress = BarProgress::new(show_progress && console::Term::stderr().is_term());
    let result = tokio::task::spawn_blocking(move || {
        engine
            .transform_stack(&mut stack, &env, &cancel, &progress)
            .map(|metrics| (stack, metrics))
    })
    .await
    .wrap_err("Build task failed")?;
    watcher.abort();

    result.wrap_err_with(|| format!("Building environment {}", environment))
}

fn print_diff(changes: &[LeafChange]) {
    for change in changes {
        match change {
            LeafChange::Added { path, value } => {
                println!("{}", style(format!("+ {}: {}", path, value)).green());
            }
            LeafChange::Removed { path, value } => {
                println!("{}", style(format!("- {}: {}", path, value)).red());
            }
            LeafChange::Changed { path, old, new } => {
                println!("{}", style(format!("~ {}: {} -> {}", path, old, new)).yellow());
            }
        }
    }

    let summary = DiffSummary::of(changes);
    if summary.is_empty() {
        println!("{}", style("no differences").dim());
    } else {
        println!(
            "{} added, {} removed, {} changed",
            summary.added_count, summary.removed_count, summary.changed_count
        );
    }
}
