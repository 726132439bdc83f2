//! Refix - Scalafix build orchestration CLI
//!
//! The `refix` command drives the pinned Scalafix distribution over a plain
//! `src/<unit>/scala` directory layout, standing in for the task graph a
//! build-system integration would register.
//!
//! ## Commands
//!
//! - `tasks`: show the rewrite/check task graph for a project
//! - `run`: execute an aggregate or a single unit task
//! - `rules`: list available rules and the subset that would run
//! - `info`: show the pinned engine distribution

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, Level};
use walkdir::WalkDir;

use refix_core::{
    ChangeKind, ChangeReport, ChangeSignal, EngineInvoker, InvocationOutcome, InvocationState,
    ProjectModel, RewriteConfig, ScalaVersion, TaskGraph, TaskGraphBuilder, TaskMode, TaskSpec,
    CHECK_TASK, REWRITE_TASK,
};
use refix_engine::{
    cli_coordinate, engine_properties, ArtifactResolver, DirResolver, EngineArgs,
    EngineDistribution, EngineFactory, EngineLoader, EngineMode, MavenResolver,
    ProcessEngineConfig, ProcessEngineFactory, RuleInfo,
};

#[derive(Parser)]
#[command(name = "refix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scalafix build orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the rewrite/check task graph for a project
    Tasks {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,

        #[command(flatten)]
        project: ProjectOpts,
    },

    /// Run an aggregate or a single unit task
    Run {
        /// Task to run ("rewrite", "rewriteCheck", or a unit task like "rewriteMain")
        #[arg(default_value = REWRITE_TASK)]
        task: String,

        /// Reprocess every file regardless of recorded state
        #[arg(long)]
        full: bool,

        #[command(flatten)]
        project: ProjectOpts,

        #[command(flatten)]
        engine: EngineOpts,
    },

    /// List available rules and the subset that would run
    Rules {
        /// Compilation unit to query against
        #[arg(long, default_value = "main")]
        unit: String,

        #[command(flatten)]
        project: ProjectOpts,

        #[command(flatten)]
        engine: EngineOpts,
    },

    /// Show the pinned engine distribution
    Info,
}

#[derive(Args)]
struct ProjectOpts {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Scalafix config file (default: .scalafix.conf in the project directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Glob pattern selecting source files (repeatable)
    #[arg(long = "include")]
    includes: Vec<String>,

    /// Glob pattern excluding source files (repeatable)
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Skip semanticdb compiler wiring (syntactic rules only)
    #[arg(long)]
    no_semanticdb: bool,

    /// Scala version of the project (default: the pinned Scala 3 LTS)
    #[arg(long)]
    scala_version: Option<String>,

    /// Extra classpath entry handed to the engine (repeatable)
    #[arg(long = "classpath")]
    classpath: Vec<PathBuf>,
}

#[derive(Args)]
struct EngineOpts {
    /// Directory containing pre-fetched Scalafix CLI jars
    #[arg(long, env = "REFIX_CLI_JARS")]
    cli_jars: Option<PathBuf>,

    /// Cache directory for downloaded jars
    #[arg(long, default_value = ".refix/jars")]
    jar_cache: PathBuf,

    /// JVM launcher binary
    #[arg(long, default_value = "java")]
    java_bin: String,

    /// Per-invocation timeout in seconds (0 disables the timeout)
    #[arg(long, default_value = "600")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    refix_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Tasks { format, project } => cmd_tasks(&format, &project),
        Commands::Run {
            task,
            full,
            project,
            engine,
        } => cmd_run(&task, full, &project, &engine).await,
        Commands::Rules {
            unit,
            project,
            engine,
        } => cmd_rules(&unit, &project, &engine).await,
        Commands::Info => cmd_info(),
    }
}

// ---------------------------------------------------------------------------
// Project discovery
// ---------------------------------------------------------------------------

const SOURCE_UNITS: [&str; 2] = ["main", "test"];

/// Build a project view from a plain `src/<unit>/scala` directory layout.
fn discover_project(opts: &ProjectOpts) -> Result<ProjectModel> {
    let project_dir = opts.project.canonicalize().with_context(|| {
        format!("Project directory {} not found", opts.project.display())
    })?;

    let version = opts
        .scala_version
        .as_deref()
        .unwrap_or(engine_properties().scala3_lts())
        .parse::<ScalaVersion>()?;

    let mut model = ProjectModel::new(&project_dir).with_scala_version(version);
    let mut found_any = false;
    for unit in SOURCE_UNITS {
        let source_dir = project_dir.join("src").join(unit).join("scala");
        if !source_dir.is_dir() {
            continue;
        }
        let sources = scala_sources(&source_dir)?;
        if sources.is_empty() {
            continue;
        }
        debug!(unit, files = sources.len(), "Discovered compilation unit");
        found_any = true;

        let mut classpath = opts.classpath.clone();
        let classes_dir = project_dir.join("build/classes/scala").join(unit);
        if classes_dir.is_dir() {
            classpath.push(classes_dir);
        }
        model.add_source_set(unit, sources, classpath);
    }
    if !found_any {
        model = model.without_scala_plugin();
    }
    Ok(model)
}

fn scala_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "scala")
        {
            sources.push(entry.into_path());
        }
    }
    Ok(sources)
}

fn rewrite_config(opts: &ProjectOpts) -> RewriteConfig {
    let mut config = RewriteConfig::new().with_semanticdb(!opts.no_semanticdb);
    // No flags means no restriction, not an empty include set.
    if !opts.includes.is_empty() {
        config = config.with_includes(opts.includes.clone());
    }
    if !opts.excludes.is_empty() {
        config = config.with_excludes(opts.excludes.clone());
    }
    if let Some(path) = &opts.config {
        config = config.with_config_file(path.clone());
    }
    config
}

fn build_graph(opts: &ProjectOpts) -> Result<TaskGraph> {
    let project = discover_project(opts)?;
    TaskGraphBuilder::build(&project, &rewrite_config(opts))
        .context("Failed to configure the rewrite task graph")
}

// ---------------------------------------------------------------------------
// Engine wiring
// ---------------------------------------------------------------------------

async fn resolve_distribution(opts: &EngineOpts) -> Result<EngineDistribution> {
    let coordinate = cli_coordinate();
    let distribution = match &opts.cli_jars {
        Some(dir) => DirResolver::new(dir).resolve(&coordinate).await,
        None => MavenResolver::from_env(&opts.jar_cache).resolve(&coordinate).await,
    }
    .with_context(|| format!("Failed to resolve engine distribution {coordinate}"))?;

    info!(
        coordinate = %distribution.coordinate,
        jars = distribution.jars.len(),
        "Resolved engine distribution"
    );
    Ok(distribution)
}

fn engine_factory(opts: &EngineOpts) -> Arc<dyn EngineFactory> {
    Arc::new(ProcessEngineFactory::new(ProcessEngineConfig {
        java_bin: opts.java_bin.clone(),
        timeout_secs: opts.timeout,
    }))
}

/// Derive the change signal for a task set from its recorded state.
///
/// Files never recorded count as added; files touched after the oldest
/// recorded run count as modified. Any task without usable state degrades
/// the whole run to a full rebuild, as does `--full`.
fn derive_signal(tasks: &[TaskSpec], full: bool) -> ChangeSignal {
    if full {
        return ChangeSignal::FullRebuild;
    }

    let mut baseline: Option<DateTime<Utc>> = None;
    let mut recorded: HashSet<PathBuf> = HashSet::new();
    for task in tasks {
        match InvocationState::load(&task.state_file) {
            Ok(Some(state)) => {
                recorded.extend(state.processed.iter().cloned());
                baseline = Some(match baseline {
                    Some(current) => current.min(state.written_at),
                    None => state.written_at,
                });
            }
            Ok(None) => return ChangeSignal::FullRebuild,
            Err(e) => {
                debug!(task = %task.name, error = %e, "Unreadable invocation state");
                return ChangeSignal::FullRebuild;
            }
        }
    }
    let Some(baseline) = baseline else {
        return ChangeSignal::FullRebuild;
    };

    let mut report = ChangeReport::new();
    for task in tasks {
        for path in &task.source_files {
            if !recorded.contains(path) {
                report.push(path.clone(), ChangeKind::Added);
                continue;
            }
            match modified_after(path, baseline) {
                Ok(true) => report.push(path.clone(), ChangeKind::Modified),
                Ok(false) => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Failed to read mtime");
                    report.push(path.clone(), ChangeKind::Modified);
                }
            }
        }
    }
    for path in &recorded {
        let declared = tasks.iter().any(|t| t.source_files.contains(path));
        if !declared {
            report.push(path.clone(), ChangeKind::Removed);
        }
    }

    debug!(changes = report.changes.len(), "Derived incremental change report");
    ChangeSignal::Incremental(report)
}

fn modified_after(path: &Path, baseline: DateTime<Utc>) -> std::io::Result<bool> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified) > baseline)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Show the rewrite/check task graph for a project
fn cmd_tasks(format: &str, opts: &ProjectOpts) -> Result<()> {
    let graph = build_graph(opts)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("Scalafix tasks");
    println!("==============");
    for aggregate in &graph.aggregates {
        println!("{} - {}", aggregate.name, aggregate.description);
        for task in graph.tasks_of_aggregate(&aggregate.name) {
            let after = if task.depends_on.is_empty() {
                String::new()
            } else {
                format!(", after {}", task.depends_on.join(", "))
            };
            println!("  {} - {} file(s){}", task.name, task.source_files.len(), after);
        }
    }

    if !graph.compile_flag_updates.is_empty() {
        println!();
        println!("Compiler option updates");
        for update in &graph.compile_flag_updates {
            println!("  {} += {}", update.compile_task, update.options.join(" "));
        }
    }
    Ok(())
}

/// Run an aggregate or a single unit task
async fn cmd_run(
    task_name: &str,
    full: bool,
    opts: &ProjectOpts,
    engine: &EngineOpts,
) -> Result<()> {
    let graph = build_graph(opts)?;

    let tasks: Vec<TaskSpec> = if task_name == REWRITE_TASK || task_name == CHECK_TASK {
        graph
            .tasks_of_aggregate(task_name)
            .into_iter()
            .cloned()
            .collect()
    } else if let Some(task) = graph.task(task_name) {
        vec![task.clone()]
    } else {
        bail!("Unknown task '{task_name}'; run 'refix tasks' to list them");
    };
    if tasks.is_empty() {
        bail!("No compilation units found under '{task_name}'");
    }

    let distribution = resolve_distribution(engine).await?;
    let invoker = Arc::new(EngineInvoker::new(engine_factory(engine), distribution));
    let signal = derive_signal(&tasks, full);

    let result = invoker.run_aggregate(tasks, signal).await;
    for run in &result.results {
        match &run.outcome {
            Ok(InvocationOutcome::Completed {
                files_processed,
                rules,
                duration_ms,
            }) => {
                println!(
                    "{}: processed {} file(s) with {} rule(s) in {}ms",
                    run.task,
                    files_processed,
                    rules.len(),
                    duration_ms
                );
            }
            Ok(InvocationOutcome::Skipped) => {
                println!("{}: no rules to run", run.task);
            }
            Err(e) => {
                println!("{}: FAILED", run.task);
                for line in e.to_string().lines() {
                    println!("  {line}");
                }
            }
        }
    }

    if !result.is_success() {
        bail!("{} Scalafix task(s) failed", result.failed_tasks().len());
    }
    Ok(())
}

/// List available rules and the subset that would run
async fn cmd_rules(unit: &str, opts: &ProjectOpts, engine_opts: &EngineOpts) -> Result<()> {
    let graph = build_graph(opts)?;
    let Some(task) = graph
        .tasks
        .iter()
        .find(|t| t.unit == unit && t.mode == TaskMode::Rewrite)
    else {
        bail!("No compilation unit named '{unit}' found");
    };

    let distribution = resolve_distribution(engine_opts).await?;
    let loader = EngineLoader::new(engine_factory(engine_opts));
    let context = loader
        .isolated_context(&distribution)
        .await
        .context("Failed to construct engine context")?;

    let args = EngineArgs {
        mode: EngineMode::Check,
        config_file: task.config_file.clone(),
        source_root: task.source_root.clone(),
        paths: task.source_files.clone(),
        classpath: task.classpath.clone(),
        scala_version: task.scala_version.clone(),
        scalac_options: task.compiler_options.clone(),
    };
    let engine = context.engine();
    let available = engine
        .available_rules(&args)
        .await
        .context("Failed to query available rules")?;
    let will_run = engine
        .rules_that_will_run(&args)
        .await
        .context("Failed to query applicable rules")?;

    println!("Scalafix rules");
    println!("==============");
    println!("Unit:   {unit}");
    match &task.config_file {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: <none>"),
    }
    println!();
    println!("Available ({}):", available.len());
    for rule in &available {
        println!("  {} [{}]", rule.name, kind_label(rule));
    }
    println!();
    println!("Will run ({}):", will_run.len());
    for rule in &will_run {
        println!("  {} [{}]", rule.name, kind_label(rule));
    }
    Ok(())
}

fn kind_label(rule: &RuleInfo) -> &'static str {
    if rule.is_semantic() {
        "semantic"
    } else {
        "syntactic"
    }
}

/// Show the pinned engine distribution
fn cmd_info() -> Result<()> {
    let props = engine_properties();
    let info = serde_json::json!({
        "refix_version": refix_core::VERSION,
        "scalafix_version": props.scalafix_version(),
        "scala3_lts": props.scala3_lts(),
        "main_class": props.main_class(),
        "coordinate": cli_coordinate(),
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
