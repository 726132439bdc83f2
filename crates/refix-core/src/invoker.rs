//! Engine invocation.
//!
//! Drives one engine task end to end: load the prior invocation state,
//! narrow the input files, assemble the engine arguments, fetch the shared
//! isolated context, query rule applicability, run, and persist the new
//! state. Aggregate runs fan the unit tasks out over tokio and collect
//! per-task results without cancelling siblings.

use std::sync::Arc;
use std::time::Instant;

use futures::future;
use refix_engine::{
    EngineArgs, EngineDistribution, EngineFactory, EngineFailure, EngineLoader, EngineMode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{InvokeError, InvokeResult};
use crate::graph::{TaskMode, TaskSpec};
use crate::tracker::{ChangeSignal, ChangeTracker, InvocationState};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How one engine task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// No configured rule would run; the engine was not executed and the
    /// recorded state is untouched.
    Skipped,
    /// The engine ran and reported no errors.
    Completed {
        files_processed: usize,
        rules: Vec<String>,
        duration_ms: u64,
    },
}

/// Result of one unit task inside an aggregate run.
#[derive(Debug)]
pub struct TaskRunResult {
    pub task: String,
    pub outcome: InvokeResult<InvocationOutcome>,
}

/// Results of every unit task of an aggregate, in declaration order.
#[derive(Debug)]
pub struct AggregateResult {
    pub results: Vec<TaskRunResult>,
}

impl AggregateResult {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }

    /// Names of the tasks that failed, in declaration order.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_err())
            .map(|r| r.task.as_str())
            .collect()
    }
}

fn engine_mode(mode: TaskMode) -> EngineMode {
    match mode {
        TaskMode::Rewrite => EngineMode::InPlace,
        TaskMode::Check => EngineMode::Check,
    }
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Runs engine tasks against one pinned engine distribution.
///
/// The loader and its context cache are shared across every task this
/// invoker runs, concurrent ones included.
pub struct EngineInvoker {
    loader: Arc<EngineLoader>,
    distribution: EngineDistribution,
}

impl EngineInvoker {
    pub fn new(factory: Arc<dyn EngineFactory>, distribution: EngineDistribution) -> Self {
        Self {
            loader: Arc::new(EngineLoader::new(factory)),
            distribution,
        }
    }

    /// Reuse an existing loader, sharing its context cache.
    pub fn with_loader(loader: Arc<EngineLoader>, distribution: EngineDistribution) -> Self {
        Self {
            loader,
            distribution,
        }
    }

    pub fn loader(&self) -> Arc<EngineLoader> {
        Arc::clone(&self.loader)
    }

    /// Run one engine task.
    ///
    /// Returns [`InvocationOutcome::Skipped`] when no configured rule would
    /// run. An empty file subset does not short-circuit: rule applicability
    /// decides, so a config change can still take effect on an otherwise
    /// unchanged project.
    pub async fn invoke(
        &self,
        task: &TaskSpec,
        signal: &ChangeSignal,
    ) -> InvokeResult<InvocationOutcome> {
        let started = Instant::now();

        let prior = InvocationState::load(&task.state_file).map_err(|source| {
            InvokeError::State {
                task: task.name.clone(),
                source,
            }
        })?;
        let files = ChangeTracker::files_to_process(&task.source_files, prior.as_ref(), signal);
        if files.is_empty() {
            debug!(task = %task.name, "No changed Scala source files found");
        }

        let args = EngineArgs {
            mode: engine_mode(task.mode),
            config_file: task.config_file.clone(),
            source_root: task.source_root.clone(),
            paths: files,
            classpath: task.classpath.clone(),
            scala_version: task.scala_version.clone(),
            scalac_options: task.compiler_options.clone(),
        };
        debug!(
            task = %task.name,
            mode = %args.mode,
            config_file = ?args.config_file,
            scala_version = %args.scala_version,
            scalac_options = ?args.scalac_options,
            source_root = %args.source_root.display(),
            sources = args.paths.len(),
            classpath = args.classpath.len(),
            "Invoking Scalafix"
        );

        let context = self.loader.isolated_context(&self.distribution).await?;
        let engine = context.engine();

        let available = engine.available_rules(&args).await?;
        let applicable = engine.rules_that_will_run(&args).await?;
        debug!(
            available = ?available.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            will_run = ?applicable.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Scalafix rules"
        );

        if applicable.is_empty() {
            warn!(task = %task.name, "No Scalafix rules to run");
            return Ok(InvocationOutcome::Skipped);
        }

        debug!("Running Scalafix on {} Scala source file(s)", args.paths.len());
        let errors = engine.run(&args).await?;
        if !errors.is_empty() {
            return Err(InvokeError::Engine(EngineFailure::new(errors)));
        }

        let state = InvocationState::record(task.name.clone(), args.paths);
        state.store(&task.state_file).map_err(|source| {
            InvokeError::State {
                task: task.name.clone(),
                source,
            }
        })?;

        let rules: Vec<String> = applicable.into_iter().map(|r| r.name).collect();
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            task = %task.name,
            files = state.processed.len(),
            rules = rules.len(),
            duration_ms,
            "Scalafix completed"
        );
        Ok(InvocationOutcome::Completed {
            files_processed: state.processed.len(),
            rules,
            duration_ms,
        })
    }

    /// Run a set of unit tasks concurrently, one tokio task each.
    ///
    /// Failures do not cancel siblings; every task runs to completion and
    /// reports its own outcome. Tasks sharing the distribution share one
    /// isolated context.
    pub async fn run_aggregate(
        self: Arc<Self>,
        tasks: Vec<TaskSpec>,
        signal: ChangeSignal,
    ) -> AggregateResult {
        let mut names = Vec::new();
        let mut handles = Vec::new();
        for task in tasks {
            let invoker = Arc::clone(&self);
            let signal = signal.clone();
            names.push(task.name.clone());
            handles.push(tokio::spawn(async move {
                invoker.invoke(&task, &signal).await
            }));
        }

        let mut results = Vec::new();
        for (task, joined) in names.into_iter().zip(future::join_all(handles).await) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(InvokeError::Join(e)),
            };
            if let Err(e) = &outcome {
                error!(task = %task, error = %e, "Scalafix task failed");
            }
            results.push(TaskRunResult { task, outcome });
        }
        AggregateResult { results }
    }
}
