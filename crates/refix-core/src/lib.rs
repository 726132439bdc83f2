//! Refix-Core: Scalafix build orchestration
//!
//! Wires a pinned Scalafix distribution into a host build: a declarative
//! rewrite/check task graph per project, incremental input tracking with
//! per-task state files, and an invoker that drives the engine and turns
//! its error codes into build failures.
//!
//! ## Key Components
//!
//! - `TaskGraphBuilder`: validates the project and builds the [`graph::TaskGraph`]
//! - `TaskGraph::materialize`: applies the graph to a [`host::TaskRegistrar`]
//! - `EngineInvoker`: runs one engine task end to end, aggregates included
//! - `ChangeTracker`: narrows declared inputs to the changed subset
//! - `RewriteConfig`: user-facing knobs (config file, filters, semanticdb)

pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod invoker;
pub mod telemetry;
pub mod tracker;

pub use config::{RewriteConfig, DEFAULT_CONFIG_FILE};
pub use error::{ConfigError, ConfigResult, InvokeError, InvokeResult, StateError};
pub use graph::{
    AggregateSpec, CompileFlagUpdate, Dependency, TaskGraph, TaskGraphBuilder, TaskMode, TaskSpec,
    CHECK_TASK, REWRITE_TASK, TASK_GROUP,
};
pub use host::{
    compile_task_name, CompilationUnit, HostProject, ProjectModel, RegisteredTask, ScalaVersion,
    TaskRegistrar, VERIFICATION_TASK,
};
pub use invoker::{AggregateResult, EngineInvoker, InvocationOutcome, TaskRunResult};
pub use telemetry::init_tracing;
pub use tracker::{
    ChangeKind, ChangeReport, ChangeSignal, ChangeTracker, FileChange, InvocationState,
};

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
