//! Error types for task graph construction and invocation.

use refix_engine::{DriverError, EngineFailure, LoadError};
use thiserror::Error;

/// Configuration-time failures. These are raised while the task graph is
/// being built and abort configuration outright.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("refix requires the 'scala' plugin to be applied")]
    ScalaPluginMissing,

    #[error("refix only supports Scala 3 projects (found {found})")]
    UnsupportedScalaVersion { found: String },

    #[error("no scala compile task found for compilation unit '{unit}'")]
    MissingCompileStep { unit: String },

    #[error("invalid source filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Invocation-state persistence failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Execution-time failures of one task invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The engine ran and reported one or more error codes.
    #[error(transparent)]
    Engine(#[from] EngineFailure),

    #[error("engine context unavailable: {0}")]
    Load(#[from] LoadError),

    #[error("engine driver failed: {0}")]
    Driver(#[from] DriverError),

    #[error("failed to persist invocation state for task '{task}': {source}")]
    State {
        task: String,
        #[source]
        source: StateError,
    },

    #[error("task execution panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type InvokeResult<T> = std::result::Result<T, InvokeError>;
