//! Engine invocation surface and wire types.
//!
//! Defines the `Engine` async trait implemented by every Scalafix binding
//! (subprocess, scripted fake), the argument object handed to it, and the
//! closed set of structured error codes the engine reports back.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Execution mode
// ---------------------------------------------------------------------------

/// How the engine treats the diff it computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Apply the rewrite to the source files on disk.
    InPlace,
    /// Report a diff or linter findings without touching any file.
    Check,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMode::InPlace => write!(f, "in-place"),
            EngineMode::Check => write!(f, "check"),
        }
    }
}

// ---------------------------------------------------------------------------
// Structured error codes
// ---------------------------------------------------------------------------

/// Closed set of error codes a Scalafix run can report.
///
/// These are engine diagnostics, not transport failures; a run that spawns
/// and exits cleanly may still carry any number of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineError {
    Unexpected,
    Parse,
    CommandLine,
    MissingSemanticdb,
    StaleSemanticdb,
    Test,
    Linter,
    NoFiles,
    NoRules,
}

impl EngineError {
    /// One-line human description, stable across releases.
    pub fn describe(&self) -> &'static str {
        match self {
            EngineError::Unexpected => "An unexpected error occurred",
            EngineError::Parse => "Error parsing a source file",
            EngineError::CommandLine => "Error parsing command line arguments",
            EngineError::MissingSemanticdb => "Missing semanticdb file",
            EngineError::StaleSemanticdb => "Stale semanticdb file",
            EngineError::Test => "Error running tests",
            EngineError::Linter => "Error running linter",
            EngineError::NoFiles => "No files to process",
            EngineError::NoRules => "No rules to run",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

fn error_lines(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(|e| e.describe())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggregate failure raised when a run reports one or more error codes.
///
/// The message starts with `Errors:` followed by one description per code,
/// in the order the engine reported them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Errors:\n{}", error_lines(.errors))]
pub struct EngineFailure {
    errors: Vec<EngineError>,
}

impl EngineFailure {
    pub fn new(errors: Vec<EngineError>) -> Self {
        Self { errors }
    }

    /// The codes carried by this failure, in reported order.
    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    pub fn contains(&self, code: EngineError) -> bool {
        self.errors.contains(&code)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Whether a rule needs compiler-produced semantic information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Syntactic,
    Semantic,
}

/// One rule known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    /// Rule name as configured (e.g. "DisableSyntax", "ExplicitResultTypes").
    pub name: String,

    /// Syntactic or semantic.
    pub kind: RuleKind,
}

impl RuleInfo {
    pub fn syntactic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RuleKind::Syntactic,
        }
    }

    pub fn semantic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RuleKind::Semantic,
        }
    }

    pub fn is_semantic(&self) -> bool {
        self.kind == RuleKind::Semantic
    }
}

// ---------------------------------------------------------------------------
// Argument object
// ---------------------------------------------------------------------------

/// Everything one engine run needs, assembled by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineArgs {
    /// Rewrite in place or check without writing.
    pub mode: EngineMode,

    /// Resolved `.scalafix.conf`, if any. Absent means engine defaults.
    pub config_file: Option<PathBuf>,

    /// Absolute directory the engine resolves relative source paths against.
    pub source_root: PathBuf,

    /// Source files to process for this run. May be empty; the engine
    /// reports `no_files` rather than the caller special-casing it.
    pub paths: Vec<PathBuf>,

    /// Compiled classes plus the compile classpath of the unit.
    pub classpath: Vec<PathBuf>,

    /// Full Scala version the sources are compiled with (e.g. "3.3.6").
    pub scala_version: String,

    /// Compiler options the unit is compiled with, semanticdb flags included.
    pub scalac_options: Vec<String>,
}

impl EngineArgs {
    /// True when the compiler options request semanticdb output.
    pub fn emits_semanticdb(&self) -> bool {
        self.scalac_options.iter().any(|o| o == "-Xsemanticdb")
    }
}

// ---------------------------------------------------------------------------
// Driver failures
// ---------------------------------------------------------------------------

/// Infrastructure failure while driving an engine binding.
///
/// Distinct from [`EngineError`]: these mean the engine could not be run or
/// understood at all, not that it ran and found problems.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to launch engine process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine process timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("engine exited with status {code:?} and no parseable report: {stderr}")]
    MissingReport { code: Option<i32>, stderr: String },

    #[error("engine report was not valid JSON: {0}")]
    MalformedReport(#[from] serde_json::Error),

    #[error("classpath entry not representable on the command line: {0}")]
    InvalidClasspath(#[from] std::env::JoinPathsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

/// Trait for Scalafix engine bindings (subprocess, scripted, etc.).
#[async_trait]
pub trait Engine: Send + Sync {
    /// Every rule the engine can resolve with the given arguments.
    async fn available_rules(&self, args: &EngineArgs) -> DriverResult<Vec<RuleInfo>>;

    /// The subset of configured rules that would actually execute.
    async fn rules_that_will_run(&self, args: &EngineArgs) -> DriverResult<Vec<RuleInfo>>;

    /// Execute the engine. An empty code list means a clean run; a non-empty
    /// one is reported verbatim for the caller to aggregate.
    async fn run(&self, args: &EngineArgs) -> DriverResult<Vec<EngineError>>;
}
