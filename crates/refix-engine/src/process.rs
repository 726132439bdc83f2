//! Subprocess engine binding.
//!
//! Drives the Scalafix CLI jar in a child JVM. The CLI is always invoked
//! with `--json`, which makes it print a single JSON report on stdout;
//! rule queries add `--list-rules` instead of executing anything.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::artifact::{engine_properties, EngineDistribution};
use crate::interface::{
    DriverError, DriverResult, Engine, EngineArgs, EngineError, EngineMode, RuleInfo,
};
use crate::loader::{EngineFactory, LoadResult};

const DEFAULT_TIMEOUT_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the subprocess binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessEngineConfig {
    /// JVM launcher binary.
    pub java_bin: String,

    /// Per-invocation timeout in seconds (0 disables the timeout).
    pub timeout_secs: u64,
}

impl Default for ProcessEngineConfig {
    fn default() -> Self {
        Self {
            java_bin: "java".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire report
// ---------------------------------------------------------------------------

/// JSON report printed by the CLI under `--json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessReport {
    /// Engine version string.
    pub version: String,

    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,

    /// Every rule resolvable with the given arguments.
    #[serde(default)]
    pub available_rules: Vec<RuleInfo>,

    /// Configured rules that would actually execute.
    #[serde(default)]
    pub rules: Vec<RuleInfo>,

    /// Structured error codes, empty for a clean run.
    #[serde(default)]
    pub errors: Vec<EngineError>,
}

fn parse_report(
    stdout: &str,
    status_success: bool,
    exit_code: Option<i32>,
    stderr: &str,
) -> DriverResult<ProcessReport> {
    match serde_json::from_str::<ProcessReport>(stdout.trim()) {
        Ok(report) => Ok(report),
        Err(_) if !status_success => Err(DriverError::MissingReport {
            code: exit_code,
            stderr: stderr.chars().take(500).collect(),
        }),
        Err(e) => Err(DriverError::MalformedReport(e)),
    }
}

// ---------------------------------------------------------------------------
// ProcessEngine
// ---------------------------------------------------------------------------

/// Engine backed by `java -cp <jars> <main> ... --json`.
pub struct ProcessEngine {
    config: ProcessEngineConfig,
    jars: Vec<PathBuf>,
    main_class: String,
}

impl ProcessEngine {
    pub fn new(config: ProcessEngineConfig, jars: Vec<PathBuf>) -> Self {
        Self {
            config,
            jars,
            main_class: engine_properties().main_class().to_string(),
        }
    }

    fn join_paths(paths: &[PathBuf]) -> DriverResult<String> {
        let joined = std::env::join_paths(paths)?;
        Ok(joined.to_string_lossy().into_owned())
    }

    fn command_args(&self, list_rules: bool, args: &EngineArgs) -> DriverResult<Vec<String>> {
        let mut argv = vec![
            "-cp".to_string(),
            Self::join_paths(&self.jars)?,
            self.main_class.clone(),
        ];

        if list_rules {
            argv.push("--list-rules".to_string());
        }
        if args.mode == EngineMode::Check {
            argv.push("--check".to_string());
        }
        if let Some(config_file) = &args.config_file {
            argv.push("--config".to_string());
            argv.push(config_file.display().to_string());
        }
        argv.push("--sourceroot".to_string());
        argv.push(args.source_root.display().to_string());
        argv.push("--scala-version".to_string());
        argv.push(args.scala_version.clone());
        if !args.classpath.is_empty() {
            argv.push("--classpath".to_string());
            argv.push(Self::join_paths(&args.classpath)?);
        }
        for option in &args.scalac_options {
            argv.push("--scalac-options".to_string());
            argv.push(option.clone());
        }
        for path in &args.paths {
            argv.push("--files".to_string());
            argv.push(path.display().to_string());
        }
        argv.push("--json".to_string());
        Ok(argv)
    }

    async fn execute(&self, list_rules: bool, args: &EngineArgs) -> DriverResult<ProcessReport> {
        let argv = self.command_args(list_rules, args)?;
        debug!(
            java = %self.config.java_bin,
            main_class = %self.main_class,
            arg_count = argv.len(),
            "Launching engine process"
        );

        let start = Instant::now();
        // A fired timeout (or a cancelled invocation) drops the wait
        // future; the child must not outlive it.
        let child = Command::new(&self.config.java_bin)
            .args(&argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DriverError::Spawn {
                command: self.config.java_bin.clone(),
                source,
            })?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| DriverError::Timeout {
                timeout_secs: self.config.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let report = parse_report(
            &stdout,
            output.status.success(),
            output.status.code(),
            &stderr,
        )?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            error_count = report.errors.len(),
            "Engine process finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn available_rules(&self, args: &EngineArgs) -> DriverResult<Vec<RuleInfo>> {
        Ok(self.execute(true, args).await?.available_rules)
    }

    async fn rules_that_will_run(&self, args: &EngineArgs) -> DriverResult<Vec<RuleInfo>> {
        Ok(self.execute(true, args).await?.rules)
    }

    async fn run(&self, args: &EngineArgs) -> DriverResult<Vec<EngineError>> {
        Ok(self.execute(false, args).await?.errors)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Factory producing one `ProcessEngine` per distribution.
#[derive(Debug, Clone, Default)]
pub struct ProcessEngineFactory {
    config: ProcessEngineConfig,
}

impl ProcessEngineFactory {
    pub fn new(config: ProcessEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineFactory for ProcessEngineFactory {
    async fn load(&self, distribution: &EngineDistribution) -> LoadResult<Arc<dyn Engine>> {
        Ok(Arc::new(ProcessEngine::new(
            self.config.clone(),
            distribution.jars.clone(),
        )))
    }
}
