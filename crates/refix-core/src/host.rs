//! Build-host abstraction.
//!
//! The task graph is built against a read-only [`HostProject`] view and
//! applied to a [`TaskRegistrar`]. Splitting the two keeps graph-shape logic
//! independent of any host's task API; `ProjectModel` implements both for
//! standalone use and for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::graph::{AggregateSpec, TaskMode, TaskSpec};

/// Task the host runs as its standard verification entry point.
pub const VERIFICATION_TASK: &str = "check";

// ---------------------------------------------------------------------------
// Scala version
// ---------------------------------------------------------------------------

/// Typed Scala version as published by the toolchain (e.g. "3.3.6").
///
/// Hosts answer the version query with this type or not at all; no part of
/// the graph builder probes host internals for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScalaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid scala version '{input}'")]
pub struct ParseVersionError {
    input: String,
}

impl ScalaVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this version belongs to the Scala 3 line.
    pub fn is_scala3(&self) -> bool {
        self.major == 3
    }
}

impl FromStr for ScalaVersion {
    type Err = ParseVersionError;

    /// Parses `major.minor.patch`; a missing patch defaults to zero and a
    /// pre-release suffix on the patch (e.g. "3.4.0-RC1") is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError {
            input: s.to_string(),
        };

        let mut parts = s.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let patch = match parts.next() {
            None => 0,
            Some(p) => {
                let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().map_err(|_| err())?
            }
        };
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl std::fmt::Display for ScalaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ---------------------------------------------------------------------------
// Compilation units
// ---------------------------------------------------------------------------

/// One named group of sources the host compiles together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    /// Unit name as the host knows it (e.g. "main", "test", "otherTest").
    pub name: String,

    /// Scala sources belonging to this unit, absolute paths.
    pub source_files: Vec<PathBuf>,

    /// Name of the host task that compiles this unit, if one exists.
    pub compile_task: Option<String>,

    /// Compiled class directories plus the compile classpath.
    pub classpath: Vec<PathBuf>,
}

/// Capitalize only the first character, leaving the rest untouched
/// ("otherTest" becomes "OtherTest").
pub(crate) fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Conventional compile task name for a unit ("main" compiles via
/// "compileScala", every other unit via "compile<Unit>Scala").
pub fn compile_task_name(unit: &str) -> String {
    if unit == "main" {
        "compileScala".to_string()
    } else {
        format!("compile{}Scala", capitalize_first(unit))
    }
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

/// Read-only view of the host project, consumed at configuration time.
pub trait HostProject {
    /// Absolute project directory; doubles as the engine source root.
    fn project_dir(&self) -> &Path;

    /// Directory of the parent/root project, when the project has one.
    fn root_dir(&self) -> Option<&Path>;

    /// Build-output area of the project.
    fn build_dir(&self) -> PathBuf;

    /// Whether the host's Scala integration is active.
    fn has_scala_plugin(&self) -> bool;

    /// The project's Scala version, if the host knows it.
    fn scala_version(&self) -> Option<ScalaVersion>;

    /// Every compilation unit of the project, in host order.
    fn compilation_units(&self) -> Vec<CompilationUnit>;

    /// Current extra compiler options of a compile task.
    fn compile_options(&self, compile_task: &str) -> Vec<String>;

    /// Name of the standard verification task.
    fn verification_task(&self) -> String {
        VERIFICATION_TASK.to_string()
    }
}

/// Host task-registration surface a built graph is applied to.
pub trait TaskRegistrar {
    /// Register a no-op aggregate task.
    fn register_aggregate(&mut self, aggregate: &AggregateSpec);

    /// Register one engine task.
    fn register_task(&mut self, spec: &TaskSpec);

    /// Declare that `task` depends on `depends_on`.
    fn bind_dependency(&mut self, task: &str, depends_on: &str);

    /// Append compiler options to a compile task.
    fn append_compile_options(&mut self, compile_task: &str, options: &[String]);
}

// ---------------------------------------------------------------------------
// ProjectModel
// ---------------------------------------------------------------------------

/// A task registered with the model, with enough metadata for queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTask {
    pub name: String,
    pub group: Option<String>,
    pub description: Option<String>,
    /// Unit the task operates on; `None` for aggregates and builtins.
    pub unit: Option<String>,
    /// Engine mode; `None` for aggregates and builtins.
    pub mode: Option<TaskMode>,
}

impl RegisteredTask {
    fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            group: None,
            description: None,
            unit: None,
            mode: None,
        }
    }
}

/// In-memory host project.
///
/// Serves as the project view for the standalone CLI and as the host fake
/// in tests: it records every registration so the resulting task wiring can
/// be inspected.
#[derive(Debug)]
pub struct ProjectModel {
    project_dir: PathBuf,
    root_dir: Option<PathBuf>,
    build_dir: PathBuf,
    scala_plugin: bool,
    scala_version: Option<ScalaVersion>,
    units: Vec<CompilationUnit>,
    compile_options: HashMap<String, Vec<String>>,
    tasks: HashMap<String, RegisteredTask>,
    dependencies: Vec<(String, String)>,
}

impl ProjectModel {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let build_dir = project_dir.join("build");
        let mut tasks = HashMap::new();
        tasks.insert(
            VERIFICATION_TASK.to_string(),
            RegisteredTask::builtin(VERIFICATION_TASK),
        );
        Self {
            project_dir,
            root_dir: None,
            build_dir,
            scala_plugin: true,
            scala_version: None,
            units: Vec::new(),
            compile_options: HashMap::new(),
            tasks,
            dependencies: Vec::new(),
        }
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    pub fn with_scala_version(mut self, version: ScalaVersion) -> Self {
        self.scala_version = Some(version);
        self
    }

    pub fn without_scala_plugin(mut self) -> Self {
        self.scala_plugin = false;
        self
    }

    /// Add a unit with its conventional compile task registered.
    pub fn add_source_set(
        &mut self,
        name: &str,
        source_files: Vec<PathBuf>,
        classpath: Vec<PathBuf>,
    ) {
        let compile_task = compile_task_name(name);
        self.tasks.insert(
            compile_task.clone(),
            RegisteredTask::builtin(&compile_task),
        );
        self.compile_options.entry(compile_task.clone()).or_default();
        self.units.push(CompilationUnit {
            name: name.to_string(),
            source_files,
            compile_task: Some(compile_task),
            classpath,
        });
    }

    /// Add a unit exactly as given, without registering anything.
    pub fn push_unit(&mut self, unit: CompilationUnit) {
        self.units.push(unit);
    }

    pub fn set_compile_options(&mut self, compile_task: &str, options: Vec<String>) {
        self.compile_options.insert(compile_task.to_string(), options);
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn task(&self, name: &str) -> Option<&RegisteredTask> {
        self.tasks.get(name)
    }

    /// All registered task names, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered engine tasks (aggregates and builtins excluded).
    pub fn engine_task_count(&self) -> usize {
        self.tasks.values().filter(|t| t.mode.is_some()).count()
    }

    pub fn direct_dependencies(&self, task: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|(t, _)| t == task)
            .map(|(_, d)| d.as_str())
            .collect()
    }

    /// Whether `task` depends on `target`, directly or transitively.
    pub fn depends_on(&self, task: &str, target: &str) -> bool {
        let mut queue: Vec<&str> = self.direct_dependencies(task);
        let mut seen: Vec<&str> = Vec::new();
        while let Some(current) = queue.pop() {
            if current == target {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            queue.extend(self.direct_dependencies(current));
        }
        false
    }
}

impl HostProject for ProjectModel {
    fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    fn build_dir(&self) -> PathBuf {
        self.build_dir.clone()
    }

    fn has_scala_plugin(&self) -> bool {
        self.scala_plugin
    }

    fn scala_version(&self) -> Option<ScalaVersion> {
        self.scala_version
    }

    fn compilation_units(&self) -> Vec<CompilationUnit> {
        self.units.clone()
    }

    fn compile_options(&self, compile_task: &str) -> Vec<String> {
        self.compile_options
            .get(compile_task)
            .cloned()
            .unwrap_or_default()
    }
}

impl TaskRegistrar for ProjectModel {
    fn register_aggregate(&mut self, aggregate: &AggregateSpec) {
        self.tasks.insert(
            aggregate.name.clone(),
            RegisteredTask {
                name: aggregate.name.clone(),
                group: Some(aggregate.group.clone()),
                description: Some(aggregate.description.clone()),
                unit: None,
                mode: None,
            },
        );
    }

    fn register_task(&mut self, spec: &TaskSpec) {
        self.tasks.insert(
            spec.name.clone(),
            RegisteredTask {
                name: spec.name.clone(),
                group: Some(spec.group.clone()),
                description: Some(spec.description.clone()),
                unit: Some(spec.unit.clone()),
                mode: Some(spec.mode),
            },
        );
    }

    fn bind_dependency(&mut self, task: &str, depends_on: &str) {
        self.dependencies
            .push((task.to_string(), depends_on.to_string()));
    }

    fn append_compile_options(&mut self, compile_task: &str, options: &[String]) {
        self.compile_options
            .entry(compile_task.to_string())
            .or_default()
            .extend(options.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scala_version_parsing() {
        assert_eq!("3.3.6".parse(), Ok(ScalaVersion::new(3, 3, 6)));
        assert_eq!("2.13.16".parse(), Ok(ScalaVersion::new(2, 13, 16)));
        assert_eq!("3.4.0-RC1".parse(), Ok(ScalaVersion::new(3, 4, 0)));
        assert_eq!("2.13".parse(), Ok(ScalaVersion::new(2, 13, 0)));
        assert!("scala-three".parse::<ScalaVersion>().is_err());
        assert!("3".parse::<ScalaVersion>().is_err());
    }

    #[test]
    fn test_scala3_detection() {
        assert!(ScalaVersion::new(3, 3, 6).is_scala3());
        assert!(!ScalaVersion::new(2, 13, 16).is_scala3());
    }

    #[test]
    fn test_capitalize_first_only_touches_first_char() {
        assert_eq!(capitalize_first("main"), "Main");
        assert_eq!(capitalize_first("otherTest"), "OtherTest");
        assert_eq!(capitalize_first(""), "");
    }

    #[test]
    fn test_compile_task_naming_convention() {
        assert_eq!(compile_task_name("main"), "compileScala");
        assert_eq!(compile_task_name("test"), "compileTestScala");
        assert_eq!(compile_task_name("otherTest"), "compileOtherTestScala");
    }

    #[test]
    fn test_model_registers_compile_tasks_for_source_sets() {
        let mut model = ProjectModel::new("/proj");
        model.add_source_set("main", vec![], vec![]);
        model.add_source_set("test", vec![], vec![]);

        assert!(model.has_task("compileScala"));
        assert!(model.has_task("compileTestScala"));
        assert!(model.has_task(VERIFICATION_TASK));
    }

    #[test]
    fn test_transitive_dependency_query() {
        let mut model = ProjectModel::new("/proj");
        model.bind_dependency("check", "rewriteCheck");
        model.bind_dependency("rewriteCheck", "rewriteCheckMain");

        assert!(model.depends_on("check", "rewriteCheckMain"));
        assert!(!model.depends_on("rewriteCheckMain", "check"));
    }

    #[test]
    fn test_dependency_query_tolerates_cycles() {
        let mut model = ProjectModel::new("/proj");
        model.bind_dependency("a", "b");
        model.bind_dependency("b", "a");

        assert!(model.depends_on("a", "b"));
        assert!(!model.depends_on("a", "c"));
    }
}
