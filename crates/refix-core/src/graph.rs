//! Task graph construction.
//!
//! Builds the declarative rewrite/check task graph for a project: two
//! aggregate tasks, one engine task per (unit, mode) pair, the dependency
//! edges between them, and the compiler-option updates needed for
//! semanticdb output. Building is pure with respect to the host; the
//! resulting [`TaskGraph`] is applied to a [`TaskRegistrar`] afterwards,
//! so graph shape stays independent of any host's task API.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RewriteConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::host::{capitalize_first, HostProject, TaskRegistrar};

/// Aggregate that rewrites sources in place.
pub const REWRITE_TASK: &str = "rewrite";

/// Aggregate that verifies without writing; wired into the host's check.
pub const CHECK_TASK: &str = "rewriteCheck";

/// Group both aggregates and every engine task are listed under.
pub const TASK_GROUP: &str = "scalafix";

pub const REWRITE_DESCRIPTION: &str = "Run scalafix on all sources.";
pub const CHECK_DESCRIPTION: &str =
    "Run scalafix and fail if produces a diff or a linter error.";

/// Compiler flags that turn on semanticdb output, paired with the source
/// root the metadata paths are relative to.
pub const SEMANTICDB_FLAG: &str = "-Xsemanticdb";
pub const SOURCE_ROOT_FLAG: &str = "-sourceroot";

/// Subdirectory of the build dir holding invocation state files.
pub const STATE_DIR: &str = "refix";

// ---------------------------------------------------------------------------
// Graph node types
// ---------------------------------------------------------------------------

/// Execution mode of an engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Apply rewrites to the sources.
    Rewrite,
    /// Fail on any diff or linter finding, write nothing.
    Check,
}

impl TaskMode {
    fn aggregate(&self) -> &'static str {
        match self {
            TaskMode::Rewrite => REWRITE_TASK,
            TaskMode::Check => CHECK_TASK,
        }
    }

    fn aggregate_description(&self) -> &'static str {
        match self {
            TaskMode::Rewrite => REWRITE_DESCRIPTION,
            TaskMode::Check => CHECK_DESCRIPTION,
        }
    }
}

impl std::fmt::Display for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskMode::Rewrite => write!(f, "rewrite"),
            TaskMode::Check => write!(f, "check"),
        }
    }
}

/// A no-op umbrella task spanning every unit of one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub name: String,
    pub description: String,
    pub group: String,
}

/// One engine task: everything its invocation needs, fixed at
/// configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, `<aggregate><UnitName>`.
    pub name: String,

    pub description: String,

    pub group: String,

    /// Unit this task operates on.
    pub unit: String,

    pub mode: TaskMode,

    /// Tasks that must run first (the unit's compile step when semanticdb
    /// is enabled).
    pub depends_on: Vec<String>,

    /// Declared input files, already filtered by includes/excludes.
    pub source_files: Vec<PathBuf>,

    /// Resolved engine config file, if any.
    pub config_file: Option<PathBuf>,

    /// Absolute directory relative source paths resolve against.
    pub source_root: PathBuf,

    /// Compiled classes plus compile classpath of the unit.
    pub classpath: Vec<PathBuf>,

    /// Full Scala version, e.g. "3.3.6".
    pub scala_version: String,

    /// Compiler options of the unit, semanticdb flags included.
    pub compiler_options: Vec<String>,

    /// State file recording the last successful invocation.
    pub state_file: PathBuf,
}

/// One dependency edge: `task` runs after `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub task: String,
    pub depends_on: String,
}

/// Compiler options to append to a compile task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFlagUpdate {
    pub compile_task: String,
    pub options: Vec<String>,
}

// ---------------------------------------------------------------------------
// Task graph
// ---------------------------------------------------------------------------

/// The declarative result of configuration: fully determined before any
/// task runs, and inert until applied to a registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub aggregates: Vec<AggregateSpec>,
    pub tasks: Vec<TaskSpec>,
    pub dependencies: Vec<Dependency>,
    pub compile_flag_updates: Vec<CompileFlagUpdate>,
}

impl TaskGraph {
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.task(name).is_some() || self.aggregates.iter().any(|a| a.name == name)
    }

    /// Engine tasks an aggregate fans out to, in declaration order.
    pub fn tasks_of_aggregate(&self, aggregate: &str) -> Vec<&TaskSpec> {
        self.dependencies
            .iter()
            .filter(|d| d.task == aggregate)
            .filter_map(|d| self.task(&d.depends_on))
            .collect()
    }

    /// Apply the graph to a host: register every task, bind every edge,
    /// append the computed compiler options.
    pub fn materialize(&self, registrar: &mut dyn TaskRegistrar) {
        for aggregate in &self.aggregates {
            registrar.register_aggregate(aggregate);
        }
        for task in &self.tasks {
            registrar.register_task(task);
            for dependency in &task.depends_on {
                registrar.bind_dependency(&task.name, dependency);
            }
        }
        for edge in &self.dependencies {
            registrar.bind_dependency(&edge.task, &edge.depends_on);
        }
        for update in &self.compile_flag_updates {
            registrar.append_compile_options(&update.compile_task, &update.options);
        }
        debug!(
            tasks = self.tasks.len(),
            edges = self.dependencies.len(),
            "Materialized rewrite task graph"
        );
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the task graph for one project.
pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    /// Construct the full graph, validating the project first.
    ///
    /// Fails when the Scala integration is missing, the project is not on
    /// Scala 3, a unit has no compile step, or a filter pattern is invalid.
    pub fn build(project: &dyn HostProject, config: &RewriteConfig) -> ConfigResult<TaskGraph> {
        if !project.has_scala_plugin() {
            return Err(ConfigError::ScalaPluginMissing);
        }
        let version = match project.scala_version() {
            Some(v) if v.is_scala3() => v,
            other => {
                return Err(ConfigError::UnsupportedScalaVersion {
                    found: other.map_or_else(|| "none".to_string(), |v| v.to_string()),
                })
            }
        };

        let config_file = config.resolve_config_file(project);
        let source_root = project.project_dir().to_path_buf();
        let state_dir = project.build_dir().join(STATE_DIR);

        let aggregates = vec![
            AggregateSpec {
                name: REWRITE_TASK.to_string(),
                description: REWRITE_DESCRIPTION.to_string(),
                group: TASK_GROUP.to_string(),
            },
            AggregateSpec {
                name: CHECK_TASK.to_string(),
                description: CHECK_DESCRIPTION.to_string(),
                group: TASK_GROUP.to_string(),
            },
        ];

        // Only the check-mode aggregate joins the host's verification flow.
        let mut dependencies = vec![Dependency {
            task: project.verification_task(),
            depends_on: CHECK_TASK.to_string(),
        }];
        let mut tasks = Vec::new();
        let mut compile_flag_updates = Vec::new();

        for unit in project.compilation_units() {
            let compile_task =
                unit.compile_task
                    .clone()
                    .ok_or_else(|| ConfigError::MissingCompileStep {
                        unit: unit.name.clone(),
                    })?;

            let mut compiler_options = project.compile_options(&compile_task);
            if config.semanticdb {
                let wanted = [
                    SEMANTICDB_FLAG.to_string(),
                    SOURCE_ROOT_FLAG.to_string(),
                    source_root.display().to_string(),
                ];
                let missing: Vec<String> = wanted
                    .iter()
                    .filter(|option| !compiler_options.contains(option))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    compiler_options.extend(missing.iter().cloned());
                    compile_flag_updates.push(CompileFlagUpdate {
                        compile_task: compile_task.clone(),
                        options: missing,
                    });
                }
            }

            let source_files = config.filter_sources(&unit.source_files)?;

            for mode in [TaskMode::Rewrite, TaskMode::Check] {
                let name = format!("{}{}", mode.aggregate(), capitalize_first(&unit.name));
                let depends_on = if config.semanticdb {
                    vec![compile_task.clone()]
                } else {
                    Vec::new()
                };

                dependencies.push(Dependency {
                    task: mode.aggregate().to_string(),
                    depends_on: name.clone(),
                });
                tasks.push(TaskSpec {
                    description: format!("{} in '{}'", mode.aggregate_description(), unit.name),
                    group: TASK_GROUP.to_string(),
                    unit: unit.name.clone(),
                    mode,
                    depends_on,
                    source_files: source_files.clone(),
                    config_file: config_file.clone(),
                    source_root: source_root.clone(),
                    classpath: unit.classpath.clone(),
                    scala_version: version.to_string(),
                    compiler_options: compiler_options.clone(),
                    state_file: state_dir.join(format!("{name}-state.json")),
                    name,
                });
            }
        }

        info!(
            scala_version = %version,
            units = tasks.len() / 2,
            tasks = tasks.len(),
            config_file = ?config_file,
            "Configured rewrite task graph"
        );
        Ok(TaskGraph {
            aggregates,
            tasks,
            dependencies,
            compile_flag_updates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CompilationUnit, ProjectModel, ScalaVersion};
    use std::path::PathBuf;

    fn scala3_project() -> ProjectModel {
        let mut model = ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(3, 3, 6));
        model.add_source_set(
            "main",
            vec![PathBuf::from("/proj/src/main/scala/Foo.scala")],
            vec![PathBuf::from("/proj/build/classes/scala/main")],
        );
        model.add_source_set(
            "test",
            vec![PathBuf::from("/proj/src/test/scala/FooTest.scala")],
            vec![PathBuf::from("/proj/build/classes/scala/test")],
        );
        model
    }

    fn build(project: &ProjectModel) -> TaskGraph {
        TaskGraphBuilder::build(project, &RewriteConfig::default()).expect("build graph")
    }

    #[test]
    fn test_graph_registers_two_tasks_per_unit_plus_aggregates() {
        let mut project = scala3_project();
        let graph = build(&project);

        assert_eq!(graph.aggregates.len(), 2);
        assert_eq!(graph.tasks.len(), 4);

        graph.materialize(&mut project);
        for name in [
            "rewrite",
            "rewriteMain",
            "rewriteTest",
            "rewriteCheck",
            "rewriteCheckMain",
            "rewriteCheckTest",
        ] {
            assert!(project.has_task(name), "missing task {name}");
        }
        assert_eq!(project.engine_task_count(), 4);
    }

    #[test]
    fn test_unit_name_capitalization_in_task_names() {
        let mut project = ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(3, 3, 6));
        project.add_source_set("otherTest", vec![], vec![]);

        let graph = build(&project);
        assert!(graph.task("rewriteOtherTest").is_some());
        assert!(graph.task("rewriteCheckOtherTest").is_some());
    }

    #[test]
    fn test_check_wires_into_verification_but_rewrite_does_not() {
        let mut project = scala3_project();
        build(&project).materialize(&mut project);

        assert!(project.depends_on("check", "rewriteCheck"));
        assert!(project.depends_on("check", "rewriteCheckMain"));
        assert!(!project.depends_on("check", "rewrite"));
        assert!(!project.depends_on("check", "rewriteMain"));
    }

    #[test]
    fn test_aggregates_fan_out_to_their_units_only() {
        let project = scala3_project();
        let graph = build(&project);

        let rewrite: Vec<&str> = graph
            .tasks_of_aggregate(REWRITE_TASK)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(rewrite, vec!["rewriteMain", "rewriteTest"]);

        let check: Vec<&str> = graph
            .tasks_of_aggregate(CHECK_TASK)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(check, vec!["rewriteCheckMain", "rewriteCheckTest"]);
    }

    #[test]
    fn test_semanticdb_adds_compile_dependency_and_flags() {
        let mut project = scala3_project();
        build(&project).materialize(&mut project);

        assert!(project.depends_on("rewriteMain", "compileScala"));
        assert!(project.depends_on("rewriteCheckTest", "compileTestScala"));

        let options = project.compile_options("compileScala");
        assert!(options.contains(&SEMANTICDB_FLAG.to_string()));
        assert!(options.contains(&SOURCE_ROOT_FLAG.to_string()));
        assert!(options.contains(&"/proj".to_string()));
    }

    #[test]
    fn test_semanticdb_flags_are_not_duplicated() {
        let mut project = scala3_project();
        project.set_compile_options(
            "compileScala",
            vec![
                "-deprecation".to_string(),
                SEMANTICDB_FLAG.to_string(),
                SOURCE_ROOT_FLAG.to_string(),
                "/proj".to_string(),
            ],
        );

        let graph = build(&project);
        assert!(graph
            .compile_flag_updates
            .iter()
            .all(|u| u.compile_task != "compileScala"));

        graph.materialize(&mut project);
        let options = project.compile_options("compileScala");
        let count = options.iter().filter(|o| *o == SEMANTICDB_FLAG).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_disabling_semanticdb_drops_compile_wiring() {
        let mut project = scala3_project();
        let config = RewriteConfig::new().with_semanticdb(false);
        let graph = TaskGraphBuilder::build(&project, &config).expect("build graph");

        assert!(graph.compile_flag_updates.is_empty());
        assert!(graph.tasks.iter().all(|t| t.depends_on.is_empty()));

        graph.materialize(&mut project);
        assert!(!project.depends_on("rewriteMain", "compileScala"));
        assert!(project.compile_options("compileScala").is_empty());
    }

    #[test]
    fn test_task_spec_carries_invocation_context() {
        let project = scala3_project();
        let graph = build(&project);

        let task = graph.task("rewriteCheckMain").expect("task");
        assert_eq!(task.mode, TaskMode::Check);
        assert_eq!(task.unit, "main");
        assert_eq!(task.group, TASK_GROUP);
        assert_eq!(
            task.description,
            "Run scalafix and fail if produces a diff or a linter error. in 'main'"
        );
        assert_eq!(task.source_root, PathBuf::from("/proj"));
        assert_eq!(task.scala_version, "3.3.6");
        assert_eq!(
            task.source_files,
            vec![PathBuf::from("/proj/src/main/scala/Foo.scala")]
        );
        assert_eq!(
            task.state_file,
            PathBuf::from("/proj/build/refix/rewriteCheckMain-state.json")
        );
        assert!(task
            .compiler_options
            .contains(&SEMANTICDB_FLAG.to_string()));
    }

    #[test]
    fn test_include_filter_restricts_task_inputs() {
        let mut project = ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(3, 3, 6));
        project.add_source_set(
            "main",
            vec![
                PathBuf::from("/proj/src/main/scala/A.scala"),
                PathBuf::from("/proj/src/main/scala/B.scala"),
            ],
            vec![],
        );
        let config = RewriteConfig::new().with_includes(vec!["**/A.scala".to_string()]);

        let graph = TaskGraphBuilder::build(&project, &config).expect("build graph");
        assert_eq!(
            graph.task("rewriteMain").expect("task").source_files,
            vec![PathBuf::from("/proj/src/main/scala/A.scala")]
        );
    }

    #[test]
    fn test_missing_scala_plugin_is_fatal() {
        let project = ProjectModel::new("/proj")
            .without_scala_plugin()
            .with_scala_version(ScalaVersion::new(3, 3, 6));

        let result = TaskGraphBuilder::build(&project, &RewriteConfig::default());
        assert!(matches!(result, Err(ConfigError::ScalaPluginMissing)));
    }

    #[test]
    fn test_scala2_project_is_rejected() {
        let mut project =
            ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(2, 13, 16));
        project.add_source_set("main", vec![], vec![]);

        let result = TaskGraphBuilder::build(&project, &RewriteConfig::default());
        match result {
            Err(ConfigError::UnsupportedScalaVersion { found }) => {
                assert_eq!(found, "2.13.16");
            }
            other => panic!("expected UnsupportedScalaVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_scala_version_is_rejected() {
        let project = ProjectModel::new("/proj");
        let result = TaskGraphBuilder::build(&project, &RewriteConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedScalaVersion { found }) if found == "none"
        ));
    }

    #[test]
    fn test_unit_without_compile_step_is_fatal() {
        let mut project = ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(3, 3, 6));
        project.push_unit(CompilationUnit {
            name: "integration".to_string(),
            source_files: vec![],
            compile_task: None,
            classpath: vec![],
        });

        let result = TaskGraphBuilder::build(&project, &RewriteConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::MissingCompileStep { unit }) if unit == "integration"
        ));
    }

    #[test]
    fn test_graph_is_deterministic() {
        let project = scala3_project();
        let first = build(&project);
        let second = build(&project);
        assert_eq!(first, second);
    }
}
