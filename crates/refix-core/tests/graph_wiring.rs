//! Integration tests for task graph construction and materialization.

use std::fs;
use std::path::PathBuf;

use refix_core::graph::{SEMANTICDB_FLAG, SOURCE_ROOT_FLAG};
use refix_core::{
    ConfigError, HostProject, ProjectModel, RewriteConfig, ScalaVersion, TaskGraphBuilder,
    CHECK_TASK, REWRITE_TASK, TASK_GROUP,
};

fn scala3_project(dir: &str) -> ProjectModel {
    let mut model = ProjectModel::new(dir).with_scala_version(ScalaVersion::new(3, 3, 6));
    model.add_source_set(
        "main",
        vec![
            PathBuf::from(format!("{dir}/src/main/scala/Foo.scala")),
            PathBuf::from(format!("{dir}/src/main/scala/Bar.scala")),
        ],
        vec![PathBuf::from(format!("{dir}/build/classes/scala/main"))],
    );
    model.add_source_set(
        "test",
        vec![PathBuf::from(format!("{dir}/src/test/scala/FooTest.scala"))],
        vec![PathBuf::from(format!("{dir}/build/classes/scala/test"))],
    );
    model
}

/// Test: a two-unit project materializes both aggregates and all four unit tasks
#[test]
fn test_full_project_wiring() {
    let mut project = scala3_project("/proj");
    let graph = TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph");
    graph.materialize(&mut project);

    for name in [
        "rewrite",
        "rewriteMain",
        "rewriteTest",
        "rewriteCheck",
        "rewriteCheckMain",
        "rewriteCheckTest",
    ] {
        assert!(project.has_task(name), "task {name} should be registered");
    }
    assert_eq!(
        project.engine_task_count(),
        4,
        "two units should produce two engine tasks each"
    );

    let rewrite = project.task("rewrite").expect("rewrite aggregate");
    assert_eq!(
        rewrite.description.as_deref(),
        Some("Run scalafix on all sources.")
    );
    assert_eq!(rewrite.group.as_deref(), Some(TASK_GROUP));

    let check = project.task("rewriteCheck").expect("check aggregate");
    assert_eq!(
        check.description.as_deref(),
        Some("Run scalafix and fail if produces a diff or a linter error.")
    );

    let unit_task = project.task("rewriteCheckTest").expect("unit task");
    assert_eq!(
        unit_task.description.as_deref(),
        Some("Run scalafix and fail if produces a diff or a linter error. in 'test'")
    );
}

/// Test: the host's check task reaches every check-mode task but no rewrite task
#[test]
fn test_check_triggers_check_tasks_only() {
    let mut project = scala3_project("/proj");
    TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph")
        .materialize(&mut project);

    assert!(project.depends_on("check", CHECK_TASK));
    assert!(project.depends_on("check", "rewriteCheckMain"));
    assert!(project.depends_on("check", "rewriteCheckTest"));

    assert!(!project.depends_on("check", REWRITE_TASK));
    assert!(!project.depends_on("check", "rewriteMain"));
    assert!(!project.depends_on("check", "rewriteTest"));
}

/// Test: each aggregate triggers exactly its own unit tasks
#[test]
fn test_aggregates_fan_out_transitively() {
    let mut project = scala3_project("/proj");
    TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph")
        .materialize(&mut project);

    assert!(project.depends_on(REWRITE_TASK, "rewriteMain"));
    assert!(project.depends_on(REWRITE_TASK, "rewriteTest"));
    assert!(!project.depends_on(REWRITE_TASK, "rewriteCheckMain"));

    // Through the compile edge the rewrite tasks reach the compiler too.
    assert!(project.depends_on(REWRITE_TASK, "compileScala"));
    assert!(project.depends_on(CHECK_TASK, "compileTestScala"));
}

/// Test: semanticdb wiring appends compiler flags once and only when enabled
#[test]
fn test_semanticdb_wiring_follows_config() {
    let mut with_semanticdb = scala3_project("/proj");
    TaskGraphBuilder::build(&with_semanticdb, &RewriteConfig::default())
        .expect("Failed to build graph")
        .materialize(&mut with_semanticdb);

    let options = with_semanticdb.compile_options("compileScala");
    assert!(options.contains(&SEMANTICDB_FLAG.to_string()));
    assert!(options.contains(&SOURCE_ROOT_FLAG.to_string()));
    assert!(options.contains(&"/proj".to_string()));
    assert!(with_semanticdb.depends_on("rewriteMain", "compileScala"));

    let mut without = scala3_project("/proj");
    let config = RewriteConfig::new().with_semanticdb(false);
    TaskGraphBuilder::build(&without, &config)
        .expect("Failed to build graph")
        .materialize(&mut without);

    assert!(without.compile_options("compileScala").is_empty());
    assert!(!without.depends_on("rewriteMain", "compileScala"));
}

/// Test: include and exclude filters shape the file sets handed to unit tasks
#[test]
fn test_filtered_sources_reach_task_specs() {
    let project = scala3_project("/proj");
    let config = RewriteConfig::new()
        .with_includes(vec!["**/scala/**".to_string()])
        .with_excludes(vec!["**/Bar.scala".to_string()]);

    let graph = TaskGraphBuilder::build(&project, &config).expect("Failed to build graph");
    let task = graph.task("rewriteMain").expect("rewriteMain");
    assert_eq!(
        task.source_files,
        vec![PathBuf::from("/proj/src/main/scala/Foo.scala")]
    );
}

/// Test: a config file next to the project wins over the root project's one
#[test]
fn test_project_config_file_wins_over_root() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let project_dir = root.path().join("service");
    fs::create_dir_all(&project_dir).expect("Failed to create project dir");
    fs::write(root.path().join(".scalafix.conf"), "rules = [DisableSyntax]\n")
        .expect("Failed to write root config");

    let mut project = ProjectModel::new(&project_dir)
        .with_root_dir(root.path())
        .with_scala_version(ScalaVersion::new(3, 3, 6));
    project.add_source_set("main", vec![], vec![]);

    let graph = TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph");
    assert_eq!(
        graph.task("rewriteMain").expect("task").config_file,
        Some(root.path().join(".scalafix.conf")),
        "root config should apply while the project has none"
    );

    fs::write(project_dir.join(".scalafix.conf"), "rules = [RemoveUnused]\n")
        .expect("Failed to write project config");
    let graph = TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph");
    assert_eq!(
        graph.task("rewriteMain").expect("task").config_file,
        Some(project_dir.join(".scalafix.conf")),
        "project config should shadow the root one"
    );
}

/// Test: a three-unit project scales to six engine tasks under the same two aggregates
#[test]
fn test_three_unit_project_scales() {
    let mut project = scala3_project("/proj");
    project.add_source_set(
        "integration",
        vec![PathBuf::from("/proj/src/integration/scala/It.scala")],
        vec![],
    );

    let graph = TaskGraphBuilder::build(&project, &RewriteConfig::default())
        .expect("Failed to build graph");
    assert_eq!(graph.aggregates.len(), 2);
    assert_eq!(graph.tasks.len(), 6);
    assert_eq!(graph.tasks_of_aggregate(REWRITE_TASK).len(), 3);
    assert_eq!(graph.tasks_of_aggregate(CHECK_TASK).len(), 3);
    assert!(graph.task("rewriteIntegration").is_some());
    assert!(graph.task("rewriteCheckIntegration").is_some());
}

/// Test: validation failures surface before any task is registered
#[test]
fn test_validation_failures_are_config_errors() {
    let no_plugin = ProjectModel::new("/proj")
        .without_scala_plugin()
        .with_scala_version(ScalaVersion::new(3, 3, 6));
    assert!(matches!(
        TaskGraphBuilder::build(&no_plugin, &RewriteConfig::default()),
        Err(ConfigError::ScalaPluginMissing)
    ));

    let mut scala2 = ProjectModel::new("/proj").with_scala_version(ScalaVersion::new(2, 12, 19));
    scala2.add_source_set("main", vec![], vec![]);
    assert!(matches!(
        TaskGraphBuilder::build(&scala2, &RewriteConfig::default()),
        Err(ConfigError::UnsupportedScalaVersion { .. })
    ));

    let project = scala3_project("/proj");
    let bad_pattern = RewriteConfig::new().with_includes(vec!["**/[".to_string()]);
    assert!(matches!(
        TaskGraphBuilder::build(&project, &bad_pattern),
        Err(ConfigError::InvalidPattern { .. })
    ));
}
