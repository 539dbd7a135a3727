//! End-to-end sweeps over small graphs with a deterministic stub runner.

use async_trait::async_trait;
use pkgsweep::{
    DependencyGraph, Package, Registry, Sweep, SweepConfig, SweepPolicy, TestOutcome, TestResult,
    TestRunner,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Scripted runner: fails or hangs the named packages, records every
/// invocation in order.
#[derive(Default)]
struct StubRunner {
    fail: Vec<String>,
    hang: Vec<String>,
    invocations: Mutex<Vec<String>>,
}

impl StubRunner {
    fn passing() -> Self {
        Self::default()
    }

    fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    fn hanging(names: &[&str]) -> Self {
        Self {
            hang: names.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    fn assert_ran_at_most_once(&self) {
        let runs = self.invocations();
        for name in &runs {
            assert_eq!(
                runs.iter().filter(|r| *r == name).count(),
                1,
                "{name} was dequeued more than once"
            );
        }
    }
}

#[async_trait]
impl TestRunner for StubRunner {
    async fn run_tests(
        &self,
        package: &Package,
        _runtime_dir: &Path,
        _log_path: &Path,
    ) -> pkgsweep::Result<TestOutcome> {
        self.invocations.lock().unwrap().push(package.name.clone());
        if self.hang.contains(&package.name) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(if self.fail.contains(&package.name) {
            TestOutcome::Failed
        } else {
            TestOutcome::Passed
        })
    }
}

fn pkg(name: &str, id: u128) -> Package {
    Package {
        name: name.to_string(),
        id: Uuid::from_u128(id),
        metadata_path: PathBuf::new(),
        version: None,
        registry: Some("test".to_string()),
    }
}

fn edge(from: u128, to: u128) -> (Uuid, Uuid) {
    (Uuid::from_u128(from), Uuid::from_u128(to))
}

fn test_config(dir: &Path, workers: usize) -> SweepConfig {
    SweepConfig {
        workers,
        log_dir: dir.join("logs"),
        package_timeout: Duration::from_secs(10),
        report_interval: Duration::from_millis(20),
        live_progress: false,
    }
}

async fn run_sweep(
    graph: DependencyGraph,
    policy: SweepPolicy,
    runner: Arc<StubRunner>,
    workers: usize,
) -> DependencyGraph {
    let dir = TempDir::new().unwrap();
    Sweep::new(
        graph,
        policy,
        runner,
        PathBuf::from("/runtimes/test"),
        test_config(dir.path(), workers),
    )
    .run()
    .await
    .unwrap()
}

fn result_of(graph: &DependencyGraph, name: &str) -> TestResult {
    graph.result(graph.vertex_by_name(name).unwrap())
}

#[tokio::test]
async fn test_trivial_leaf_passes() {
    let graph = DependencyGraph::new(vec![pkg("A", 1)], vec![]).unwrap();
    let runner = Arc::new(StubRunner::passing());
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 1).await;

    assert_eq!(result_of(&graph, "A"), TestResult::Passed);
    assert_eq!(runner.invocations(), vec!["A"]);
}

#[tokio::test]
async fn test_linear_chain_failure_skips_ancestors() {
    // A -> B -> C, B fails.
    let graph = DependencyGraph::new(
        vec![pkg("A", 1), pkg("B", 2), pkg("C", 3)],
        vec![edge(1, 2), edge(2, 3)],
    )
    .unwrap();
    let runner = Arc::new(StubRunner::failing(&["B"]));
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 2).await;

    assert_eq!(result_of(&graph, "C"), TestResult::Passed);
    assert_eq!(result_of(&graph, "B"), TestResult::Failed);
    assert_eq!(result_of(&graph, "A"), TestResult::Skipped);
    // C is the only leaf, so the order is fully determined.
    assert_eq!(runner.invocations(), vec!["C", "B"]);
}

#[tokio::test]
async fn test_diamond_runs_bottom_up() {
    // A -> {B, C}; B -> D; C -> D.
    let graph = DependencyGraph::new(
        vec![pkg("A", 1), pkg("B", 2), pkg("C", 3), pkg("D", 4)],
        vec![edge(1, 2), edge(1, 3), edge(2, 4), edge(3, 4)],
    )
    .unwrap();
    let runner = Arc::new(StubRunner::passing());
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 2).await;

    for name in ["A", "B", "C", "D"] {
        assert_eq!(result_of(&graph, name), TestResult::Passed, "{name}");
    }
    let runs = runner.invocations();
    assert_eq!(runs.len(), 4);
    assert_eq!(runs[0], "D");
    assert_eq!(runs[3], "A");
    runner.assert_ran_at_most_once();
}

#[tokio::test]
async fn test_deny_listed_root_skips_dependents_without_work() {
    // A -> B, B deny-listed.
    let graph =
        DependencyGraph::new(vec![pkg("A", 1), pkg("B", 2)], vec![edge(1, 2)]).unwrap();
    let runner = Arc::new(StubRunner::passing());
    let policy = SweepPolicy::with_lists(&[], &["B"]);
    let graph = run_sweep(graph, policy, runner.clone(), 2).await;

    assert_eq!(result_of(&graph, "A"), TestResult::Skipped);
    assert_eq!(result_of(&graph, "B"), TestResult::Skipped);
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_allow_listed_dependency_short_circuits() {
    // A -> Allowed.
    let graph =
        DependencyGraph::new(vec![pkg("A", 1), pkg("Allowed", 2)], vec![edge(1, 2)]).unwrap();
    let runner = Arc::new(StubRunner::passing());
    let policy = SweepPolicy::with_lists(&["Allowed"], &[]);
    let graph = run_sweep(graph, policy, runner.clone(), 2).await;

    assert_eq!(result_of(&graph, "Allowed"), TestResult::Passed);
    assert_eq!(result_of(&graph, "A"), TestResult::Passed);
    // Allowed never executes; A runs exactly once.
    assert_eq!(runner.invocations(), vec!["A"]);
}

#[tokio::test]
async fn test_broken_cycle_still_tests_both_vertices() {
    // Declared X <-> Y; one edge survives construction.
    let graph = DependencyGraph::new(
        vec![pkg("X", 1), pkg("Y", 2)],
        vec![edge(1, 2), edge(2, 1)],
    )
    .unwrap();
    let edges: usize = (0..graph.len()).map(|v| graph.dependencies(v).len()).sum();
    assert_eq!(edges, 1);

    let runner = Arc::new(StubRunner::passing());
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 2).await;

    assert_eq!(result_of(&graph, "X"), TestResult::Passed);
    assert_eq!(result_of(&graph, "Y"), TestResult::Passed);
    assert_eq!(runner.invocations().len(), 2);
    runner.assert_ran_at_most_once();
}

#[tokio::test]
async fn test_timed_out_suite_skips_dependents() {
    // A -> B, B hangs past the configured limit.
    let graph =
        DependencyGraph::new(vec![pkg("A", 1), pkg("B", 2)], vec![edge(1, 2)]).unwrap();
    let runner = Arc::new(StubRunner::hanging(&["B"]));
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), 1);
    config.package_timeout = Duration::from_millis(50);

    let graph = Sweep::new(
        graph,
        SweepPolicy::empty(),
        runner.clone(),
        PathBuf::from("/runtimes/test"),
        config,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(result_of(&graph, "B"), TestResult::TimedOut);
    assert_eq!(result_of(&graph, "A"), TestResult::Skipped);
    assert_eq!(runner.invocations(), vec!["B"]);
}

#[tokio::test]
async fn test_no_vertex_left_untested() {
    // Mixed graph: one failure, one deny, independent passers.
    let graph = DependencyGraph::new(
        vec![
            pkg("App", 1),
            pkg("Mid", 2),
            pkg("Bad", 3),
            pkg("Solo", 4),
            pkg("Hang", 5),
            pkg("OnHang", 6),
        ],
        vec![edge(1, 2), edge(2, 3), edge(6, 5)],
    )
    .unwrap();
    let runner = Arc::new(StubRunner::failing(&["Bad"]));
    let policy = SweepPolicy::with_lists(&[], &["Hang"]);
    let graph = run_sweep(graph, policy, runner.clone(), 3).await;

    assert!(graph
        .results()
        .iter()
        .all(|r| *r != TestResult::Untested));
    assert_eq!(result_of(&graph, "Bad"), TestResult::Failed);
    assert_eq!(result_of(&graph, "Mid"), TestResult::Skipped);
    assert_eq!(result_of(&graph, "App"), TestResult::Skipped);
    assert_eq!(result_of(&graph, "Solo"), TestResult::Passed);
    assert_eq!(result_of(&graph, "OnHang"), TestResult::Skipped);
    runner.assert_ran_at_most_once();
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_registry_sweep_with_builtin_dependencies() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("Registry.toml"),
        r#"
name = "General"
uuid = "23338594-aafe-5451-b93e-139f81909106"

[packages.7876af07-990d-54b4-ab0e-23690620f79a]
name = "Alpha"
path = "A/Alpha"

[packages.05c35c9a-6cb1-5bc2-b829-2e1f42a4bd45]
name = "Beta"
path = "B/Beta"
"#,
    );
    write(&dir.path().join("A/Alpha/Versions.toml"), "[\"1.0.0\"]\n");
    // Alpha depends on Beta and on the builtin SHA package.
    write(
        &dir.path().join("A/Alpha/Deps.toml"),
        r#"
["1.0.0"]
Beta = "05c35c9a-6cb1-5bc2-b829-2e1f42a4bd45"
SHA = "ea8e919c-243c-51af-8825-aaa63cd721ce"
"#,
    );
    write(&dir.path().join("B/Beta/Versions.toml"), "[\"0.3.0\"]\n");

    let registry = Registry::load(dir.path()).unwrap();
    let graph = DependencyGraph::from_registry(&registry).unwrap();

    let runner = Arc::new(StubRunner::passing());
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 2).await;

    // Builtins are pre-passed without execution; both registered
    // packages run, dependency first.
    assert!(graph.results().iter().all(|r| *r == TestResult::Passed));
    assert_eq!(runner.invocations(), vec!["Beta", "Alpha"]);
}

#[tokio::test]
async fn test_empty_registry_terminates_immediately() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("Registry.toml"),
        r#"
name = "Empty"
uuid = "11111111-2222-3333-4444-555555555555"
"#,
    );
    let registry = Registry::load(dir.path()).unwrap();
    let graph = DependencyGraph::from_registry(&registry).unwrap();

    let runner = Arc::new(StubRunner::passing());
    let graph = run_sweep(graph, SweepPolicy::empty(), runner.clone(), 2).await;

    assert!(!graph.is_empty());
    assert!(graph.results().iter().all(|r| *r == TestResult::Passed));
    assert!(runner.invocations().is_empty());
}
