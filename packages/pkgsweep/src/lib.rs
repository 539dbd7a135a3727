/*
 * pkgsweep - dependency-aware ecosystem test sweep
 *
 * Runs every package's test suite against a runtime build, in parallel
 * sandboxes, releasing a package only once all of its dependencies have
 * passed and skip-propagating failures through the reverse dependency
 * graph.
 *
 * Architecture:
 * - Package & registry model (TOML descriptors on disk)
 * - Dependency graph (cycle-broken, per-vertex results)
 * - Static allow/deny policy
 * - Runtime catalogue + installer
 * - Sandboxed test runner (pluggable)
 * - Parallel scheduler (N workers, one scheduler task, one reporter)
 * - Failure impact analysis
 */

pub mod analysis;
pub mod error;
pub mod graph;
pub mod package;
pub mod policy;
pub mod report;
pub mod runner;
pub mod runtime;
pub mod scheduler;
pub mod stdlib;

pub use analysis::{rank_failures, FailureImpact, PackageOutcome, ResultTotals, SweepReport};
pub use error::{Result, SweepError};
pub use graph::{DependencyGraph, TestResult};
pub use package::{load_dependencies, Package, Registry, Version};
pub use policy::SweepPolicy;
pub use report::{ProgressSnapshot, WorkerStatus};
pub use runner::{SandboxConfig, SandboxRunner, TestOutcome, TestRunner};
pub use runtime::{RuntimeCatalog, RuntimeInstaller, RuntimeSource};
pub use scheduler::{Sweep, SweepConfig};
