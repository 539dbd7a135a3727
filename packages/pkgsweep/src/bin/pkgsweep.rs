use clap::Parser;
use pkgsweep::{
    DependencyGraph, Registry, RuntimeCatalog, RuntimeInstaller, SandboxConfig, SandboxRunner,
    Sweep, SweepConfig, SweepPolicy, SweepReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pkgsweep",
    about = "Run every package's test suite against a runtime build, dependency-first"
)]
struct Args {
    /// Registry checkout containing Registry.toml
    #[arg(long)]
    registry: PathBuf,

    /// Runtime catalogue (Runtimes.toml)
    #[arg(long)]
    runtimes: PathBuf,

    /// Runtime version to install and sweep against
    #[arg(long)]
    version: String,

    /// Concurrent sandbox slots (defaults to 3/4 of the CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Root directory for per-package test logs (one subdir per version)
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Where runtime builds are unpacked
    #[arg(long, default_value = "runtimes")]
    install_root: PathBuf,

    /// Per-package timeout, in seconds
    #[arg(long, default_value_t = 2700)]
    timeout: u64,

    /// Write a JSON report here after the sweep
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let registry = Registry::load(&args.registry)?;
    info!(
        "Registry {}: {} packages",
        registry.name,
        registry.packages.len()
    );
    let graph = DependencyGraph::from_registry(&registry)?;
    info!("Dependency graph: {} vertices", graph.len());

    let catalog = RuntimeCatalog::load(&args.runtimes)?;
    let installer = RuntimeInstaller::new(catalog, args.install_root);
    let runtime_dir = installer.install(&args.version).await?;

    let mut config = SweepConfig::default();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.log_dir = args.log_dir.join(&args.version);
    config.package_timeout = Duration::from_secs(args.timeout);

    let runner = Arc::new(SandboxRunner::new(SandboxConfig::default()));
    let sweep = Sweep::new(
        graph,
        SweepPolicy::builtin(),
        runner,
        runtime_dir,
        config,
    );
    let graph = sweep.run().await?;

    let report = SweepReport::from_graph(&graph, &args.version);
    println!(
        "passed {} / failed {} / timed out {} / skipped {} / untested {}",
        report.totals.passed,
        report.totals.failed,
        report.totals.timed_out,
        report.totals.skipped,
        report.totals.untested
    );
    for failure in &report.failures {
        println!(
            "{} ({}): blocks {} dependents",
            failure.name, failure.result, failure.blocked_dependents
        );
    }
    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}
