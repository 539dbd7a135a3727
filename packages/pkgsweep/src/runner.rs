use crate::error::Result;
use crate::package::Package;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// What a test run reported. Runner-level errors are mapped to `Failed`
/// by the worker; the log file records the cause either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
}

/// The facility that actually runs a package's test suite in isolation
/// against an installed runtime, writing combined stdout/stderr to the
/// given log path.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(
        &self,
        package: &Package,
        runtime_dir: &Path,
        log_path: &Path,
    ) -> Result<TestOutcome>;
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Sandbox launcher binary (bubblewrap-compatible argument set).
    pub sandbox_program: String,
    /// Where the runtime installation is mounted inside the sandbox.
    pub runtime_mount: PathBuf,
    /// Host scratch directory, bound read-write at /work.
    pub workdir: PathBuf,
    /// Test invocation inside the sandbox; `{package}` is substituted.
    pub test_command: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            sandbox_program: "bwrap".to_string(),
            runtime_mount: PathBuf::from("/opt/runtime"),
            workdir: std::env::temp_dir().join("pkgsweep-work"),
            test_command: vec![
                "/opt/runtime/bin/runtime".to_string(),
                "--run-package-tests".to_string(),
                "{package}".to_string(),
            ],
        }
    }
}

/// Production runner: a user-namespace-isolated child with a private
/// /dev (including pts), a fresh /dev/shm and /etc/hosts, and the
/// runtime mounted read-only.
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn argv(&self, package: &Package, runtime_dir: &Path, hosts: &Path) -> Vec<String> {
        let mount = self.config.runtime_mount.display().to_string();
        let mut argv = vec![
            "--unshare-all".to_string(),
            "--die-with-parent".to_string(),
            "--ro-bind".to_string(),
            runtime_dir.display().to_string(),
            mount,
            "--dev".to_string(),
            "/dev".to_string(),
            "--proc".to_string(),
            "/proc".to_string(),
            "--tmpfs".to_string(),
            "/dev/shm".to_string(),
            "--ro-bind".to_string(),
            hosts.display().to_string(),
            "/etc/hosts".to_string(),
            "--bind".to_string(),
            self.config.workdir.display().to_string(),
            "/work".to_string(),
            "--chdir".to_string(),
            "/work".to_string(),
            "--".to_string(),
        ];
        argv.extend(
            self.config
                .test_command
                .iter()
                .map(|arg| arg.replace("{package}", &package.name)),
        );
        argv
    }
}

#[async_trait]
impl TestRunner for SandboxRunner {
    async fn run_tests(
        &self,
        package: &Package,
        runtime_dir: &Path,
        log_path: &Path,
    ) -> Result<TestOutcome> {
        tokio::fs::create_dir_all(&self.config.workdir).await?;
        let hosts = self.config.workdir.join("hosts");
        tokio::fs::write(&hosts, "127.0.0.1 localhost\n").await?;

        let log = std::fs::File::create(log_path)?;
        let log_err = log.try_clone()?;

        debug!("Sandboxing {} tests", package.name);
        let status = Command::new(&self.config.sandbox_program)
            .args(self.argv(package, runtime_dir, &hosts))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .status()
            .await?;

        Ok(if status.success() {
            TestOutcome::Passed
        } else {
            TestOutcome::Failed
        })
    }
}
