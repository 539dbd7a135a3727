//! Dependency-aware parallel test scheduler.
//!
//! One sweep runs `N + 2` cooperative tasks under a supervising join set:
//! `N` workers that pop ready packages and drive the sandbox, a single
//! scheduler task that owns all result finalisation and queue admission,
//! and a progress reporter that doubles as the quiescence detector.
//!
//! The scheduler task is the correctness spine: completions arrive over
//! one channel, and only that task mutates results for completed
//! vertices or admits new work, so the "last dependency to finish admits
//! the dependent" rule needs no further synchronisation.

use crate::error::{Result, SweepError};
use crate::graph::{DependencyGraph, TestResult};
use crate::policy::SweepPolicy;
use crate::report::{self, ProgressSnapshot, WorkerStatus};
use crate::runner::{TestOutcome, TestRunner};
use rustc_hash::FxHashSet;
use std::collections::BinaryHeap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Completion-channel sentinel that ends the scheduler task.
const SHUTDOWN: i64 = -1;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Concurrent sandbox slots.
    pub workers: usize,
    /// Directory receiving one `<package>.log` per tested package.
    pub log_dir: PathBuf,
    /// Wall-clock limit per test suite; expiry records `TimedOut`.
    pub package_timeout: Duration,
    pub report_interval: Duration,
    /// Redraw live progress on stdout. Off in tests.
    pub live_progress: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            workers: (num_cpus::get() * 3 / 4).max(1),
            log_dir: PathBuf::from("logs"),
            package_timeout: Duration::from_secs(45 * 60),
            report_interval: Duration::from_secs(1),
            live_progress: true,
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Idle,
    Busy { package: String, since: Instant },
}

struct SweepState {
    graph: DependencyGraph,
    /// Ready frontier, largest vertex index first.
    queue: BinaryHeap<usize>,
    running: Vec<Slot>,
    /// Vertices whose result the scheduler task has finalised.
    processed: FxHashSet<usize>,
    /// Completions published but not yet handled by the scheduler task.
    pending: usize,
}

struct SweepShared {
    state: Mutex<SweepState>,
    /// "The queue may be non-empty, or shutdown happened."
    ready: Notify,
    /// Delivered once to interrupt in-flight sandbox runs.
    interrupt: Notify,
    done: AtomicBool,
    signaled: AtomicBool,
    tx: UnboundedSender<i64>,
    config: SweepConfig,
    policy: SweepPolicy,
    runner: Arc<dyn TestRunner>,
    runtime_dir: PathBuf,
}

/// A configured sweep over one dependency graph.
pub struct Sweep {
    shared: Arc<SweepShared>,
    rx: UnboundedReceiver<i64>,
}

impl Sweep {
    pub fn new(
        graph: DependencyGraph,
        policy: SweepPolicy,
        runner: Arc<dyn TestRunner>,
        runtime_dir: PathBuf,
        config: SweepConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let workers = config.workers.max(1);
        let shared = Arc::new(SweepShared {
            state: Mutex::new(SweepState {
                graph,
                queue: BinaryHeap::new(),
                running: vec![Slot::Idle; workers],
                processed: FxHashSet::default(),
                pending: 0,
            }),
            ready: Notify::new(),
            interrupt: Notify::new(),
            done: AtomicBool::new(false),
            signaled: AtomicBool::new(false),
            tx,
            config,
            policy,
            runner,
            runtime_dir,
        });
        Self { shared, rx }
    }

    /// Run the sweep to completion and return the graph with every
    /// vertex's result finalised.
    ///
    /// An interrupt (ctrl-c) shuts the sweep down and is absorbed; a
    /// panicking or failing task shuts it down and surfaces as an error.
    pub async fn run(self) -> Result<DependencyGraph> {
        std::fs::create_dir_all(&self.shared.config.log_dir)?;
        self.shared.seed();

        let shared = self.shared;
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        tasks.spawn(SweepShared::scheduler_loop(shared.clone(), self.rx));
        for index in 0..shared.config.workers.max(1) {
            tasks.spawn(SweepShared::worker_loop(shared.clone(), index));
        }
        tasks.spawn(SweepShared::reporter_loop(shared.clone()));

        let watcher = tokio::spawn({
            let shared = shared.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, shutting down");
                    shared.stop();
                }
            }
        });

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("Sweep task failed: {err}");
                    shared.stop();
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                Err(join_err) => {
                    error!("Sweep task panicked: {join_err}");
                    shared.stop();
                    if first_err.is_none() {
                        first_err = Some(SweepError::TaskFailed(join_err.to_string()));
                    }
                }
            }
        }
        watcher.abort();

        if let Some(err) = first_err {
            return Err(err);
        }
        let graph = shared.state().graph.clone();
        Ok(graph)
    }
}

impl SweepShared {
    fn state(&self) -> MutexGuard<'_, SweepState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initial state: builtins and allow-listed packages are pre-passed
    /// and their completions published, true leaves seed the frontier,
    /// deny-listed packages and their dependents are skipped outright.
    fn seed(&self) {
        let mut guard = self.state();
        let st = &mut *guard;
        let n = st.graph.len();

        for v in 0..n {
            let (name, builtin) = {
                let package = st.graph.package(v);
                (package.name.clone(), package.is_builtin())
            };
            if (builtin || self.policy.allows(&name)) && !self.policy.denies(&name) {
                st.graph.set_result(v, TestResult::Passed);
                st.pending += 1;
                let _ = self.tx.send(v as i64);
            }
        }

        for v in 0..n {
            if st.graph.dependencies(v).is_empty()
                && st.graph.result(v) == TestResult::Untested
                && !self.policy.denies(&st.graph.package(v).name)
            {
                st.queue.push(v);
            }
        }

        for v in 0..n {
            if self.policy.denies(&st.graph.package(v).name) {
                st.graph.skip(v);
            }
        }

        info!(
            "Seeded sweep: {} ready leaves, {} pre-passed, {} vertices total",
            st.queue.len(),
            st.pending,
            n
        );
    }

    /// Single consumer of the completion channel. Exclusively finalises
    /// completed vertices and admits newly-ready dependents.
    async fn scheduler_loop(self: Arc<Self>, mut rx: UnboundedReceiver<i64>) -> Result<()> {
        while let Some(message) = rx.recv().await {
            if message == SHUTDOWN {
                debug!("Scheduler task stopping");
                break;
            }
            let v = message as usize;
            {
                let mut guard = self.state();
                let st = &mut *guard;
                st.processed.insert(v);
                let passed = st.graph.result(v) == TestResult::Passed;
                let dependents = st.graph.dependents(v).to_vec();
                for u in dependents {
                    if !passed {
                        st.graph.skip(u);
                        continue;
                    }
                    if st.processed.contains(&u) || st.graph.result(u) != TestResult::Untested {
                        continue;
                    }
                    // Only the last dependency to complete can observe
                    // every out-neighbour processed, so `u` is admitted
                    // at most once.
                    let ready = st.graph.dependencies(u).iter().all(|d| {
                        st.processed.contains(d) && st.graph.result(*d) == TestResult::Passed
                    });
                    if ready {
                        debug!("Admitting {}", st.graph.package(u).name);
                        st.queue.push(u);
                    }
                }
                st.pending -= 1;
            }
            self.ready.notify_waiters();
        }
        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, index: usize) -> Result<()> {
        loop {
            if self.done.load(Ordering::SeqCst) {
                break;
            }
            let next = {
                let mut guard = self.state();
                let st = &mut *guard;
                match st.queue.pop() {
                    Some(v) => {
                        let package = st.graph.package(v).clone();
                        st.running[index] = Slot::Busy {
                            package: package.name.clone(),
                            since: Instant::now(),
                        };
                        Some((v, package))
                    }
                    None => None,
                }
            };
            let Some((v, package)) = next else {
                let notified = self.ready.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.done.load(Ordering::SeqCst) {
                    break;
                }
                let empty = self.state().queue.is_empty();
                if empty {
                    notified.await;
                }
                continue;
            };

            let log_path = self.config.log_dir.join(format!("{}.log", package.name));
            let attempt = tokio::time::timeout(
                self.config.package_timeout,
                self.runner.run_tests(&package, &self.runtime_dir, &log_path),
            );
            let finished = tokio::select! {
                finished = attempt => Some(finished),
                _ = self.interrupt.notified() => None,
            };
            let Some(finished) = finished else {
                // Shutdown mid-run; dropping the attempt reaps the child.
                self.state().running[index] = Slot::Idle;
                break;
            };

            let result = match finished {
                Err(_) => {
                    warn!(
                        "{} timed out after {}",
                        package.name,
                        report::format_duration(self.config.package_timeout)
                    );
                    TestResult::TimedOut
                }
                Ok(Ok(TestOutcome::Passed)) => TestResult::Passed,
                Ok(Ok(TestOutcome::Failed)) => TestResult::Failed,
                Ok(Err(err)) => {
                    warn!("Sandbox error for {}: {err}", package.name);
                    TestResult::Failed
                }
            };
            info!("{}: {result}", package.name);

            {
                let mut guard = self.state();
                let st = &mut *guard;
                st.graph.set_result(v, result);
                st.running[index] = Slot::Idle;
                st.pending += 1;
            }
            if self.tx.send(v as i64).is_err() {
                break;
            }
        }
        Ok(())
    }

    /// ~1 Hz progress redraw; also the quiescence detector that ends a
    /// normally-terminating sweep.
    async fn reporter_loop(self: Arc<Self>) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.report_interval);
        let mut prev_lines = 0usize;
        loop {
            interval.tick().await;
            if self.done.load(Ordering::SeqCst) {
                break;
            }
            let snapshot = self.snapshot();
            if self.config.live_progress {
                let frame = report::render(&snapshot);
                let mut stdout = std::io::stdout().lock();
                let _ = write!(stdout, "{}{frame}", report::erase_frame(prev_lines));
                let _ = stdout.flush();
                prev_lines = frame.lines().count();
            }
            if snapshot.quiescent() {
                info!("Sweep complete");
                self.stop();
                break;
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let guard = self.state();
        let st = &*guard;
        let (passed, failed, timed_out, skipped, untested) =
            ProgressSnapshot::tally(st.graph.results());
        ProgressSnapshot {
            passed,
            failed,
            timed_out,
            skipped,
            untested,
            frontier: st.queue.len(),
            pending: st.pending,
            workers: st
                .running
                .iter()
                .map(|slot| match slot {
                    Slot::Idle => WorkerStatus::Idle,
                    Slot::Busy { package, since } => WorkerStatus::Running {
                        package: package.clone(),
                        elapsed: since.elapsed(),
                    },
                })
                .collect(),
        }
    }

    /// Idempotent global shutdown: raises `done`, wakes queue waiters,
    /// pushes the channel sentinel, and interrupts in-flight sandbox
    /// runs exactly once.
    fn stop(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            debug!("Shutdown initiated");
        }
        self.ready.notify_waiters();
        let _ = self.tx.send(SHUTDOWN);
        if !self.signaled.swap(true, Ordering::SeqCst) {
            self.interrupt.notify_waiters();
        }
    }
}
