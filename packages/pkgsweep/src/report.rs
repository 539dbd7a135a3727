//! Live progress rendering.
//!
//! The reporter redraws one summary line plus one line per worker slot,
//! in place, using CSI cursor control. Rendering is a pure function over
//! a [`ProgressSnapshot`] so the output can be asserted on directly.

use crate::graph::TestResult;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Running { package: String, elapsed: Duration },
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub untested: usize,
    /// Ready vertices waiting for a worker slot.
    pub frontier: usize,
    /// Completions published but not yet handled.
    pub pending: usize,
    pub workers: Vec<WorkerStatus>,
}

impl ProgressSnapshot {
    pub fn tally(results: &[TestResult]) -> (usize, usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0, 0);
        for result in results {
            match result {
                TestResult::Passed => counts.0 += 1,
                TestResult::Failed => counts.1 += 1,
                TestResult::TimedOut => counts.2 += 1,
                TestResult::Skipped => counts.3 += 1,
                TestResult::Untested => counts.4 += 1,
            }
        }
        counts
    }

    /// Nothing queued, nobody working, nothing in flight. Once true the
    /// run can only stay true, so the reporter uses it to end the sweep.
    pub fn quiescent(&self) -> bool {
        self.frontier == 0
            && self.pending == 0
            && self.workers.iter().all(|w| *w == WorkerStatus::Idle)
    }
}

/// One frame: the summary line followed by a line per worker.
pub fn render(snapshot: &ProgressSnapshot) -> String {
    let mut out = format!(
        "Success: {} Failed: {} Skipped: {} Frontier: {} Remaining: {}\n",
        snapshot.passed,
        snapshot.failed + snapshot.timed_out,
        snapshot.skipped,
        snapshot.frontier,
        snapshot.untested,
    );
    for (i, worker) in snapshot.workers.iter().enumerate() {
        match worker {
            WorkerStatus::Idle => out.push_str(&format!("Worker {i}: idle\n")),
            WorkerStatus::Running { package, elapsed } => out.push_str(&format!(
                "Worker {i}: {package} running for {}\n",
                format_duration(*elapsed)
            )),
        }
    }
    out
}

/// CSI prefix that erases the previous frame of `lines` lines.
pub fn erase_frame(lines: usize) -> String {
    if lines == 0 {
        String::new()
    } else {
        format!("\x1b[{lines}A\x1b[J")
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            passed: 12,
            failed: 2,
            timed_out: 1,
            skipped: 5,
            untested: 40,
            frontier: 3,
            pending: 0,
            workers: vec![
                WorkerStatus::Idle,
                WorkerStatus::Running {
                    package: "Alpha".to_string(),
                    elapsed: Duration::from_secs(222),
                },
            ],
        }
    }

    #[test]
    fn test_render_summary_and_workers() {
        let frame = render(&snapshot());
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Success: 12 Failed: 3 Skipped: 5 Frontier: 3 Remaining: 40"
        );
        assert_eq!(lines[1], "Worker 0: idle");
        assert_eq!(lines[2], "Worker 1: Alpha running for 3m42s");
    }

    #[test]
    fn test_tally_counts_each_state() {
        let results = [
            TestResult::Passed,
            TestResult::Passed,
            TestResult::Failed,
            TestResult::TimedOut,
            TestResult::Skipped,
            TestResult::Untested,
        ];
        assert_eq!(ProgressSnapshot::tally(&results), (2, 1, 1, 1, 1));
    }

    #[test]
    fn test_quiescent() {
        let mut s = snapshot();
        assert!(!s.quiescent());
        s.frontier = 0;
        s.workers = vec![WorkerStatus::Idle, WorkerStatus::Idle];
        assert!(s.quiescent());
        s.pending = 1;
        assert!(!s.quiescent());
    }

    #[test]
    fn test_erase_frame() {
        assert_eq!(erase_frame(0), "");
        assert_eq!(erase_frame(3), "\x1b[3A\x1b[J");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(17)), "17s");
        assert_eq!(format_duration(Duration::from_secs(222)), "3m42s");
        assert_eq!(format_duration(Duration::from_secs(7345)), "2h02m");
    }
}
