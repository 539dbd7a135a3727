//! Post-run analysis: which failures block the most of the ecosystem.

use crate::error::Result;
use crate::graph::{DependencyGraph, TestResult};
use crate::report::ProgressSnapshot;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use uuid::Uuid;

/// A failed (or timed-out) package, weighted by how many distinct
/// transitive reverse-dependents a fix would unblock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureImpact {
    pub name: String,
    pub id: Uuid,
    pub result: TestResult,
    pub blocked_dependents: usize,
}

/// Rank failed packages by transitive reverse-dependent count,
/// descending; ties break on name so the order is stable.
pub fn rank_failures(graph: &DependencyGraph) -> Vec<FailureImpact> {
    let mut ranked = Vec::new();
    for v in 0..graph.len() {
        let result = graph.result(v);
        if !result.is_failure() {
            continue;
        }
        let package = graph.package(v);
        ranked.push(FailureImpact {
            name: package.name.clone(),
            id: package.id,
            result,
            blocked_dependents: count_ancestors(graph, v),
        });
    }
    ranked.sort_by(|a, b| {
        b.blocked_dependents
            .cmp(&a.blocked_dependents)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

/// Size of the ancestor set of `v` (everything that transitively depends
/// on it), excluding `v` itself.
fn count_ancestors(graph: &DependencyGraph, v: usize) -> usize {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([v]);
    while let Some(u) = queue.pop_front() {
        for &w in graph.dependents(u) {
            if seen.insert(w) {
                queue.push_back(w);
            }
        }
    }
    seen.remove(&v);
    seen.len()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTotals {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub untested: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub name: String,
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub result: TestResult,
}

/// Machine-readable summary of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub generated_at: DateTime<Utc>,
    pub runtime_version: String,
    pub totals: ResultTotals,
    pub packages: Vec<PackageOutcome>,
    pub failures: Vec<FailureImpact>,
}

impl SweepReport {
    pub fn from_graph(graph: &DependencyGraph, runtime_version: &str) -> Self {
        let (passed, failed, timed_out, skipped, untested) =
            ProgressSnapshot::tally(graph.results());
        let packages = (0..graph.len())
            .map(|v| {
                let package = graph.package(v);
                PackageOutcome {
                    name: package.name.clone(),
                    id: package.id,
                    version: package.version.map(|version| version.to_string()),
                    registry: package.registry.clone(),
                    result: graph.result(v),
                }
            })
            .collect();
        Self {
            generated_at: Utc::now(),
            runtime_version: runtime_version.to_string(),
            totals: ResultTotals {
                passed,
                failed,
                timed_out,
                skipped,
                untested,
            },
            packages,
            failures: rank_failures(graph),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
