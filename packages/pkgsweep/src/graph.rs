//! Directed dependency graph over registered and builtin packages.
//!
//! Vertices are packages; an edge `u -> v` means "u depends on v".
//! Per-vertex adjacency is stored in both directions: `deps` (out-edges)
//! drives admission, `dependents` (in-edges) drives skip propagation and
//! impact ranking. The graph is made acyclic at construction by removing
//! the closing edge of every enumerated cycle.

use crate::error::{Result, SweepError};
use crate::package::{self, Package, Registry};
use crate::stdlib;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-package outcome of a sweep.
///
/// A slot leaves `Untested` at most once per run; skip propagation is the
/// only transition that may overwrite an already-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Untested,
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Untested => "untested",
            TestResult::Passed => "passed",
            TestResult::Failed => "failed",
            TestResult::TimedOut => "timed_out",
            TestResult::Skipped => "skipped",
        }
    }

    /// Failed and timed-out packages propagate skips identically.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Failed | TestResult::TimedOut)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    vertices: Vec<Package>,
    id_to_vertex: FxHashMap<Uuid, usize>,
    results: Vec<TestResult>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build a graph from package records and (dependent, dependency)
    /// id pairs. An edge endpoint with no package record is fatal.
    pub fn new(packages: Vec<Package>, edges: Vec<(Uuid, Uuid)>) -> Result<Self> {
        let mut id_to_vertex = FxHashMap::default();
        for (index, package) in packages.iter().enumerate() {
            if id_to_vertex.insert(package.id, index).is_some() {
                return Err(SweepError::DuplicatePackageId(package.id));
            }
        }

        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); packages.len()];
        for (from, to) in edges {
            let Some(&u) = id_to_vertex.get(&from) else {
                return Err(SweepError::UnresolvedDependency {
                    package: from.to_string(),
                    dep: to,
                });
            };
            let Some(&v) = id_to_vertex.get(&to) else {
                return Err(SweepError::UnresolvedDependency {
                    package: packages[u].name.clone(),
                    dep: to,
                });
            };
            deps[u].push(v);
        }
        for list in &mut deps {
            list.sort_unstable();
            list.dedup();
        }

        let removed = break_cycles(&mut deps);
        if removed > 0 {
            warn!("Removed {removed} dependency edge(s) to break cycles");
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); packages.len()];
        for (u, list) in deps.iter().enumerate() {
            for &v in list {
                dependents[v].push(u);
            }
        }

        let results = vec![TestResult::Untested; packages.len()];
        Ok(Self {
            vertices: packages,
            id_to_vertex,
            results,
            deps,
            dependents,
        })
    }

    /// Build the full sweep graph for a registry checkout: registered
    /// packages merged with the builtin catalogue (builtin records win on
    /// id collisions), edges from builtin inter-dependencies and from
    /// each package's dependency metadata.
    pub fn from_registry(registry: &Registry) -> Result<Self> {
        let builtins = stdlib::packages();
        let builtin_ids: FxHashSet<Uuid> = builtins.iter().map(|p| p.id).collect();

        let mut packages = Vec::with_capacity(registry.packages.len() + builtins.len());
        for package in &registry.packages {
            if builtin_ids.contains(&package.id) {
                debug!("Registry copy of builtin {} superseded", package.name);
            } else {
                packages.push(package.clone());
            }
        }
        let registered = packages.len();
        packages.extend(builtins);

        let mut edges = stdlib::dependency_pairs();
        for package in &packages[..registered] {
            for (_, dep_id) in package::load_dependencies(package) {
                edges.push((package.id, dep_id));
            }
        }

        Self::new(packages, edges)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn package(&self, v: usize) -> &Package {
        &self.vertices[v]
    }

    pub fn result(&self, v: usize) -> TestResult {
        self.results[v]
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn set_result(&mut self, v: usize, result: TestResult) {
        self.results[v] = result;
    }

    /// Out-neighbours: the packages `v` depends on.
    pub fn dependencies(&self, v: usize) -> &[usize] {
        &self.deps[v]
    }

    /// In-neighbours: the packages that depend on `v`.
    pub fn dependents(&self, v: usize) -> &[usize] {
        &self.dependents[v]
    }

    pub fn vertex_by_id(&self, id: Uuid) -> Option<usize> {
        self.id_to_vertex.get(&id).copied()
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<usize> {
        self.vertices.iter().position(|p| p.name == name)
    }

    /// Vertices with no dependencies at all.
    pub fn leaves(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&v| self.deps[v].is_empty())
    }

    /// Mark `v` skipped and propagate to everything that depends on it,
    /// directly or transitively. Idempotent: an already-skipped vertex is
    /// not revisited, so each ancestor is handled at most once.
    pub fn skip(&mut self, v: usize) {
        let mut stack = vec![v];
        while let Some(u) = stack.pop() {
            if self.results[u] == TestResult::Skipped {
                continue;
            }
            self.results[u] = TestResult::Skipped;
            stack.extend(
                self.dependents[u]
                    .iter()
                    .copied()
                    .filter(|&w| self.results[w] != TestResult::Skipped),
            );
        }
    }
}

/// Remove the closing edge of every cycle reachable by a depth-first walk
/// in ascending vertex order. Returns the number of edges removed.
///
/// When the walk finds a back-edge `u -> w` (w still on the visit stack),
/// the cycle runs `w .. u` and `u -> w` is its closing edge. The walk
/// restarts after each removal; enumeration order is fixed by the vertex
/// numbering, so the result is deterministic.
fn break_cycles(deps: &mut [Vec<usize>]) -> usize {
    let mut removed = 0;
    while let Some((u, w)) = find_back_edge(deps) {
        debug!("Breaking cycle by removing edge {u} -> {w}");
        deps[u].retain(|&v| v != w);
        removed += 1;
    }
    removed
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

fn find_back_edge(deps: &[Vec<usize>]) -> Option<(usize, usize)> {
    let mut marks = vec![Mark::White; deps.len()];
    for root in 0..deps.len() {
        if marks[root] != Mark::White {
            continue;
        }
        // Iterative DFS: (vertex, index of the next out-edge to follow).
        let mut stack = vec![(root, 0usize)];
        marks[root] = Mark::Grey;
        while let Some(&(u, next)) = stack.last() {
            if next >= deps[u].len() {
                marks[u] = Mark::Black;
                stack.pop();
                continue;
            }
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            let w = deps[u][next];
            match marks[w] {
                Mark::Grey => return Some((u, w)),
                Mark::White => {
                    marks[w] = Mark::Grey;
                    stack.push((w, 0));
                }
                Mark::Black => {}
            }
        }
    }
    None
}
