//! Static allow/deny policy.
//!
//! Two compiled-in name sets: packages presumed passing without
//! execution, and packages never to execute. Deliberately not
//! configurable at run time; edits here ship with the binary.

use rustc_hash::FxHashSet;

/// Presumed passing. Suites that need infrastructure the sandbox cannot
/// provide but whose packages are load-bearing for large dependency
/// subtrees.
const ALLOW_LIST: &[&str] = &["Preferences", "Scratch", "NetworkTestFixtures"];

/// Never executed. Known to hang the worker slot or to require an
/// interactive display.
const DENY_LIST: &[&str] = &["Gtk", "Electron", "MPIBench"];

#[derive(Debug, Clone)]
pub struct SweepPolicy {
    allow: FxHashSet<String>,
    deny: FxHashSet<String>,
}

impl SweepPolicy {
    /// The compiled-in policy.
    pub fn builtin() -> Self {
        Self::with_lists(ALLOW_LIST, DENY_LIST)
    }

    pub fn with_lists(allow: &[&str], deny: &[&str]) -> Self {
        Self {
            allow: allow.iter().map(|s| (*s).to_string()).collect(),
            deny: deny.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::with_lists(&[], &[])
    }

    pub fn allows(&self, name: &str) -> bool {
        self.allow.contains(name)
    }

    pub fn denies(&self, name: &str) -> bool {
        self.deny.contains(name)
    }
}
