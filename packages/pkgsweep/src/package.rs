use crate::error::{Result, SweepError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// A `major.minor.patch` version triple.
///
/// Registry version keys are plain dotted numbers; missing components
/// default to zero, so `"1.2"` parses as `1.2.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = [0u64; 3];
        let mut count = 0;
        for piece in s.split('.') {
            if count == 3 {
                return Err(SweepError::parse(format!("invalid version: {s}")));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| SweepError::parse(format!("invalid version: {s}")))?;
            count += 1;
        }
        if count == 0 {
            return Err(SweepError::parse("empty version"));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An immutable package record.
///
/// Runtime-builtin packages have no version and no registry of origin;
/// registered packages carry both plus the on-disk metadata directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub id: Uuid,
    pub metadata_path: PathBuf,
    pub version: Option<Version>,
    pub registry: Option<String>,
}

impl Package {
    pub fn is_builtin(&self) -> bool {
        self.registry.is_none()
    }
}

/// A registry: a catalogue of packages parsed from a checkout on disk.
#[derive(Debug, Clone)]
pub struct Registry {
    pub name: String,
    pub id: Uuid,
    pub path: PathBuf,
    pub packages: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct RegistryDescriptor {
    name: String,
    uuid: Uuid,
    #[serde(default)]
    packages: BTreeMap<Uuid, PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: String,
    path: String,
}

impl Registry {
    /// Load a registry from a checkout directory containing `Registry.toml`.
    ///
    /// Each listed package resolves to its maximum available version from
    /// the package directory's `Versions.toml`.
    pub fn load(path: &Path) -> Result<Self> {
        let descriptor_path = path.join("Registry.toml");
        if !descriptor_path.is_file() {
            return Err(SweepError::RegistryNotFound(descriptor_path));
        }
        let raw = std::fs::read_to_string(&descriptor_path)?;
        let descriptor: RegistryDescriptor = toml::from_str(&raw)?;

        let mut packages = Vec::with_capacity(descriptor.packages.len());
        for (id, entry) in &descriptor.packages {
            if entry.name.is_empty() {
                return Err(SweepError::parse(format!("package {id} has an empty name")));
            }
            let metadata_path = path.join(&entry.path);
            let version = max_version(&entry.name, &metadata_path);
            packages.push(Package {
                name: entry.name.clone(),
                id: *id,
                metadata_path,
                version,
                registry: Some(descriptor.name.clone()),
            });
        }

        debug!(
            "Loaded registry {} ({} packages) from {}",
            descriptor.name,
            packages.len(),
            path.display()
        );

        Ok(Self {
            name: descriptor.name,
            id: descriptor.uuid,
            path: path.to_path_buf(),
            packages,
        })
    }
}

/// Pick the largest version listed in a package's `Versions.toml`.
fn max_version(name: &str, metadata_path: &Path) -> Option<Version> {
    let path = metadata_path.join("Versions.toml");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("No version metadata for {name} at {}: {err}", path.display());
            return None;
        }
    };
    let table: BTreeMap<String, toml::Value> = match toml::from_str(&raw) {
        Ok(table) => table,
        Err(err) => {
            warn!("Unreadable version metadata for {name}: {err}");
            return None;
        }
    };
    let mut best: Option<Version> = None;
    for key in table.keys() {
        match key.parse::<Version>() {
            Ok(version) => best = Some(best.map_or(version, |b| b.max(version))),
            Err(_) => warn!("Skipping malformed version {key:?} for {name}"),
        }
    }
    best
}

/// Load the declared dependencies of a registered package at its chosen
/// version: a map from dependency name to dependency id.
///
/// Missing or unreadable metadata yields no edges; the package still
/// participates in the sweep as a vertex.
pub fn load_dependencies(package: &Package) -> BTreeMap<String, Uuid> {
    let path = package.metadata_path.join("Deps.toml");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(
                "No dependency metadata for {} at {}: {err}",
                package.name,
                path.display()
            );
            return BTreeMap::new();
        }
    };
    let sections: BTreeMap<String, BTreeMap<String, Uuid>> = match toml::from_str(&raw) {
        Ok(sections) => sections,
        Err(err) => {
            warn!("Unreadable dependency metadata for {}: {err}", package.name);
            return BTreeMap::new();
        }
    };
    let Some(version) = package.version else {
        warn!(
            "{} has dependency metadata but no resolved version",
            package.name
        );
        return BTreeMap::new();
    };
    match sections.get(&version.to_string()) {
        Some(deps) => deps.clone(),
        None => {
            debug!("{} v{version} declares no dependencies", package.name);
            BTreeMap::new()
        }
    }
}
