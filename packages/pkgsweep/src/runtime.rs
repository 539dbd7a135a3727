//! Runtime build catalogue and installer.
//!
//! `Runtimes.toml` maps version strings to archive sources: either a
//! `{url, sha}` pair to download and verify, or a `{file, sha}` pair for
//! a local archive. Archives unpack under one directory per version; an
//! existing directory counts as installed.

use crate::error::{Result, SweepError};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeCatalog {
    #[serde(flatten)]
    entries: BTreeMap<String, RuntimeSource>,
}

impl RuntimeCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn get(&self, version: &str) -> Option<&RuntimeSource> {
        self.entries.get(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

pub struct RuntimeInstaller {
    catalog: RuntimeCatalog,
    install_root: PathBuf,
}

impl RuntimeInstaller {
    pub fn new(catalog: RuntimeCatalog, install_root: PathBuf) -> Self {
        Self {
            catalog,
            install_root,
        }
    }

    /// Materialise `version` on disk and return its installation
    /// directory. Idempotent: an already-unpacked version is reused.
    pub async fn install(&self, version: &str) -> Result<PathBuf> {
        let source = self
            .catalog
            .get(version)
            .ok_or_else(|| SweepError::UnknownRuntime(version.to_string()))?
            .clone();

        let dest = self.install_root.join(version);
        if dest.is_dir() {
            info!("Runtime {version} already installed at {}", dest.display());
            return Ok(dest);
        }
        tokio::fs::create_dir_all(&self.install_root).await?;

        let archive = match (&source.file, &source.url) {
            (Some(file), _) => file.clone(),
            (None, Some(url)) => {
                let target = self.install_root.join(format!("{version}.archive"));
                download(url, &target).await?;
                target
            }
            (None, None) => {
                return Err(SweepError::config(format!(
                    "runtime {version} has neither url nor file"
                )))
            }
        };

        verify_sha256(&archive, &source.sha).await?;
        unpack(&archive, &dest).await?;
        info!("Installed runtime {version} at {}", dest.display());
        Ok(dest)
    }
}

async fn download(url: &str, target: &Path) -> Result<()> {
    info!("Downloading {url}");
    let status = Command::new("curl")
        .arg("-fsSL")
        .arg("-o")
        .arg(target)
        .arg(url)
        .status()
        .await?;
    if !status.success() {
        return Err(SweepError::Download(format!(
            "curl exited with {status} for {url}"
        )));
    }
    Ok(())
}

async fn verify_sha256(archive: &Path, expected: &str) -> Result<()> {
    let bytes = tokio::fs::read(archive).await?;
    let actual = hex_string(&Sha256::digest(&bytes));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(SweepError::ChecksumMismatch {
            file: archive.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

async fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let status = Command::new("tar")
        .arg("-xf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .arg("--strip-components=1")
        .status()
        .await?;
    if !status.success() {
        return Err(SweepError::Unpack(format!(
            "tar exited with {status} for {}",
            archive.display()
        )));
    }
    Ok(())
}

fn hex_string(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
