use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SweepError>;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Registry descriptor not found: {0}")]
    RegistryNotFound(PathBuf),

    #[error("Unresolved dependency: {package} depends on unknown package id {dep}")]
    UnresolvedDependency { package: String, dep: uuid::Uuid },

    #[error("Duplicate package id: {0}")]
    DuplicatePackageId(uuid::Uuid),

    #[error("Runtime version not catalogued: {0}")]
    UnknownRuntime(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unpack failed: {0}")]
    Unpack(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn download<E: std::fmt::Display>(e: E) -> Self {
        Self::Download(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(SweepError::parse("bad"), SweepError::Parse(_)));
        assert!(matches!(SweepError::config("bad"), SweepError::Config(_)));
        assert!(matches!(
            SweepError::download("bad"),
            SweepError::Download(_)
        ));
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = SweepError::ChecksumMismatch {
            file: PathBuf::from("runtime.tar.gz"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("runtime.tar.gz"));
        assert!(msg.contains("aa"));
        assert!(msg.contains("bb"));
    }
}
