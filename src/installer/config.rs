//! Download configuration
//!
//! Defines what the `download` command fetches and where it puts it.

use crate::downloaders::RetrievalOptions;
use crate::paths;
use crate::pool::PoolOptions;
use crate::repository::VersionPath;
use std::path::PathBuf;

/// Archive name that selects every archive of the architecture
pub const ALL_ARCHIVES: &str = "all";

/// Configuration for one download run
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory holding `mirrors.json` and the version catalogs
    pub data_dir: PathBuf,

    /// OS, platform and Qt version to download from
    pub version: VersionPath,

    /// Architecture inside the version, e.g. `gcc_64`
    pub arch: String,

    /// Short archive names, or `all`
    pub archives: Vec<String>,

    /// Where downloaded archives are stored
    pub archives_dir: PathBuf,

    /// Where archives are unpacked
    pub out_dir: PathBuf,

    /// Command used to invoke 7z
    pub exe_7z: Vec<String>,

    /// Download only
    pub skip_unpack: bool,

    /// Keep the archives after unpacking
    pub keep_archives: bool,

    pub pool: PoolOptions,
    pub retrieval: RetrievalOptions,
}

impl DownloadConfig {
    pub fn version_file(&self) -> PathBuf {
        paths::version_file(&self.data_dir, &self.version)
    }

    pub fn run_record_file(&self) -> PathBuf {
        paths::run_record_file(&self.data_dir, &self.version)
    }

    pub fn wants_all(&self) -> bool {
        self.archives.iter().any(|name| name == ALL_ARCHIVES)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("os", &self.version.os),
            ("platform", &self.version.platform),
            ("version", &self.version.version),
            ("arch", &self.arch),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Empty(field));
            }
            if value.contains(['/', '\\']) || value == "." || value == ".." {
                return Err(ConfigError::InvalidComponent {
                    field,
                    value: value.clone(),
                });
            }
        }

        if self.archives.is_empty() {
            return Err(ConfigError::NoArchives);
        }

        if !self.skip_unpack && self.exe_7z.is_empty() {
            return Err(ConfigError::No7z);
        }

        if !self.data_dir.is_dir() {
            return Err(ConfigError::DataDirNotFound(self.data_dir.clone()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("'{0}' must not be empty")]
    Empty(&'static str),

    #[error("'{field}' must be a single path component, got '{value}'")]
    InvalidComponent { field: &'static str, value: String },

    #[error("No archives requested")]
    NoArchives,

    #[error("No 7z command given")]
    No7z,

    #[error("Data directory not found: {}. Run the mirrors, versions and hashes commands first", .0.display())]
    DataDirNotFound(PathBuf),
}
