//! Data directory layout
//!
//! ```text
//! data
//! ├── mirrors.json
//! ├── versions.json
//! ├── <os>/<platform>/<version>.json
//! └── runs/<os>/<platform>/<version>.json
//! ```

use crate::error::{Error, Result};
use crate::repository::VersionPath;
use std::path::{Path, PathBuf};

pub const MIRRORS_FILE: &str = "mirrors.json";
pub const VERSIONS_FILE: &str = "versions.json";
pub const RUNS_DIR: &str = "runs";

/// `~/.local/share/qtsdk-fetch` or the platform equivalent, `./data` if unknown
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("qtsdk-fetch"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

pub fn mirrors_file(data_dir: &Path) -> PathBuf {
    data_dir.join(MIRRORS_FILE)
}

pub fn versions_file(data_dir: &Path) -> PathBuf {
    data_dir.join(VERSIONS_FILE)
}

/// Archive catalog of one version
pub fn version_file(data_dir: &Path, version: &VersionPath) -> PathBuf {
    data_dir
        .join(&version.os)
        .join(&version.platform)
        .join(format!("{}.json", version.version))
}

/// Record of the last download run for one version
pub fn run_record_file(data_dir: &Path, version: &VersionPath) -> PathBuf {
    version_file(&data_dir.join(RUNS_DIR), version)
}

/// Local file name of an archive: the last `/` segment of its relative path
pub fn archive_file_name(rel_path: &str) -> &str {
    rel_path.rsplit('/').next().unwrap_or(rel_path)
}

pub fn archive_file_path(dir: &Path, rel_path: &str) -> PathBuf {
    dir.join(archive_file_name(rel_path))
}

/// Names of the subdirectories of `dir`, sorted
pub fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    list_entries(dir, |file_type| file_type.is_dir())
}

/// Names of the regular files in `dir`, sorted
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    list_entries(dir, |file_type| file_type.is_file())
}

fn list_entries(dir: &Path, keep: impl Fn(&std::fs::FileType) -> bool) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if keep(&file_type) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
