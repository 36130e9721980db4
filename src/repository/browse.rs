//! Read-only views of the local cache for the listing commands

use super::{VersionArchives, VersionMap, VersionPath};
use crate::cache;
use crate::error::{Error, Result};
use crate::paths;
use std::path::Path;

/// Contents of `versions.json`, narrowed step by step.
///
/// No OS lists the OSs, an OS alone lists its platforms, OS and platform
/// list the versions.
pub fn known_versions(data_dir: &Path, os: Option<&str>, platform: Option<&str>) -> Result<Vec<String>> {
    let path = paths::versions_file(data_dir);
    let versions: VersionMap = cache::load(&path)?;

    let Some(os) = os else {
        return Ok(versions.into_keys().collect());
    };
    let platforms = versions.get(os).ok_or_else(|| unknown(os, &path))?;

    match platform {
        Some(platform) => platforms
            .get(platform)
            .cloned()
            .ok_or_else(|| unknown(platform, &path)),
        None => Ok(platforms.keys().cloned().collect()),
    }
}

/// What has been cataloged by the hashes pass, narrowed step by step.
///
/// Walks the data directory the same way as [`known_versions`], one level
/// deeper: a full version path lists its architectures, and with `arch` the
/// archive names of that architecture. Everything is sorted.
pub fn cataloged(
    data_dir: &Path,
    os: Option<&str>,
    platform: Option<&str>,
    version: Option<&str>,
    arch: Option<&str>,
) -> Result<Vec<String>> {
    match (os, platform, version) {
        (Some(os), Some(platform), Some(version)) => {
            let version_path = VersionPath::new(os, platform, version);
            let path = paths::version_file(data_dir, &version_path);
            let archives: VersionArchives = cache::load(&path)?;

            match arch {
                Some(arch) => archives
                    .get(arch)
                    .map(|names| names.keys().cloned().collect())
                    .ok_or_else(|| unknown(arch, &path)),
                None => Ok(archives.into_keys().collect()),
            }
        }
        (Some(os), Some(platform), None) => {
            let files = paths::list_files(&data_dir.join(os).join(platform))?;
            Ok(files
                .iter()
                .filter_map(|file| file.strip_suffix(".json"))
                .map(str::to_string)
                .collect())
        }
        (Some(os), None, _) => paths::list_dirs(&data_dir.join(os)),
        (None, _, _) => {
            let mut dirs = paths::list_dirs(data_dir)?;
            dirs.retain(|dir| dir != paths::RUNS_DIR);
            Ok(dirs)
        }
    }
}

fn unknown(key: &str, path: &Path) -> Error {
    Error::UnknownKey {
        key: key.to_string(),
        path: path.to_path_buf(),
    }
}
