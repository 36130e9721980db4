//! Qt SDK repository model
//!
//! The remote tree is laid out as
//! `<base>/online/qtsdkrepository/<os>/<platform>/<version>/`, with an
//! `Updates.xml` describing the packages of each version and every archive
//! published next to a `.sha256` file.

pub mod browse;
pub mod discovery;
pub mod listing;
pub mod updates;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_PRIMARY_URL: &str = "https://download.qt.io";
pub const REPOSITORY_PATH: &str = "online/qtsdkrepository";

/// A mirror is only usable if its repository lists all of these
pub const EXPECTED_OSES: [&str; 3] = ["windows_x86", "linux_x64", "mac_x64"];

/// Platforms scanned for versions, per OS
pub const EXPECTED_PLATFORMS: [(&str, &[&str]); 3] = [
    ("windows_x86", &["winrt", "android", "desktop"]),
    ("linux_x64", &["android", "desktop"]),
    ("mac_x64", &["android", "desktop", "ios"]),
];

/// `<os>/<platform>/<version>`, the key of every per-version record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionPath {
    pub os: String,
    pub platform: String,
    pub version: String,
}

impl VersionPath {
    pub fn new(os: impl Into<String>, platform: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            platform: platform.into(),
            version: version.into(),
        }
    }

    /// Remote directory of this version under a mirror base URL
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", repository_url(base), self)
    }
}

impl fmt::Display for VersionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.os, self.platform, self.version)
    }
}

/// Stored form of one archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Path below the version directory, `<package>/<version><archive>`
    pub rel_path: String,
    /// Lowercase hex SHA-256, empty until the hashes pass fills it in
    #[serde(default)]
    pub sha256: String,
}

/// One archive selected for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    pub name: String,
    pub rel_path: String,
    pub expected_hash: String,
}

impl ArchiveRef {
    pub fn new(name: impl Into<String>, rel_path: impl Into<String>, expected_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rel_path: rel_path.into(),
            expected_hash: expected_hash.into(),
        }
    }

    pub fn from_info(name: &str, info: &ArchiveInfo) -> Self {
        Self::new(name, info.rel_path.as_str(), info.sha256.as_str())
    }

    /// Remote location of the archive on `mirror`
    pub fn url(&self, mirror: &str, version: &VersionPath) -> String {
        format!("{}/{}", version.url(mirror), self.rel_path)
    }
}

/// `<os>/<platform>/<version>.json`: arch -> archive name -> info
pub type VersionArchives = BTreeMap<String, BTreeMap<String, ArchiveInfo>>;

/// `versions.json`: os -> platform -> versions
pub type VersionMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// `mirrors.json`
pub type MirrorList = Vec<String>;

pub fn repository_url(base: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), REPOSITORY_PATH)
}
