//! Discovery passes that build the local cache
//!
//! Every pass fans out over the [`TaskPool`] and stores its result through
//! [`crate::cache`], so an interrupted pass leaves the previous cache in place.

use super::listing::{parse_mirror_list, parse_subitems};
use super::updates::parse_updates_xml;
use super::{
    repository_url, ArchiveRef, MirrorList, VersionArchives, VersionMap, VersionPath,
    EXPECTED_OSES, EXPECTED_PLATFORMS,
};
use crate::cache;
use crate::downloaders::{fetch_text, RetrievalOptions};
use crate::error::{Error, Result};
use crate::paths;
use crate::pool::{run_one, TaskPool};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

static QT_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^qt[0-9]+$").expect("valid regex"));
static VERSION_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));

const EXPECTED_SUBVERSIONS: [&str; 5] = ["x86_64", "x86", "armv7", "arm64_v8a", "wasm"];

/// Outcome of probing candidate mirrors
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorProbe {
    pub available: MirrorList,
    pub unavailable: MirrorList,
}

/// Fetch a directory listing and return its entries.
pub async fn fetch_subitems(url: &str, options: &RetrievalOptions) -> Result<Vec<String>> {
    let html = fetch_text(url, options).await?;
    Ok(parse_subitems(&html))
}

/// The primary host followed by every mirror on its `/static/mirrorlist` page.
pub fn candidate_mirrors(primary: &str, options: &RetrievalOptions) -> Result<MirrorList> {
    let primary = primary.trim_end_matches('/');
    let url = format!("{}/static/mirrorlist", primary);
    let html = run_one(fetch_text(&url, options))?;

    let mut mirrors = vec![primary.to_string()];
    mirrors.extend(parse_mirror_list(&html));
    Ok(mirrors)
}

/// Whether `mirror` serves a repository root listing every expected OS.
///
/// Any retrieval failure just makes the mirror unavailable.
pub async fn check_mirror(mirror: &str, options: &RetrievalOptions) -> bool {
    match fetch_subitems(&repository_url(mirror), options).await {
        Ok(entries) => EXPECTED_OSES
            .iter()
            .all(|os| entries.iter().any(|entry| entry == os)),
        Err(e) => {
            debug!("Mirror {} unavailable: {}", mirror, e);
            false
        }
    }
}

/// Check all candidates concurrently and split them by availability.
pub fn probe_mirrors(
    candidates: &[String],
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<MirrorProbe> {
    let tasks = candidates
        .iter()
        .map(|mirror| {
            let mirror = mirror.clone();
            let options = *options;
            async move { Ok::<_, Error>(check_mirror(&mirror, &options).await) }
        })
        .collect();

    let availability = pool.run(tasks)?;

    let mut probe = MirrorProbe::default();
    for (mirror, available) in candidates.iter().zip(availability) {
        if available {
            probe.available.push(mirror.clone());
        } else {
            probe.unavailable.push(mirror.clone());
        }
    }
    Ok(probe)
}

/// `mirrors` pass: probe the primary host and its mirrors, store the working ones.
pub fn update_mirrors(
    primary: &str,
    data_dir: &Path,
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<MirrorProbe> {
    let candidates = candidate_mirrors(primary, options)?;
    println!("\nChecking {} qt mirrors.", candidates.len());

    let probe = probe_mirrors(&candidates, pool, options)?;

    println!("\nAvailable mirrors:");
    for mirror in &probe.available {
        println!("{}", mirror);
    }
    println!("\nUnavailable mirrors:");
    for mirror in &probe.unavailable {
        println!("{}", mirror);
    }

    cache::store(&probe.available, &paths::mirrors_file(data_dir))?;
    Ok(probe)
}

/// Keep the listing entries that look like Qt version directories.
///
/// Accepts `qt<N>_<M>` and `qt<N>_<M>_<sub>` (either separator) where `<sub>`
/// is one of the known target suffixes.
pub fn real_versions<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|entry| is_version_dir(entry))
        .map(str::to_string)
        .collect()
}

fn is_version_dir(entry: &str) -> bool {
    let mut parts = entry.splitn(3, ['_', '-']).filter(|part| !part.is_empty());
    let qt = parts.next().unwrap_or_default();
    let version = parts.next().unwrap_or_default();
    let sub = parts.next().unwrap_or_default();

    QT_PART.is_match(qt)
        && VERSION_PART.is_match(version)
        && (sub.is_empty() || EXPECTED_SUBVERSIONS.contains(&sub))
}

/// List the versions of every expected OS/platform pair on `base`.
pub fn discover_versions(base: &str, pool: &TaskPool, options: &RetrievalOptions) -> Result<VersionMap> {
    let sdk_url = repository_url(base);

    let pages: Vec<(String, String)> = EXPECTED_PLATFORMS
        .iter()
        .flat_map(|(os, platforms)| {
            platforms
                .iter()
                .map(move |platform| (os.to_string(), platform.to_string()))
        })
        .collect();

    println!(
        "\nFetching available versions from {} HTML pages\n    from {}",
        pages.len(),
        sdk_url
    );

    let tasks = pages
        .iter()
        .map(|(os, platform)| {
            let url = format!("{}/{}/{}", sdk_url, os, platform);
            let options = *options;
            async move {
                let entries = fetch_subitems(&url, &options).await?;
                Ok::<_, Error>(real_versions(entries.iter().map(String::as_str)))
            }
        })
        .collect();

    let found = pool.run(tasks)?;

    let mut versions: VersionMap = EXPECTED_OSES
        .iter()
        .map(|os| (os.to_string(), Default::default()))
        .collect();
    for ((os, platform), list) in pages.into_iter().zip(found) {
        versions.entry(os).or_default().insert(platform, list);
    }
    Ok(versions)
}

/// `versions` pass
pub fn update_versions(
    base: &str,
    data_dir: &Path,
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<VersionMap> {
    let versions = discover_versions(base, pool, options)?;
    cache::store(&versions, &paths::versions_file(data_dir))?;
    Ok(versions)
}

/// Every version listed in a `versions.json` map
pub fn version_paths(versions: &VersionMap) -> Vec<VersionPath> {
    versions
        .iter()
        .flat_map(|(os, platforms)| {
            platforms.iter().flat_map(move |(platform, list)| {
                list.iter().map(move |version| VersionPath::new(os, platform, version))
            })
        })
        .collect()
}

/// Fetch and parse `Updates.xml` of every version.
pub fn collect_archives(
    base: &str,
    versions: &[VersionPath],
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<Vec<(VersionPath, VersionArchives)>> {
    println!(
        "\nGetting the list of available archives by fetching and processing\n    {} 'Updates.xml' files\n    from {}",
        versions.len(),
        repository_url(base)
    );

    let tasks = versions
        .iter()
        .map(|version| {
            let url = format!("{}/Updates.xml", version.url(base));
            let options = *options;
            async move {
                let xml = fetch_text(&url, &options).await?;
                parse_updates_xml(&xml)
            }
        })
        .collect();

    let catalogs = pool.run(tasks)?;
    Ok(versions.iter().cloned().zip(catalogs).collect())
}

/// First whitespace-separated token of `<archive-url>.sha256`.
///
/// An empty hash file yields an empty hash, which later makes a download of
/// that archive refuse to start.
pub async fn fetch_hash(archive_url: &str, options: &RetrievalOptions) -> Result<String> {
    let url = format!("{}.sha256", archive_url);
    let text = fetch_text(&url, options).await?;

    match text.split_whitespace().next() {
        Some(hash) => Ok(hash.to_string()),
        None => {
            warn!("Empty hash file at {}", url);
            Ok(String::new())
        }
    }
}

/// Fill in the hash of every archive in `catalogs`.
pub fn populate_hashes(
    base: &str,
    catalogs: &mut [(VersionPath, VersionArchives)],
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<()> {
    let mut slots = Vec::new();
    let mut tasks = Vec::new();

    for (index, (version, archives)) in catalogs.iter().enumerate() {
        for (arch, entries) in archives {
            for (name, info) in entries {
                let url = ArchiveRef::from_info(name, info).url(base, version);
                let options = *options;
                slots.push((index, arch.clone(), name.clone()));
                tasks.push(async move { fetch_hash(&url, &options).await });
            }
        }
    }

    println!(
        "\nFetching {} hashes for available archives\n    from {}",
        tasks.len(),
        repository_url(base)
    );

    let hashes = pool.run(tasks)?;

    for ((index, arch, name), hash) in slots.into_iter().zip(hashes) {
        if let Some(info) = catalogs[index]
            .1
            .get_mut(&arch)
            .and_then(|entries| entries.get_mut(&name))
        {
            info.sha256 = hash;
        }
    }
    Ok(())
}

/// `hashes` pass: catalog and hash one version, or every version in `versions.json`.
///
/// Returns the number of version catalogs written. Versions without any
/// archive are not written.
pub fn update_hashes(
    base: &str,
    data_dir: &Path,
    only: Option<VersionPath>,
    pool: &TaskPool,
    options: &RetrievalOptions,
) -> Result<usize> {
    let versions = match only {
        Some(version) => vec![version],
        None => {
            let versions: VersionMap = cache::load(&paths::versions_file(data_dir))?;
            version_paths(&versions)
        }
    };

    let mut catalogs = collect_archives(base, &versions, pool, options)?;
    populate_hashes(base, &mut catalogs, pool, options)?;

    let mut written = 0;
    for (version, archives) in &catalogs {
        if archives.is_empty() {
            debug!("No archives for {}", version);
            continue;
        }
        cache::store(archives, &paths::version_file(data_dir, version))?;
        written += 1;
    }

    info!("Stored archive catalogs of {} versions", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fast_retrieval, quiet_pool, unreachable_url, MockMirror};

    fn listing(entries: &[&str]) -> Vec<u8> {
        let links: String = entries
            .iter()
            .map(|e| format!("<a href=\"{e}/\">{e}/</a>\n"))
            .collect();
        format!("<html><body><a href=\"../\">Parent Directory</a>\n{links}</body></html>").into_bytes()
    }

    #[test]
    fn test_real_versions() {
        let entries = [
            "qt6_640",
            "qt5_5152_wasm",
            "qt5_5150-arm64_v8a",
            "qt6_640_src_doc_examples",
            "qt6_dev",
            "tools_qtcreator",
            "qt6__640",
            "Qt6_640",
            "qt5_5152_wasm_singlethread",
        ];
        assert_eq!(
            real_versions(entries),
            vec!["qt6_640", "qt5_5152_wasm", "qt5_5150-arm64_v8a", "qt6__640"]
        );
    }

    #[test]
    fn test_candidate_mirrors() {
        let page = br#"<a href="http://mirror.example/qt/">HTTP</a> <a href="ftp://mirror.example/qt/">FTP</a>"#;
        let primary = MockMirror::serve(vec![("/static/mirrorlist", page.to_vec())]);

        let candidates = candidate_mirrors(&format!("{}/", primary.base()), &fast_retrieval(1)).unwrap();
        assert_eq!(
            candidates,
            vec![primary.base().to_string(), "https://mirror.example/qt".to_string()]
        );
    }

    #[test]
    fn test_probe_mirrors() {
        let good = MockMirror::serve(vec![(
            "/online/qtsdkrepository",
            listing(&["linux_x64", "mac_x64", "windows_x86", "all_os"]),
        )]);
        let partial = MockMirror::serve(vec![(
            "/online/qtsdkrepository",
            listing(&["linux_x64", "mac_x64"]),
        )]);
        let down = unreachable_url();

        let candidates = vec![
            partial.base().to_string(),
            good.base().to_string(),
            down.clone(),
        ];
        let probe = probe_mirrors(&candidates, &quiet_pool(3), &fast_retrieval(1)).unwrap();

        assert_eq!(probe.available, vec![good.base().to_string()]);
        assert_eq!(probe.unavailable, vec![partial.base().to_string(), down]);
    }

    #[test]
    fn test_update_versions() {
        let mut files = Vec::new();
        for (os, platforms) in EXPECTED_PLATFORMS {
            for platform in platforms {
                let path = format!("/online/qtsdkrepository/{}/{}", os, platform);
                let body = if os == "linux_x64" && *platform == "desktop" {
                    listing(&["qt6_640", "qt6_650_src_doc_examples", "tools_cmake"])
                } else {
                    listing(&[])
                };
                files.push((path, body));
            }
        }
        let files = files.iter().map(|(p, b)| (p.as_str(), b.clone())).collect();
        let server = MockMirror::serve(files);

        let dir = tempfile::tempdir().unwrap();
        let versions = update_versions(server.base(), dir.path(), &quiet_pool(4), &fast_retrieval(1)).unwrap();

        assert_eq!(versions.len(), 3);
        assert_eq!(versions["linux_x64"]["desktop"], vec!["qt6_640"]);
        assert!(versions["mac_x64"]["ios"].is_empty());
        assert_eq!(versions["windows_x86"].len(), 3);

        let stored: VersionMap = cache::load(&paths::versions_file(dir.path())).unwrap();
        assert_eq!(stored, versions);
        assert_eq!(version_paths(&stored), vec![VersionPath::new("linux_x64", "desktop", "qt6_640")]);
    }

    #[test]
    fn test_update_hashes_single_version() {
        let version_dir = "/online/qtsdkrepository/linux_x64/desktop/qt6_640";
        let updates = br#"<Updates><PackageUpdate>
            <Name>qt.qt6.640.gcc_64</Name>
            <Version>6.4.0-0-202209200807</Version>
            <DownloadableArchives>qtbase-Linux-RHEL_7_6-GCC-Linux-RHEL_7_6-X86_64.7z, icu-linux-Rhel7.2-x64.7z</DownloadableArchives>
        </PackageUpdate></Updates>"#;
        let qtbase_hash = format!(
            "{}/qt.qt6.640.gcc_64/6.4.0-0-202209200807qtbase-Linux-RHEL_7_6-GCC-Linux-RHEL_7_6-X86_64.7z.sha256",
            version_dir
        );
        let icu_hash = format!(
            "{}/qt.qt6.640.gcc_64/6.4.0-0-202209200807icu-linux-Rhel7.2-x64.7z.sha256",
            version_dir
        );
        let updates_path = format!("{}/Updates.xml", version_dir);
        let server = MockMirror::serve(vec![
            (updates_path.as_str(), updates.to_vec()),
            (qtbase_hash.as_str(), b"AbC123  qtbase.7z\n".to_vec()),
            (icu_hash.as_str(), b"\n".to_vec()),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let version = VersionPath::new("linux_x64", "desktop", "qt6_640");
        let written = update_hashes(
            server.base(),
            dir.path(),
            Some(version.clone()),
            &quiet_pool(2),
            &fast_retrieval(1),
        )
        .unwrap();
        assert_eq!(written, 1);

        let stored: VersionArchives = cache::load(&paths::version_file(dir.path(), &version)).unwrap();
        let gcc = &stored["gcc_64"];
        assert_eq!(gcc["qtbase"].sha256, "AbC123");
        assert_eq!(gcc["icu-linux-Rhel7.2-x64.7z"].sha256, "");
    }

    #[test]
    fn test_update_hashes_needs_versions_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = update_hashes(
            &unreachable_url(),
            dir.path(),
            None,
            &quiet_pool(1),
            &fast_retrieval(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
