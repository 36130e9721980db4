//! `Updates.xml` parsing
//!
//! Each `<PackageUpdate>` names a package, its exact version and the archives
//! it ships:
//!
//! ```xml
//! <PackageUpdate>
//!   <Name>qt.qt6.640.gcc_64</Name>
//!   <Version>6.4.0-0-202209200807</Version>
//!   <DownloadableArchives>qtbase-Linux-RHEL_7_6-GCC-Linux-RHEL_7_6-X86_64.7z, qtsvg-Linux-RHEL_7_6-GCC-Linux-RHEL_7_6-X86_64.7z</DownloadableArchives>
//! </PackageUpdate>
//! ```

use super::{ArchiveInfo, VersionArchives};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static PLATFORM_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-Windows|-Linux|-MacOS").expect("valid regex"));

#[derive(Default)]
struct PackageUpdate {
    name: Option<String>,
    version: Option<String>,
    archives: Option<String>,
}

/// Archive catalog of one version, grouped by architecture.
///
/// Packages missing a name, a version or any downloadable archive are
/// skipped. Hashes are left empty.
pub fn parse_updates_xml(xml: &str) -> Result<VersionArchives> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut archives = VersionArchives::new();
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut package_depth = 0usize;
    let mut current: Option<PackageUpdate> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let direct_child = current.is_some() && depth == package_depth;

                match name.as_ref() {
                    b"PackageUpdate" if current.is_none() => {
                        current = Some(PackageUpdate::default());
                        depth += 1;
                        package_depth = depth;
                    }
                    b"Name" | b"Version" | b"DownloadableArchives" if direct_child => {
                        let text = reader
                            .read_text(name)
                            .map_err(|e| xml_error(&reader, e))?
                            .trim()
                            .to_string();
                        if let Some(package) = current.as_mut() {
                            match name.as_ref() {
                                b"Name" => package.name = Some(text),
                                b"Version" => package.version = Some(text),
                                _ => package.archives = Some(text),
                            }
                        }
                    }
                    _ => depth += 1,
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"PackageUpdate" && depth == package_depth {
                    if let Some(package) = current.take() {
                        add_package(&mut archives, package);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(archives)
}

fn xml_error(reader: &quick_xml::Reader<&[u8]>, e: quick_xml::Error) -> Error {
    Error::Xml(format!("{} at position {}", e, reader.buffer_position()))
}

fn add_package(archives: &mut VersionArchives, package: PackageUpdate) {
    let (Some(name), Some(version), Some(list)) = (package.name, package.version, package.archives)
    else {
        return;
    };
    if name.is_empty() || version.is_empty() {
        return;
    }

    let files: Vec<&str> = list.split(", ").collect();
    if files.first().is_none_or(|first| first.is_empty()) {
        return;
    }

    let arch = arch_from_package_name(&name);
    let entries = archives.entry(arch.to_string()).or_default();
    for file in files {
        entries.insert(
            shorten_archive_name(file).to_string(),
            ArchiveInfo {
                rel_path: format!("{}/{}{}", name, version, file),
                sha256: String::new(),
            },
        );
    }
}

/// `qt.qt6.640.gcc_64` -> `gcc_64`, `qt.qt6.640.debug_info.gcc_64` -> `debug_info.gcc_64`
pub fn arch_from_package_name(name: &str) -> &str {
    match name.find("debug_info") {
        Some(start) => &name[start..],
        None => name.rsplit('.').next().unwrap_or(name),
    }
}

/// Drops the build platform suffix: `qtbase-Linux-RHEL_7_6-...7z` -> `qtbase`
pub fn shorten_archive_name(archive: &str) -> &str {
    PLATFORM_SUFFIX
        .find(archive)
        .map(|m| &archive[..m.start()])
        .unwrap_or(archive)
}
