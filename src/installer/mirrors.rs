//! Mirror failover for archive downloads
//!
//! A batch is always fetched from one mirror. When that mirror fails with a
//! network-class error it is dropped for the rest of the run and the batch is
//! retried on another randomly chosen mirror; archives that already made it
//! to disk are not fetched again. A hash mismatch stops everything: the bytes
//! are corrupt or tampered with, and quietly trying another mirror would hide
//! that.

use crate::cache;
use crate::downloaders::{fetch_to_file, RetrievalOptions};
use crate::error::{Error, Result};
use crate::hash::{compute_file_hash, is_already_valid};
use crate::paths;
use crate::pool::TaskPool;
use crate::repository::{ArchiveRef, MirrorList, VersionPath};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mirrors usable for the current run
#[derive(Debug, Clone, Default)]
pub struct MirrorPool {
    available: Vec<String>,
    excluded: Vec<String>,
}

impl MirrorPool {
    /// Duplicates and trailing slashes are dropped.
    pub fn new(mirrors: impl IntoIterator<Item = String>) -> Self {
        let mut available: Vec<String> = Vec::new();
        for mirror in mirrors {
            let mirror = mirror.trim_end_matches('/').to_string();
            if !mirror.is_empty() && !available.contains(&mirror) {
                available.push(mirror);
            }
        }
        Self {
            available,
            excluded: Vec::new(),
        }
    }

    /// Load `mirrors.json` from the data directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mirrors: MirrorList = cache::load(&paths::mirrors_file(data_dir))?;
        Ok(Self::new(mirrors))
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// Mirrors dropped so far, in the order they failed
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Pick a mirror uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.available.choose(rng).map(String::as_str)
    }

    /// Drop `mirror` for the rest of the run. Returns false if it was not available.
    pub fn exclude(&mut self, mirror: &str) -> bool {
        match self.available.iter().position(|m| m == mirror) {
            Some(index) => {
                let removed = self.available.remove(index);
                self.excluded.push(removed);
                true
            }
            None => false,
        }
    }
}

/// Outcome of [`download_batch`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Mirror the remaining archives came from; `None` if nothing was fetched
    pub mirror: Option<String>,
    /// Mirrors excluded during this batch
    pub excluded: Vec<String>,
    /// Archives fetched by the final, successful attempt
    pub downloaded: Vec<String>,
    /// Archives that were already on disk with the right hash
    pub skipped: Vec<String>,
}

/// Make every archive of `archives` present and verified in `dest_dir`.
///
/// Archives are saved as the last segment of their `rel_path`. Every archive
/// must carry an expected hash; otherwise nothing is fetched.
pub fn download_batch<R: Rng + ?Sized>(
    archives: &[ArchiveRef],
    version: &VersionPath,
    mirrors: &mut MirrorPool,
    dest_dir: &Path,
    pool: &TaskPool,
    retrieval: &RetrievalOptions,
    rng: &mut R,
) -> Result<BatchReport> {
    if let Some(archive) = archives.iter().find(|a| a.expected_hash.is_empty()) {
        return Err(Error::MissingHash(archive.name.clone()));
    }

    std::fs::create_dir_all(dest_dir).map_err(|e| Error::io(dest_dir, e))?;
    let excluded_before = mirrors.excluded().len();

    loop {
        let (pending, valid): (Vec<&ArchiveRef>, Vec<&ArchiveRef>) = archives.iter().partition(|a| {
            !is_already_valid(&paths::archive_file_path(dest_dir, &a.rel_path), &a.expected_hash)
        });
        pool.check_interrupt()?;
        let mut report = BatchReport {
            mirror: None,
            excluded: mirrors.excluded()[excluded_before..].to_vec(),
            downloaded: Vec::new(),
            skipped: valid.iter().map(|a| a.name.clone()).collect(),
        };

        if pending.is_empty() {
            println!("All {} archives are already downloaded", archives.len());
            return Ok(report);
        }

        let Some(mirror) = mirrors.choose(rng).map(str::to_string) else {
            return Err(Error::AllMirrorsExhausted {
                tried: mirrors.excluded().to_vec(),
            });
        };

        println!("Downloading {} archives\n    from {}", pending.len(), mirror);

        let tasks = pending
            .iter()
            .map(|archive| {
                download_archive(
                    (*archive).clone(),
                    archive.url(&mirror, version),
                    paths::archive_file_path(dest_dir, &archive.rel_path),
                    *retrieval,
                )
            })
            .collect();

        match pool.run(tasks) {
            Ok(_) => {
                report.downloaded = pending.iter().map(|a| a.name.clone()).collect();
                report.mirror = Some(mirror);
                return Ok(report);
            }
            Err(e) if e.is_mirror_failure() => {
                println!(
                    "{}\nFailed to fetch an archive from {}\nThe mirror will no longer be used for this run.",
                    e, mirror
                );
                warn!("Excluding mirror {}: {}", mirror, e);
                mirrors.exclude(&mirror);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch one archive and check it against its expected hash.
///
/// A file that fails the check is deleted before the error is returned.
async fn download_archive(
    archive: ArchiveRef,
    url: String,
    path: PathBuf,
    retrieval: RetrievalOptions,
) -> Result<()> {
    fetch_to_file(&url, &path, &retrieval).await?;

    let hash_path = path.clone();
    let computed = tokio::task::spawn_blocking(move || compute_file_hash(&hash_path))
        .await
        .map_err(|e| Error::WorkerPanic(e.to_string()))??;

    if computed.eq_ignore_ascii_case(&archive.expected_hash) {
        debug!("Verified {}", path.display());
        return Ok(());
    }

    let _ = tokio::fs::remove_file(&path).await;
    Err(Error::HashMismatch {
        archive: archive.name,
        expected: archive.expected_hash,
        computed,
        path,
        url,
    })
}
