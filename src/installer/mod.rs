//! Download orchestrator
//!
//! Coordinates the phases of a `download` run:
//! 1. Select     - resolve the requested archives in the version catalog
//! 2. Download   - fetch and verify them through the mirror pool
//! 3. Record     - store which mirror served the run
//! 4. Unpack     - extract every archive with 7z
//! 5. Cleanup    - remove the archives unless asked to keep them

pub mod config;
pub mod mirrors;

pub use config::{ConfigError, DownloadConfig};
pub use mirrors::{download_batch, BatchReport, MirrorPool};

use crate::archive::extract_all;
use crate::cache;
use crate::error::{Error, Result};
use crate::paths;
use crate::pool::TaskPool;
use crate::repository::{ArchiveInfo, ArchiveRef, VersionArchives};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Log how long a phase took and how much archive data it covered.
fn log_phase_metrics(phase: &str, started: Instant, archives_dir: &Path, archives: &[ArchiveRef]) {
    let bytes: u64 = archives
        .iter()
        .filter_map(|a| fs::metadata(paths::archive_file_path(archives_dir, &a.rel_path)).ok())
        .map(|meta| meta.len())
        .sum();
    info!(
        "Phase done: phase='{}' elapsed_ms={} archives={} bytes={}",
        phase,
        started.elapsed().as_millis(),
        archives.len(),
        bytes
    );
}

/// What a finished run fetched and from where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub version_path: String,
    pub arch: String,
    /// `None` when every archive was already on disk
    pub mirror: Option<String>,
    pub excluded_mirrors: Vec<String>,
    pub archives: BTreeMap<String, ArchiveInfo>,
    pub finished_at: DateTime<Utc>,
}

/// Run statistics
#[derive(Debug, Default, Clone)]
pub struct InstallStats {
    pub archives_downloaded: usize,
    pub archives_skipped: usize,
    pub archives_unpacked: usize,
    pub archives_removed: usize,
    pub mirror: Option<String>,
    pub excluded_mirrors: Vec<String>,
}

/// Main download orchestrator
pub struct Installer {
    config: DownloadConfig,
    pool: TaskPool,
}

impl Installer {
    /// Create a new installer with the given configuration
    pub fn new(config: DownloadConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let pool = TaskPool::new(config.pool);
        Ok(Self { config, pool })
    }

    /// Replace the task pool, e.g. to change how progress is reported
    pub fn with_task_pool(mut self, pool: TaskPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Resolve the requested archive names against the version catalog.
    pub fn select_archives(&self) -> Result<Vec<ArchiveRef>> {
        let path = self.config.version_file();
        let catalog: VersionArchives = cache::load(&path)?;

        let available = catalog.get(&self.config.arch).ok_or_else(|| Error::UnknownKey {
            key: self.config.arch.clone(),
            path: path.clone(),
        })?;

        if self.config.wants_all() {
            return Ok(available
                .iter()
                .map(|(name, info)| ArchiveRef::from_info(name, info))
                .collect());
        }

        let mut selected: Vec<ArchiveRef> = Vec::new();
        for name in &self.config.archives {
            let info = available.get(name).ok_or_else(|| Error::ArchiveNotFound {
                archive: name.clone(),
                arch: self.config.arch.clone(),
                path: path.clone(),
            })?;
            if !selected.iter().any(|a| &a.name == name) {
                selected.push(ArchiveRef::from_info(name, info));
            }
        }
        Ok(selected)
    }

    /// Run the whole download, picking mirrors with the thread-local RNG.
    pub fn run(&self) -> Result<InstallStats> {
        self.run_with_rng(&mut rand::thread_rng())
    }

    pub fn run_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<InstallStats> {
        let config = &self.config;

        let started = Instant::now();
        let archives = self.select_archives()?;
        let mut mirrors = MirrorPool::load(&config.data_dir)?;
        info!(
            "Selected {} archives of {} {}; {} mirrors known",
            archives.len(),
            config.version,
            config.arch,
            mirrors.len()
        );

        let report = download_batch(
            &archives,
            &config.version,
            &mut mirrors,
            &config.archives_dir,
            &self.pool,
            &config.retrieval,
            rng,
        )?;
        log_phase_metrics("download", started, &config.archives_dir, &archives);

        let mut stats = InstallStats {
            archives_downloaded: report.downloaded.len(),
            archives_skipped: report.skipped.len(),
            mirror: report.mirror.clone(),
            excluded_mirrors: report.excluded.clone(),
            ..Default::default()
        };

        self.record_run(&archives, &report)?;
        self.pool.check_interrupt()?;

        if config.skip_unpack {
            return Ok(stats);
        }

        let started = Instant::now();
        for archive in &archives {
            self.pool.check_interrupt()?;
            let path = paths::archive_file_path(&config.archives_dir, &archive.rel_path);
            println!("Unpacking {}", archive.name);
            extract_all(&config.exe_7z, &path, &config.out_dir)?;
            stats.archives_unpacked += 1;
        }
        log_phase_metrics("unpack", started, &config.archives_dir, &archives);

        if !config.keep_archives {
            for archive in &archives {
                let path = paths::archive_file_path(&config.archives_dir, &archive.rel_path);
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                stats.archives_removed += 1;
            }
            // Only succeeds once the directory is empty
            let _ = fs::remove_dir(&config.archives_dir);
        }

        Ok(stats)
    }

    fn record_run(&self, archives: &[ArchiveRef], report: &BatchReport) -> Result<()> {
        let record = RunRecord {
            version_path: self.config.version.to_string(),
            arch: self.config.arch.clone(),
            mirror: report.mirror.clone(),
            excluded_mirrors: report.excluded.clone(),
            archives: archives
                .iter()
                .map(|a| {
                    (
                        a.name.clone(),
                        ArchiveInfo {
                            rel_path: a.rel_path.clone(),
                            sha256: a.expected_hash.clone(),
                        },
                    )
                })
                .collect(),
            finished_at: Utc::now(),
        };
        cache::store(&record, &self.config.run_record_file())
    }
}
