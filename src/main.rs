//! qtsdk-fetch - Qt SDK archive downloader
//!
//! Builds a local catalog of the Qt online repository (mirrors, versions,
//! archives and their hashes) and downloads verified archives from a random
//! working mirror.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use qtsdk_fetch::downloaders::{
    RetrievalOptions, DEFAULT_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
use qtsdk_fetch::installer::{DownloadConfig, Installer};
use qtsdk_fetch::pool::{PoolOptions, TaskPool};
use qtsdk_fetch::repository::{browse, discovery, VersionPath, DEFAULT_PRIMARY_URL};
use qtsdk_fetch::{paths, Error};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qtsdk-fetch")]
#[command(version)]
#[command(about = "Catalog the Qt SDK online repository and download verified archives from its mirrors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Folder holding mirrors.json, versions.json and the version catalogs
    #[arg(short, long, global = true, env = "QTSDK_FETCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Timeout of each request attempt, in seconds
    #[arg(long, global = true, value_parser = seconds, default_value_t = DEFAULT_TIMEOUT.as_secs_f64())]
    timeout: f64,

    /// Delay between request attempts, in seconds
    #[arg(long, global = true, value_parser = seconds, default_value_t = DEFAULT_RETRY_DELAY.as_secs_f64())]
    retry_delay: f64,

    /// Number of attempts per request
    #[arg(long, global = true, default_value_t = DEFAULT_ATTEMPTS)]
    attempts: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the working Qt mirrors and store them in mirrors.json
    Mirrors {
        /// Qt site which provides the mirror list
        #[arg(short = 'u', long, default_value = DEFAULT_PRIMARY_URL)]
        qt_url: String,

        /// Number of concurrent workers
        #[arg(short, long, default_value_t = 5)]
        workers: usize,

        /// Delay between progress prints, in seconds
        #[arg(long, value_parser = seconds, default_value_t = 5.0)]
        progress_secs: f64,
    },

    /// List the available versions per platform per OS into versions.json
    Versions {
        /// Qt site to list
        #[arg(short = 'u', long, default_value = DEFAULT_PRIMARY_URL)]
        qt_url: String,

        /// Number of concurrent workers
        #[arg(short, long, default_value_t = 5)]
        workers: usize,

        /// Delay between progress prints, in seconds
        #[arg(long, value_parser = seconds, default_value_t = 5.0)]
        progress_secs: f64,
    },

    /// Print OSs, the platforms of an OS or the versions of a platform
    PrintVersions {
        os: Option<String>,
        platform: Option<String>,
    },

    /// Catalog the archives of every known version (or just one) with their hashes
    Hashes {
        /// Qt site which provides Updates.xml and the hashes
        #[arg(short = 'u', long, default_value = DEFAULT_PRIMARY_URL)]
        qt_url: String,

        /// Number of concurrent workers
        #[arg(short, long, default_value_t = 400)]
        workers: usize,

        /// Delay between progress prints, in seconds
        #[arg(long, value_parser = seconds, default_value_t = 10.0)]
        progress_secs: f64,

        os: Option<String>,
        platform: Option<String>,
        version: Option<String>,
    },

    /// Print what has been cataloged: OSs, platforms, versions, archs or archives
    Print {
        os: Option<String>,
        platform: Option<String>,
        version: Option<String>,
        arch: Option<String>,
    },

    /// Download, verify and unpack archives from a random working mirror
    Download {
        os: String,
        platform: String,
        version: String,
        arch: String,

        /// Archives to download; 'all' selects every archive
        #[arg(short, long, num_args = 1.., default_value = "qtbase")]
        archives: Vec<String>,

        /// Folder to store downloaded archives
        #[arg(short = 'c', long, default_value = "archives")]
        archives_dir: PathBuf,

        /// Folder to unpack into
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Command that invokes 7z
        #[arg(short = 'z', long, num_args = 1.., default_value = qtsdk_fetch::archive::DEFAULT_7Z)]
        exe_7z: Vec<String>,

        /// Don't unpack and don't delete downloaded archives
        #[arg(short, long)]
        skip_unpack: bool,

        /// Don't delete downloaded archives after unpacking
        #[arg(short, long)]
        keep_archives: bool,

        /// Number of concurrent downloads
        #[arg(short, long, default_value_t = 5)]
        workers: usize,

        /// Delay between progress prints, in seconds
        #[arg(long, value_parser = seconds, default_value_t = 10.0)]
        progress_secs: f64,
    },
}

fn seconds(value: &str) -> std::result::Result<f64, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if secs.is_finite() && secs >= 0.0 {
        Ok(secs)
    } else {
        Err(format!("'{value}' is not a number of seconds"))
    }
}

fn task_pool(workers: usize, progress_secs: f64, cancel: &CancellationToken) -> TaskPool {
    TaskPool::new(PoolOptions::new(workers, Duration::from_secs_f64(progress_secs)))
        .with_cancellation(cancel.clone())
}

/// First Ctrl-C cancels the run; a second one exits on the spot.
fn install_interrupt_handler() -> Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();

    ctrlc::set_handler(move || {
        if handler_cancel.is_cancelled() {
            eprintln!("\nInterrupted");
            std::process::exit(130);
        }
        eprintln!("\nStopping, press Ctrl-C again to quit immediately");
        handler_cancel.cancel();
    })?;

    Ok(cancel)
}

fn print_list(items: &[String]) {
    for item in items {
        println!("{}", item);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "qtsdk_fetch=debug".parse()? } else { "qtsdk_fetch=warn".parse()? }),
            )
            .init();
    }

    let cancel = install_interrupt_handler()?;

    match run(cli, &cancel) {
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Interrupted)) => {
            eprintln!("\nInterrupted");
            std::process::exit(130);
        }
        other => other,
    }
}

fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(paths::default_data_dir);
    let retrieval = RetrievalOptions::new(
        Duration::from_secs_f64(cli.timeout),
        Duration::from_secs_f64(cli.retry_delay),
        cli.attempts,
    );

    match cli.command {
        Commands::Mirrors {
            qt_url,
            workers,
            progress_secs,
        } => {
            let pool = task_pool(workers, progress_secs, cancel);
            let probe = discovery::update_mirrors(&qt_url, &data_dir, &pool, &retrieval)?;
            println!(
                "\nSaved {} mirrors to {}",
                probe.available.len(),
                paths::mirrors_file(&data_dir).display()
            );
        }

        Commands::Versions {
            qt_url,
            workers,
            progress_secs,
        } => {
            let pool = task_pool(workers, progress_secs, cancel);
            let versions = discovery::update_versions(&qt_url, &data_dir, &pool, &retrieval)?;
            let total: usize = versions.values().flat_map(|p| p.values()).map(Vec::len).sum();
            println!(
                "\nSaved {} versions to {}",
                total,
                paths::versions_file(&data_dir).display()
            );
        }

        Commands::PrintVersions { os, platform } => {
            let items = browse::known_versions(&data_dir, os.as_deref(), platform.as_deref())?;
            print_list(&items);
        }

        Commands::Hashes {
            qt_url,
            workers,
            progress_secs,
            os,
            platform,
            version,
        } => {
            let only = match (os, platform, version) {
                (Some(os), Some(platform), Some(version)) => Some(VersionPath::new(os, platform, version)),
                (None, _, _) => None,
                _ => bail!("Both 'platform' and 'version' are needed to fetch the hashes of one version"),
            };
            let pool = task_pool(workers, progress_secs, cancel);
            let written = discovery::update_hashes(&qt_url, &data_dir, only, &pool, &retrieval)?;
            println!("\nSaved archive catalogs of {} versions to {}", written, data_dir.display());
        }

        Commands::Print {
            os,
            platform,
            version,
            arch,
        } => {
            let items = browse::cataloged(
                &data_dir,
                os.as_deref(),
                platform.as_deref(),
                version.as_deref(),
                arch.as_deref(),
            )?;
            print_list(&items);
        }

        Commands::Download {
            os,
            platform,
            version,
            arch,
            archives,
            archives_dir,
            out_dir,
            exe_7z,
            skip_unpack,
            keep_archives,
            workers,
            progress_secs,
        } => {
            let config = DownloadConfig {
                data_dir,
                version: VersionPath::new(os, platform, version),
                arch,
                archives,
                archives_dir,
                out_dir,
                exe_7z,
                skip_unpack,
                keep_archives,
                pool: PoolOptions::new(workers, Duration::from_secs_f64(progress_secs)),
                retrieval,
            };

            let pool = TaskPool::new(config.pool).with_cancellation(cancel.clone());
            let installer = Installer::new(config)?.with_task_pool(pool);
            let stats = installer.run()?;

            println!("\n=== Download Summary ===");
            println!(
                "Archives: {} downloaded, {} already present",
                stats.archives_downloaded, stats.archives_skipped
            );
            if let Some(mirror) = &stats.mirror {
                println!("Mirror:   {}", mirror);
            }
            if !stats.excluded_mirrors.is_empty() {
                println!("Excluded: {}", stats.excluded_mirrors.join(", "));
            }
            if stats.archives_unpacked > 0 {
                println!(
                    "Unpacked: {} archives into {}",
                    stats.archives_unpacked,
                    installer.config().out_dir.display()
                );
            }
        }
    }

    Ok(())
}
