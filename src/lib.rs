//! qtsdk-fetch - Qt SDK archive downloader
//!
//! Library side of the `qtsdk-fetch` binary: repository discovery, the
//! bounded task pool, mirror failover and verified archive downloads.

pub mod archive;
pub mod cache;
pub mod downloaders;
pub mod error;
pub mod hash;
pub mod installer;
pub mod paths;
pub mod pool;
pub mod repository;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
