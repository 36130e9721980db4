//! JSON cache files under the data directory.
//!
//! Writes go to a temporary file in the target's directory which is then
//! renamed over the target, so readers only ever see a complete file.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read and deserialize a cache file.
///
/// A missing file is [`Error::NotFound`]; malformed content is [`Error::Parse`].
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `value` next to `path` without replacing it yet.
///
/// The returned temp file is deleted if dropped; call
/// [`NamedTempFile::persist`] to move it into place.
pub fn stage<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| Error::io(path, std::io::Error::other(e)))?;
        writer.flush().map_err(|e| Error::io(path, e))?;
    }
    temp.as_file().sync_all().map_err(|e| Error::io(path, e))?;

    Ok(temp)
}

/// Atomically replace `path` with the JSON form of `value`.
pub fn store<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let temp = stage(value, path)?;
    temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    debug!("Saved {}", path.display());
    Ok(())
}
