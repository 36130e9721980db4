//! 7z command-line extraction
//!
//! # 7z Commands Reference
//!
//! ```text
//! 7z x -aoa -bd -y -o<dir> <archive>
//!    x     extract with full paths
//!    -aoa  overwrite all existing files without prompt
//!    -bd   no progress indicator
//!    -y    yes to all prompts
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub const DEFAULT_7Z: &str = "7z";

/// Look a program up on `PATH`, falling back to the name as given.
pub fn resolve_program(program: &str) -> PathBuf {
    which::which(program).unwrap_or_else(|_| PathBuf::from(program))
}

/// Extract every file of `archive_path` into `output_dir`.
///
/// `command` is the 7z invocation prefix, e.g. `["7z"]` or
/// `["wine", "7z.exe"]`; its first element is resolved on `PATH`.
/// Returns the number of files now in `output_dir`.
pub fn extract_all(command: &[String], archive_path: &Path, output_dir: &Path) -> Result<usize> {
    let Some((program, prefix_args)) = command.split_first() else {
        return Err(Error::Extract {
            archive: archive_path.to_path_buf(),
            message: "no 7z command configured".to_string(),
        });
    };

    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let program = resolve_program(program);
    debug!("Extracting {} with {}", archive_path.display(), program.display());

    let output = Command::new(&program)
        .args(prefix_args)
        .arg("x")
        .arg("-aoa")
        .arg("-bd")
        .arg("-y")
        .arg(format!("-o{}", output_dir.display()))
        .arg(archive_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Extract {
            archive: archive_path.to_path_buf(),
            message: format!("failed to run {}: {}", program.display(), e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extract {
            archive: archive_path.to_path_buf(),
            message: format!("{} {}", output.status, stderr.trim()),
        });
    }

    // Count extracted files
    let count = walkdir::WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count();

    Ok(count)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn fake_7z() -> Vec<String> {
        // $5 is -o<dir>, $6 the archive
        vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"out="${5#-o}"; mkdir -p "$out/lib" && cp "$6" "$out/lib/""#.to_string(),
            "fake-7z".to_string(),
        ]
    }

    #[test]
    fn test_extract_all() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("qtbase.7z");
        std::fs::write(&archive, b"not really 7z")?;
        let out = dir.path().join("out");

        let count = extract_all(&fake_7z(), &archive, &out)?;

        assert_eq!(count, 1);
        assert!(out.join("lib").join("qtbase.7z").exists());
        Ok(())
    }

    #[test]
    fn test_extract_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.7z");

        let err = extract_all(&["false".to_string()], &archive, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let command = vec!["qtsdk-fetch-no-such-7z".to_string()];

        let err = extract_all(&command, &dir.path().join("a.7z"), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Extract { ref message, .. } if message.contains("failed to run")));
    }

    #[test]
    fn test_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_all(&[], &dir.path().join("a.7z"), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }

    #[test]
    fn test_resolve_program() {
        assert!(resolve_program("sh").is_absolute());
        assert_eq!(resolve_program("qtsdk-fetch-no-such-7z"), PathBuf::from("qtsdk-fetch-no-such-7z"));
    }
}
