//! Error taxonomy shared by every layer of the downloader.
//!
//! The variants are kept distinct so callers can tell "the network is down"
//! (retry elsewhere) apart from "the content is wrong" (stop everything).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Underlying cause of a failed retrieval (transport, HTTP status or local write).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A network operation failed after all attempts were used.
    #[error("Failed to retrieve {url}: {source}")]
    Retrieval {
        url: String,
        #[source]
        source: BoxError,
    },

    /// A file that was expected locally does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Hash mismatch of just downloaded file\n    expected {expected}\n    computed {computed}\n    for file {}\n    downloaded from {url}",
        .path.display()
    )]
    HashMismatch {
        archive: String,
        expected: String,
        computed: String,
        path: PathBuf,
        url: String,
    },

    #[error("All mirrors unreachable. Tried: {}", .tried.join(", "))]
    AllMirrorsExhausted { tried: Vec<String> },

    #[error("Archive '{0}' has no known hash; run the hashes pass first")]
    MissingHash(String),

    #[error("'{archive}' archive not found for arch '{arch}' in {}", .path.display())]
    ArchiveNotFound {
        archive: String,
        arch: String,
        path: PathBuf,
    },

    #[error("'{key}' not found in {}", .path.display())]
    UnknownKey { key: String, path: PathBuf },

    #[error("Invalid Updates.xml: {0}")]
    Xml(String),

    #[error("7z failed for {}: {message}", .archive.display())]
    Extract { archive: PathBuf, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted")]
    Interrupted,

    #[error("Worker task panicked: {0}")]
    WorkerPanic(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Failed to start worker pool: {0}")]
    Runtime(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path)
        } else {
            Error::Io { path, source }
        }
    }

    /// Errors that mean "this mirror did not work", as opposed to
    /// integrity, interruption or programming failures.
    pub fn is_mirror_failure(&self) -> bool {
        matches!(
            self,
            Error::Retrieval { .. } | Error::Io { .. } | Error::NotFound(_)
        )
    }

    /// Errors that must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::HashMismatch { .. } | Error::AllMirrorsExhausted { .. } | Error::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = Error::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::NotFound(_)));

        let err = Error::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_hash_mismatch_is_not_a_mirror_failure() {
        let err = Error::HashMismatch {
            archive: "qtbase".into(),
            expected: "aa".into(),
            computed: "bb".into(),
            path: PathBuf::from("/tmp/qtbase.7z"),
            url: "https://mirror/qtbase.7z".into(),
        };
        assert!(!err.is_mirror_failure());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("expected aa"));
    }

    #[test]
    fn test_exhausted_lists_mirrors() {
        let err = Error::AllMirrorsExhausted {
            tried: vec!["https://a".into(), "https://b".into()],
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "All mirrors unreachable. Tried: https://a, https://b");
    }
}
