//! HTTP client with per-attempt timeouts and whole-file downloads

use super::{with_retry, RetrievalOptions};
use crate::error::{BoxError, Error, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Thin wrapper around a configured `reqwest` client
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client whose connect and read timeouts both equal `options.timeout`.
    pub fn new(options: &RetrievalOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("qtsdk-fetch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(options.timeout)
            .read_timeout(options.timeout)
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> std::result::Result<reqwest::Response, BoxError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response)
    }
}

/// Fetch `url` into memory.
pub async fn fetch_bytes(url: &str, options: &RetrievalOptions) -> Result<Vec<u8>> {
    let client = HttpClient::new(options)?;
    let client = &client;

    with_retry(url, options, move || async move {
        let response = client.get(url).await?;
        let body = response.bytes().await?;
        Ok::<_, BoxError>(body.to_vec())
    })
    .await
}

/// Fetch `url` and decode it as UTF-8, replacing invalid sequences.
pub async fn fetch_text(url: &str, options: &RetrievalOptions) -> Result<String> {
    let bytes = fetch_bytes(url, options).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Download `url` to `output_path`, replacing whatever is there.
///
/// Bytes are streamed into a sibling `.part` file that is recreated on every
/// attempt and renamed over `output_path` only once the body is complete.
/// The `.part` file is deleted when an attempt fails or the download is
/// dropped half way, so no partial archive is ever left behind.
pub async fn fetch_to_file(url: &str, output_path: &Path, options: &RetrievalOptions) -> Result<u64> {
    let client = HttpClient::new(options)?;

    let (part, written) = with_retry(url, options, || stream_to_part(&client, url, output_path)).await?;

    part.persist(output_path)
        .map_err(|e| Error::io(output_path, e.error))?;
    debug!("Downloaded {} bytes to {}", written, output_path.display());
    Ok(written)
}

async fn stream_to_part(
    client: &HttpClient,
    url: &str,
    output_path: &Path,
) -> std::result::Result<(NamedTempFile, u64), BoxError> {
    let response = client.get(url).await?;
    let part = create_part(output_path)?;

    let mut file = File::from_std(part.reopen()?);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((part, written))
}

/// Create `<output_path>.part`, replacing one left by a killed process.
fn create_part(output_path: &Path) -> std::io::Result<NamedTempFile> {
    let part_path = part_path(output_path);
    match std::fs::remove_file(&part_path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let dir = match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(output_path.file_name().unwrap_or_default())
        .suffix(".part")
        .rand_bytes(0)
        .tempfile_in(dir)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{unreachable_url, MockMirror};
    use std::time::Duration;

    fn quick() -> RetrievalOptions {
        RetrievalOptions::new(Duration::from_secs(5), Duration::from_millis(10), 3)
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let mirror = MockMirror::serve(vec![("/hello.txt", b"hello mirror".to_vec())]);
        let text = fetch_text(&mirror.url("/hello.txt"), &quick()).await.unwrap();
        assert_eq!(text, "hello mirror");
        assert_eq!(mirror.hits(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_retrieval_error_after_all_attempts() {
        let mirror = MockMirror::serve(vec![]);
        let err = fetch_bytes(&mirror.url("/missing"), &quick()).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval { .. }));
        assert_eq!(mirror.hits(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mirror = MockMirror::serve(vec![("/a.7z", b"payload".to_vec())]).failing_first(2);
        let bytes = fetch_bytes(&mirror.url("/a.7z"), &quick()).await.unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(mirror.hits(), 3);
    }

    #[tokio::test]
    async fn test_fetch_to_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.7z");
        std::fs::write(&target, b"old content that is longer").unwrap();

        let mirror = MockMirror::serve(vec![("/a.7z", b"new".to_vec())]);
        let written = fetch_to_file(&mirror.url("/a.7z"), &target, &quick()).await.unwrap();

        assert_eq!(written, 3);
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.7z");

        let err = fetch_to_file(&unreachable_url(), &target, &quick()).await.unwrap_err();

        assert!(err.is_mirror_failure());
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_dropped_download_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.7z");
        let mirror = MockMirror::serve(vec![("/a.7z", vec![1u8; 4096])]).stalling("/a.7z");

        let url = mirror.url("/a.7z");
        let opts = quick();
        let download = fetch_to_file(&url, &target, &opts);
        let outcome = tokio::time::timeout(Duration::from_millis(300), download).await;

        assert!(outcome.is_err());
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_stale_part_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.7z");
        std::fs::write(part_path(&target), b"left over from a killed run").unwrap();

        let mirror = MockMirror::serve(vec![("/a.7z", b"fresh".to_vec())]);
        fetch_to_file(&mirror.url("/a.7z"), &target, &quick()).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/archives/qtbase.7z")),
            PathBuf::from("/tmp/archives/qtbase.7z.part")
        );
    }
}
