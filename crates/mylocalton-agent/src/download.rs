use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Transient progress of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_read: u64,
    pub total_bytes: u64,
}

impl DownloadProgress {
    /// Floor percentage, capped at 100.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = self.bytes_read.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }
}

fn http_client() -> Result<reqwest::Client, DownloadError> {
    reqwest::Client::builder()
        .user_agent(concat!("mylocalton-agent/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()
        .map_err(|e| DownloadError::Client(e.to_string()))
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    destination.with_file_name(name)
}

/// Streams `url` into `destination`, reporting integer percentages.
///
/// The body lands in `<destination>.part` first and is renamed into place only
/// after the last byte is flushed. On any failure the partial file is removed,
/// so `destination` is either complete or untouched. A retry starts over.
pub async fn download<F>(url: &str, destination: &Path, mut on_progress: F) -> Result<u64, DownloadError>
where
    F: FnMut(u8) + Send,
{
    let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DownloadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tracing::info!(%url, dest = %destination.display(), "download started");

    let resp = http_client()?
        .get(parsed)
        .send()
        .await
        .map_err(|e| DownloadError::from_reqwest(url, e, false))?;

    if resp.status() != StatusCode::OK {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let part = partial_path(destination);
    let written = match stream_to_file(url, resp, &part, &mut on_progress).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(source) = tokio::fs::rename(&part, destination).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(DownloadError::Io {
            path: destination.to_path_buf(),
            source,
        });
    }

    on_progress(100);
    tracing::info!(%url, bytes = written, dest = %destination.display(), "download finished");
    Ok(written)
}

async fn stream_to_file<F>(
    url: &str,
    resp: reqwest::Response,
    part: &Path,
    on_progress: &mut F,
) -> Result<u64, DownloadError>
where
    F: FnMut(u8) + Send,
{
    let io_err = |source: std::io::Error| DownloadError::Io {
        path: part.to_path_buf(),
        source,
    };

    let total_bytes = resp.content_length().filter(|n| *n > 0);
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut stream = resp.bytes_stream();
    let mut bytes_read = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::from_reqwest(url, e, true))?;
        file.write_all(&chunk).await.map_err(io_err)?;
        bytes_read = bytes_read.saturating_add(chunk.len() as u64);

        if let Some(total_bytes) = total_bytes {
            on_progress(
                DownloadProgress {
                    bytes_read,
                    total_bytes,
                }
                .percent(),
            );
        }
    }

    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(bytes_read)
}
