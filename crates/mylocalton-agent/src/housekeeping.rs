use std::path::{Path, PathBuf};

use crate::error::{EntryFailure, HousekeepingError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
}

/// Deletes every entry under `dir`, keeping `dir` itself.
///
/// A missing `dir` is created. Entries that cannot be removed are collected and
/// returned together in [`HousekeepingError::Partial`]; the rest are still removed.
pub async fn clean_directory(dir: &Path) -> Result<CleanReport, HousekeepingError> {
    let io_err = |source| HousekeepingError::Io {
        path: dir.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(dir).await.map_err(io_err)?;

    let mut rd = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut report = CleanReport::default();
    let mut failures = Vec::new();

    while let Some(entry) = rd.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let res = match entry.file_type().await {
            Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match res {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete entry");
                failures.push(EntryFailure {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(HousekeepingError::Partial { failures });
    }
    report.removed.sort();
    Ok(report)
}

/// Removes `path` if present.
pub async fn remove_if_exists(path: &Path) -> Result<bool, HousekeepingError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(HousekeepingError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
