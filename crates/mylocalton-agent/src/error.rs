//! Error types for each lifecycle operation.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("invalid download url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("build http client: {0}")]
    Client(String),

    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download from {url} timed out")]
    Timeout { url: String },

    #[error("download from {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("read body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("write {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error, during_body: bool) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            DownloadError::Timeout { url }
        } else if during_body {
            DownloadError::Body { url, source: err }
        } else {
            DownloadError::Connect { url, source: err }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("already running (lock file {})", .lock_file.display())]
    AlreadyRunning { lock_file: PathBuf },

    #[error("artifact not found at {}; download it first", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("spawn `{command}` failed: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StopError {
    #[error("list processes with `{command}` failed: {message}")]
    ListProcesses { command: String, message: String },

    #[error("signal helper not found at {}", .0.display())]
    HelperMissing(PathBuf),

    #[error("signal pid {pid} failed: {message}")]
    Signal { pid: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HousekeepingError {
    #[error("installation is in use by a running instance ({reason}); stop it first")]
    StillRunning { reason: String },

    #[error("failed to delete {} entries: {}", .failures.len(), join_failures(.failures))]
    Partial { failures: Vec<EntryFailure> },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_failures(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(thiserror::Error, Debug)]
pub enum VersionError {
    #[error("artifact not found at {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("run `{command}` failed: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u128 },

    #[error("`{command}` printed no version; the java runtime may be missing or too old")]
    Empty { command: String },
}

/// Stable machine-readable code and a user hint for each error kind.
pub trait ErrorCode {
    fn code(&self) -> &'static str;

    fn hint(&self) -> Option<&'static str> {
        None
    }
}

impl ErrorCode for DownloadError {
    fn code(&self) -> &'static str {
        "download_failed"
    }

    fn hint(&self) -> Option<&'static str> {
        Some("Check network connectivity to github.com, then retry the download.")
    }
}

impl ErrorCode for LaunchError {
    fn code(&self) -> &'static str {
        match self {
            LaunchError::AlreadyRunning { .. } => "already_running",
            LaunchError::ArtifactMissing(_) => "artifact_missing",
            LaunchError::Spawn { .. } => "spawn_failed",
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            LaunchError::AlreadyRunning { .. } => Some("Stop the running instance first."),
            LaunchError::ArtifactMissing(_) => Some("Run `download` first."),
            LaunchError::Spawn { .. } => Some("Ensure Java is installed (or set MYLOCALTON_JAVA)."),
        }
    }
}

impl ErrorCode for StopError {
    fn code(&self) -> &'static str {
        match self {
            StopError::ListProcesses { .. } => "process_list_failed",
            StopError::HelperMissing(_) => "signal_helper_missing",
            StopError::Signal { .. } => "signal_failed",
        }
    }
}

impl ErrorCode for HousekeepingError {
    fn code(&self) -> &'static str {
        match self {
            HousekeepingError::StillRunning { .. } => "not_stopped",
            HousekeepingError::Partial { .. } | HousekeepingError::Io { .. } => "delete_failed",
        }
    }

    fn hint(&self) -> Option<&'static str> {
        Some("Make sure the MyLocalTon process is not running, then try again.")
    }
}

impl ErrorCode for VersionError {
    fn code(&self) -> &'static str {
        "version_unavailable"
    }

    fn hint(&self) -> Option<&'static str> {
        Some("Install a recent Java runtime (or set MYLOCALTON_JAVA).")
    }
}
