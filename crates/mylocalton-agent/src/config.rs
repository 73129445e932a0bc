use std::{path::PathBuf, time::Duration};

use crate::artifact::DEFAULT_DOWNLOAD_BASE_URL;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_STARTUP_GRACE_SEC: u64 = 180;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5000;

pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|v| v.parse::<u64>().ok())
}

/// Runtime knobs, read once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub home: PathBuf,
    pub download_base_url: String,
    pub java: PathBuf,
    pub poll_interval: Duration,
    pub startup_grace: Duration,
    pub query_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory (set MYLOCALTON_HOME)"))?;
        Ok(Self::with_home(home))
    }

    /// Same as [`AgentConfig::from_env`] but with an explicit home directory.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            download_base_url: env_string("MYLOCALTON_DOWNLOAD_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_BASE_URL.to_string()),
            java: java_binary(),
            poll_interval: Duration::from_millis(
                env_u64("MYLOCALTON_POLL_INTERVAL_MS")
                    .map(|v| v.clamp(500, 60_000))
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            startup_grace: Duration::from_secs(
                env_u64("MYLOCALTON_STARTUP_GRACE_SEC")
                    .map(|v| v.clamp(5, 3600))
                    .unwrap_or(DEFAULT_STARTUP_GRACE_SEC),
            ),
            query_timeout: Duration::from_millis(
                env_u64("MYLOCALTON_QUERY_TIMEOUT_MS")
                    .map(|v| v.clamp(500, 60_000))
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = env_string("MYLOCALTON_HOME") {
        return Some(PathBuf::from(v));
    }
    let key = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env_string(key).map(PathBuf::from)
}

fn java_binary() -> PathBuf {
    if let Some(v) = env_string("MYLOCALTON_JAVA") {
        return PathBuf::from(v);
    }
    if let Some(java_home) = env_string("JAVA_HOME") {
        let name = if cfg!(windows) { "java.exe" } else { "java" };
        let candidate = PathBuf::from(java_home).join("bin").join(name);
        if candidate.is_file() {
            return candidate;
        }
    }
    PathBuf::from("java")
}

pub fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() {
            continue;
        }
        if parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}
