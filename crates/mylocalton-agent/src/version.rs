use std::{path::Path, process::Stdio, time::Duration};

use tokio::process::Command;

use crate::error::VersionError;

/// Runs `<java> -jar <jar> version` and returns the trimmed stdout.
///
/// Empty output means the runtime could not load the jar (missing or too old).
pub async fn query_version(java: &Path, jar: &Path, timeout: Duration) -> Result<String, VersionError> {
    if !jar.is_file() {
        return Err(VersionError::ArtifactMissing(jar.to_path_buf()));
    }
    let command = format!("{} -jar {} version", java.display(), jar.display());

    let mut cmd = Command::new(java);
    cmd.arg("-jar")
        .arg(jar)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = jar.parent() {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|source| VersionError::Spawn {
        command: command.clone(),
        source,
    })?;
    let out = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(out)) => out,
        Ok(Err(source)) => return Err(VersionError::Spawn { command, source }),
        Err(_) => {
            return Err(VersionError::Timeout {
                command,
                timeout_ms: timeout.as_millis(),
            });
        }
    };

    let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if version.is_empty() {
        return Err(VersionError::Empty { command });
    }
    tracing::debug!(jar = %jar.display(), %version, "artifact version");
    Ok(version)
}
