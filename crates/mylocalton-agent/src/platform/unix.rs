use std::{path::Path, process::Stdio};

use tokio::process::Command;

use super::{PlatformOps, parse_ps_listing};
use crate::{
    error::StopError,
    launch::{LaunchSpec, background_shell_script},
};

/// macOS and Linux: `sh -c '<cmd> &'` in a fresh session, `ps` discovery, SIGTERM.
#[derive(Debug, Default, Clone)]
pub struct PosixOps;

#[async_trait::async_trait]
impl PlatformOps for PosixOps {
    fn build_detached_command(&self, spec: &LaunchSpec, cwd: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(background_shell_script(spec))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        cmd
    }

    async fn list_processes_by_command_line_substring(
        &self,
        needle: &str,
    ) -> Result<Vec<u32>, StopError> {
        let command = "ps -ax -o pid= -o command=";
        let out = Command::new("ps")
            .args(["-ax", "-o", "pid=", "-o", "command="])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| StopError::ListProcesses {
                command: command.to_string(),
                message: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(StopError::ListProcesses {
                command: command.to_string(),
                message: format!(
                    "exit {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        let text = String::from_utf8_lossy(&out.stdout);
        Ok(parse_ps_listing(&text, needle, std::process::id()))
    }

    async fn send_terminate_signal(&self, pid: u32) -> Result<(), StopError> {
        // kill(0) / kill(-1) would signal whole groups.
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return Err(StopError::Signal {
                pid,
                message: "pid out of range".to_string(),
            });
        };
        if raw <= 0 {
            return Err(StopError::Signal {
                pid,
                message: "refusing to signal a process group".to_string(),
            });
        }

        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                tracing::debug!(pid, "process already gone");
                return Ok(());
            }
            return Err(StopError::Signal {
                pid,
                message: err.to_string(),
            });
        }
        tracing::info!(pid, "sent SIGTERM");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_group_signals() {
        let err = PosixOps.send_terminate_signal(0).await.unwrap_err();
        assert!(matches!(err, StopError::Signal { pid: 0, .. }));
    }

    #[tokio::test]
    async fn terminate_of_missing_pid_is_ok() {
        // Spawn and reap a short-lived child so its pid is known to be free.
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();
        PosixOps.send_terminate_signal(pid).await.unwrap();
    }

    #[tokio::test]
    async fn listing_finds_nothing_for_unknown_artifact() {
        let pids = PosixOps
            .list_processes_by_command_line_substring("MyLocalTon-does-not-exist.jar")
            .await
            .unwrap();
        assert!(pids.is_empty());
    }

    #[tokio::test]
    async fn detached_command_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            exec: "touch".into(),
            args: vec!["started.marker".to_string()],
        };
        let status = PosixOps
            .build_detached_command(&spec, dir.path())
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let marker = dir.path().join("started.marker");
        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(marker.exists());
    }
}
