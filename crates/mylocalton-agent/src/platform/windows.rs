use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use super::{PlatformOps, parse_wmic_listing};
use crate::{error::StopError, launch::LaunchSpec};

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Windows: hidden-console `cmd /c javaw ...`, `wmic` discovery, Ctrl+C via helper.
#[derive(Debug, Clone)]
pub struct WindowsOps {
    signal_helper: PathBuf,
}

impl WindowsOps {
    pub fn new(signal_helper: PathBuf) -> Self {
        Self { signal_helper }
    }
}

#[async_trait::async_trait]
impl PlatformOps for WindowsOps {
    fn build_detached_command(&self, spec: &LaunchSpec, cwd: &Path) -> Command {
        // The helper delivers Ctrl+C through the launcher's console, so keep one (hidden).
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/c")
            .arg(&spec.exec)
            .args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW);
        cmd
    }

    async fn list_processes_by_command_line_substring(
        &self,
        needle: &str,
    ) -> Result<Vec<u32>, StopError> {
        let filter = format!("CommandLine like '%{needle}%'");
        let command = format!("wmic process where \"{filter}\" get Name,ProcessId");
        let out = Command::new("wmic")
            .args(["process", "where", filter.as_str(), "get", "Name,ProcessId"])
            .stdin(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .await
            .map_err(|e| StopError::ListProcesses {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(StopError::ListProcesses {
                command,
                message: format!(
                    "exit {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        let text = String::from_utf8_lossy(&out.stdout);
        Ok(parse_wmic_listing(&text, std::process::id()))
    }

    async fn send_terminate_signal(&self, pid: u32) -> Result<(), StopError> {
        if !self.signal_helper.is_file() {
            return Err(StopError::HelperMissing(self.signal_helper.clone()));
        }
        let out = Command::new(&self.signal_helper)
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .await
            .map_err(|e| StopError::Signal {
                pid,
                message: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(StopError::Signal {
                pid,
                message: format!(
                    "{} exited with {}: {}",
                    self.signal_helper.display(),
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        tracing::info!(pid, "sent Ctrl+C");
        Ok(())
    }
}
