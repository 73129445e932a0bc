//! OS-specific process control, selected once at startup.

use std::{path::Path, sync::Arc};

use tokio::process::Command;

use crate::{error::StopError, launch::LaunchSpec, layout::InstallationLayout};

#[cfg(not(windows))]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
pub use unix::PosixOps;
#[cfg(windows)]
pub use windows::WindowsOps;

#[async_trait::async_trait]
pub trait PlatformOps: Send + Sync + std::fmt::Debug {
    /// Command that starts the launch command detached from the caller: no inherited stdio,
    /// no console window, cwd set to `cwd`.
    fn build_detached_command(&self, spec: &LaunchSpec, cwd: &Path) -> Command;

    /// PIDs of live processes whose command line contains `needle`.
    async fn list_processes_by_command_line_substring(
        &self,
        needle: &str,
    ) -> Result<Vec<u32>, StopError>;

    /// Asks `pid` to shut down gracefully. A pid that is already gone is not an error.
    async fn send_terminate_signal(&self, pid: u32) -> Result<(), StopError>;
}

#[cfg(not(windows))]
pub fn native(_layout: &InstallationLayout) -> Arc<dyn PlatformOps> {
    Arc::new(PosixOps)
}

#[cfg(windows)]
pub fn native(layout: &InstallationLayout) -> Arc<dyn PlatformOps> {
    Arc::new(WindowsOps::new(layout.signal_helper()))
}

/// Parses `ps -ax -o pid= -o command=` output, keeping JVM processes whose
/// command line contains `needle`.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn parse_ps_listing(output: &str, needle: &str, own_pid: u32) -> Vec<u32> {
    let mut out = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let Some((pid, command)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else {
            continue;
        };
        if pid == own_pid || !command.contains(needle) {
            continue;
        }
        if !command.contains("java") {
            continue;
        }
        out.push(pid);
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Parses `wmic ... get Name,ProcessId` output, keeping JVM processes only.
///
/// The query matches its own `wmic.exe` (and the `cmd.exe` launcher), since their
/// command lines contain the needle too; filtering on the image name drops them.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_wmic_listing(output: &str, own_pid: u32) -> Vec<u32> {
    let mut out = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let Some((name, pid)) = line.rsplit_once(char::is_whitespace) else {
            continue;
        };
        let Ok(pid) = pid.trim().parse::<u32>() else {
            continue;
        };
        if pid == 0 || pid == own_pid || !is_jvm_image(name.trim()) {
            continue;
        }
        out.push(pid);
    }
    out.sort_unstable();
    out.dedup();
    out
}

fn is_jvm_image(name: &str) -> bool {
    name.eq_ignore_ascii_case("java.exe") || name.eq_ignore_ascii_case("javaw.exe")
}
