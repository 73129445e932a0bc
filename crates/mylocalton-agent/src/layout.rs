use std::path::{Path, PathBuf};

use mylocalton_process::{Arch, Network};

use crate::artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        // "darwin" contains "win", so the mac check comes first.
        if lower.contains("mac") || lower.contains("darwin") {
            OsFamily::MacOs
        } else if lower.contains("win") {
            OsFamily::Windows
        } else {
            OsFamily::Linux
        }
    }
}

/// Every path the agent touches, derived from the home directory.
///
/// ```text
/// <home>/myLocalTon.lock
/// <home>/.mylocalton/<artifact>.jar
/// <home>/.mylocalton/myLocalTon/{settings.json,myLocalTon.log,utils/,genesis/}
/// ```
#[derive(Debug, Clone)]
pub struct InstallationLayout {
    home: PathBuf,
    family: OsFamily,
}

impl InstallationLayout {
    pub fn new(home: PathBuf) -> Self {
        Self::for_family(home, OsFamily::current())
    }

    pub fn for_family(home: PathBuf, family: OsFamily) -> Self {
        Self { home, family }
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn root(&self) -> PathBuf {
        self.home.join(".mylocalton")
    }

    /// Blockchain state written by the artifact; wiped by reset.
    pub fn state_dir(&self) -> PathBuf {
        self.root().join("myLocalTon")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.home.join("myLocalTon.lock")
    }

    pub fn lock_file_exists(&self) -> bool {
        self.lock_file().exists()
    }

    pub fn artifact_path(&self, arch: Arch, network: Network) -> PathBuf {
        self.root().join(artifact::artifact_filename(arch, network))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.state_dir().join("settings.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir().join("myLocalTon.log")
    }

    pub fn utils_dir(&self) -> PathBuf {
        self.state_dir().join("utils")
    }

    pub fn signal_helper(&self) -> PathBuf {
        self.utils_dir().join("SendSignalCtrlC64.exe")
    }

    pub fn genesis_bin_dir(&self) -> PathBuf {
        self.state_dir().join("genesis").join("bin")
    }

    pub fn lite_client(&self) -> PathBuf {
        let name = match self.family {
            OsFamily::Windows => "lite-client.exe",
            OsFamily::MacOs | OsFamily::Linux => "lite-client",
        };
        self.genesis_bin_dir().join(name)
    }

    pub fn tonlib(&self) -> PathBuf {
        let name = match self.family {
            OsFamily::Windows => "tonlibjson.dll",
            OsFamily::MacOs => "tonlibjson.dylib",
            OsFamily::Linux => "tonlibjson.so",
        };
        self.genesis_bin_dir().join(name)
    }

    pub fn global_config(&self) -> PathBuf {
        self.state_dir()
            .join("genesis")
            .join("db")
            .join("my-ton-local.config.json")
    }

    /// Installed jars in launch preference order.
    pub fn installed_artifacts(&self) -> Vec<InstalledArtifact> {
        artifact::candidates(Arch::detect())
            .into_iter()
            .map(|(arch, network)| InstalledArtifact {
                arch,
                network,
                path: self.artifact_path(arch, network),
            })
            .filter(|a| a.path.is_file())
            .collect()
    }

    pub fn preferred_artifact(&self) -> Option<InstalledArtifact> {
        self.installed_artifacts().into_iter().next()
    }

    /// Total size in bytes of regular files under the root. Symlinks are not followed.
    pub fn disk_usage(&self) -> u64 {
        dir_size(&self.root())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub arch: Arch,
    pub network: Network,
    pub path: PathBuf,
}

impl InstalledArtifact {
    pub fn filename(&self) -> String {
        artifact::artifact_filename(self.arch, self.network)
    }
}

fn dir_size(root: &Path) -> u64 {
    let rd = match std::fs::read_dir(root) {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let mut total = 0u64;
    for e in rd.flatten() {
        let path = e.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            total = total.saturating_add(dir_size(&path));
        } else if meta.is_file() {
            total = total.saturating_add(meta.len());
        }
    }
    total
}
