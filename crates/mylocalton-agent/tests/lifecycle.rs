#![cfg(unix)]

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use httpmock::prelude::*;
use mylocalton_agent::{
    Arch, LaunchConfiguration, Network, ProcessState,
    config::AgentConfig,
    error::{HousekeepingError, LaunchError, StopError},
    launch::LaunchSpec,
    layout::InstallationLayout,
    platform::PlatformOps,
    supervisor::{StopOutcome, Supervisor},
};
use tokio::process::Command;

const FAKE_PID: u32 = 4242;

/// What the fake process table reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    /// One JVM while the lock file exists.
    FollowsLock,
    /// Never any process, so a lock file is stale.
    Empty,
    /// The listing command itself fails.
    Fails,
}

/// Stands in for the JVM: "launching" creates the lock, SIGTERM removes it.
#[derive(Debug)]
struct FakePlatform {
    lock_file: PathBuf,
    listing: Listing,
    launched: Mutex<Vec<LaunchSpec>>,
    signalled: Mutex<Vec<u32>>,
}

impl FakePlatform {
    fn new(lock_file: PathBuf, listing: Listing) -> Self {
        Self {
            lock_file,
            listing,
            launched: Mutex::new(Vec::new()),
            signalled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl PlatformOps for FakePlatform {
    fn build_detached_command(&self, spec: &LaunchSpec, cwd: &Path) -> Command {
        self.launched.lock().unwrap().push(spec.clone());
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("sleep 0.1; touch \"$1\"")
            .arg("fake-artifact")
            .arg(&self.lock_file)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    async fn list_processes_by_command_line_substring(
        &self,
        needle: &str,
    ) -> Result<Vec<u32>, StopError> {
        match self.listing {
            Listing::Fails => Err(StopError::ListProcesses {
                command: "fake-ps".to_string(),
                message: "not available".to_string(),
            }),
            Listing::Empty => Ok(Vec::new()),
            Listing::FollowsLock => {
                if needle.starts_with("MyLocalTon-") && self.lock_file.exists() {
                    Ok(vec![FAKE_PID])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    async fn send_terminate_signal(&self, pid: u32) -> Result<(), StopError> {
        self.signalled.lock().unwrap().push(pid);
        let _ = std::fs::remove_file(&self.lock_file);
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: InstallationLayout,
    platform: Arc<FakePlatform>,
    supervisor: Supervisor,
}

fn fixture(base_url: Option<String>) -> Fixture {
    fixture_with(base_url, Listing::FollowsLock)
}

fn fixture_with(base_url: Option<String>, listing: Listing) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().to_path_buf();
    let layout = InstallationLayout::new(home.clone());
    let mut config = AgentConfig::with_home(home);
    config.java = PathBuf::from("java");
    config.startup_grace = Duration::from_secs(30);
    if let Some(url) = base_url {
        config.download_base_url = url;
    }
    let platform = Arc::new(FakePlatform::new(layout.lock_file(), listing));
    let supervisor = Supervisor::with_platform(layout.clone(), config, platform.clone(), None);
    Fixture {
        _dir: dir,
        layout,
        platform,
        supervisor,
    }
}

async fn wait_for(supervisor: &Supervisor, want: ProcessState) -> bool {
    for _ in 0..100 {
        if supervisor.refresh().await.state == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn install_fake_jar(layout: &InstallationLayout) -> PathBuf {
    let jar = layout.artifact_path(Arch::detect(), Network::Mainnet);
    std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
    std::fs::write(&jar, b"PK\x03\x04").unwrap();
    jar
}

#[tokio::test]
async fn download_start_run_stop() {
    let server = MockServer::start_async().await;
    let body = vec![1u8; 64 * 1024];
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/MyLocalTon-x86-64.jar");
            then.status(200).body(&body);
        })
        .await;

    let fx = fixture(Some(server.url("/")));
    let mut progress = Vec::new();
    let jar = fx
        .supervisor
        .download(Arch::X86_64, Network::Mainnet, |p| progress.push(p))
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(jar, fx.layout.artifact_path(Arch::X86_64, Network::Mainnet));
    assert_eq!(std::fs::read(&jar).unwrap().len(), body.len());
    assert_eq!(progress.last().copied(), Some(100));

    let mut launch = LaunchConfiguration::default().with_validators(2).unwrap();
    launch.no_gui = true;
    let handle = fx.supervisor.start(&jar, &launch).await.unwrap();
    assert_eq!(handle.artifact_filename, "MyLocalTon-x86-64.jar");
    assert!(handle.command.ends_with(&["nogui".to_string(), "with-validators-2".to_string()]));
    assert_eq!(fx.supervisor.status().state, ProcessState::Starting);

    let launched = fx.platform.launched.lock().unwrap().clone();
    assert_eq!(launched.len(), 1);
    assert_eq!(
        launched[0].args,
        vec![
            "-jar".to_string(),
            jar.display().to_string(),
            "nogui".to_string(),
            "with-validators-2".to_string(),
        ]
    );

    assert!(wait_for(&fx.supervisor, ProcessState::Running).await);
    assert_eq!(fx.supervisor.status().label(), "running");

    let err = fx.supervisor.start(&jar, &launch).await.unwrap_err();
    assert!(matches!(err, LaunchError::AlreadyRunning { .. }));

    let outcome = fx.supervisor.stop().await.unwrap();
    assert_eq!(outcome, StopOutcome::Signalled { pids: vec![FAKE_PID] });
    assert_eq!(*fx.platform.signalled.lock().unwrap(), vec![FAKE_PID]);
    assert!(fx.supervisor.handle().await.is_none());

    assert!(wait_for(&fx.supervisor, ProcessState::Stopped).await);
    assert_eq!(fx.supervisor.status().label(), "not running");
}

#[tokio::test]
async fn stop_without_process_is_a_no_op() {
    let fx = fixture(None);
    install_fake_jar(&fx.layout);

    let outcome = fx.supervisor.stop().await.unwrap();
    assert_eq!(outcome, StopOutcome::NotRunning);
    assert!(fx.platform.signalled.lock().unwrap().is_empty());
    assert_eq!(fx.supervisor.status().state, ProcessState::Stopped);
}

#[tokio::test]
async fn start_requires_the_artifact() {
    let fx = fixture(None);
    let err = fx
        .supervisor
        .start_installed(&LaunchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::ArtifactMissing(_)));
    assert!(fx.platform.launched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn existing_lock_blocks_start() {
    let fx = fixture(None);
    let jar = install_fake_jar(&fx.layout);
    std::fs::write(fx.layout.lock_file(), b"").unwrap();

    let err = fx
        .supervisor
        .start(&jar, &LaunchConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::AlreadyRunning { .. }));
}

#[tokio::test]
async fn reset_keeps_artifact_and_delete_keeps_root() {
    let fx = fixture(None);
    let jar = install_fake_jar(&fx.layout);
    let db = fx.layout.state_dir().join("genesis").join("db");
    std::fs::create_dir_all(&db).unwrap();
    std::fs::write(db.join("my-ton-local.config.json"), b"{}").unwrap();
    std::fs::write(fx.layout.settings_file(), b"{}").unwrap();

    fx.supervisor.reset().await.unwrap();
    assert!(jar.is_file());
    assert!(fx.layout.state_dir().is_dir());
    assert_eq!(std::fs::read_dir(fx.layout.state_dir()).unwrap().count(), 0);
    assert!(!fx.layout.lock_file().exists());

    fx.supervisor.delete().await.unwrap();
    assert!(fx.layout.root().is_dir());
    assert_eq!(std::fs::read_dir(fx.layout.root()).unwrap().count(), 0);
    assert!(fx.layout.installed_artifacts().is_empty());
}

#[tokio::test]
async fn housekeeping_refuses_while_running() {
    let fx = fixture(None);
    let jar = install_fake_jar(&fx.layout);
    fx.supervisor
        .start(&jar, &LaunchConfiguration::default())
        .await
        .unwrap();

    let err = fx.supervisor.reset().await.unwrap_err();
    assert!(matches!(err, HousekeepingError::StillRunning { .. }));
    assert!(wait_for(&fx.supervisor, ProcessState::Running).await);

    let err = fx.supervisor.delete().await.unwrap_err();
    assert!(matches!(err, HousekeepingError::StillRunning { .. }));
    assert!(jar.is_file());

    fx.supervisor.stop().await.unwrap();
    assert!(wait_for(&fx.supervisor, ProcessState::Stopped).await);
    fx.supervisor.delete().await.unwrap();
    assert!(!jar.exists());
}

fn seed_state(layout: &InstallationLayout) -> PathBuf {
    let db = layout.state_dir().join("genesis").join("db");
    std::fs::create_dir_all(&db).unwrap();
    let cfg = db.join("my-ton-local.config.json");
    std::fs::write(&cfg, b"{}").unwrap();
    cfg
}

#[tokio::test]
async fn reset_and_delete_remove_a_stale_lock() {
    let fx = fixture_with(None, Listing::Empty);
    let jar = install_fake_jar(&fx.layout);
    seed_state(&fx.layout);
    std::fs::write(fx.layout.lock_file(), b"").unwrap();
    assert_eq!(fx.supervisor.refresh().await.state, ProcessState::Running);

    fx.supervisor.reset().await.unwrap();
    assert!(!fx.layout.lock_file().exists());
    assert!(fx.layout.state_dir().is_dir());
    assert_eq!(std::fs::read_dir(fx.layout.state_dir()).unwrap().count(), 0);
    assert!(jar.is_file());
    assert_eq!(fx.supervisor.status().state, ProcessState::Stopped);

    std::fs::write(fx.layout.lock_file(), b"").unwrap();
    fx.supervisor.delete().await.unwrap();
    assert!(!fx.layout.lock_file().exists());
    assert!(fx.layout.root().is_dir());
    assert_eq!(std::fs::read_dir(fx.layout.root()).unwrap().count(), 0);
}

#[tokio::test]
async fn housekeeping_refuses_when_listing_fails_and_lock_is_present() {
    let fx = fixture_with(None, Listing::Fails);
    let jar = install_fake_jar(&fx.layout);
    let state_file = seed_state(&fx.layout);
    std::fs::write(fx.layout.lock_file(), b"").unwrap();
    assert_eq!(fx.supervisor.refresh().await.state, ProcessState::Running);

    let err = fx.supervisor.reset().await.unwrap_err();
    assert!(matches!(err, HousekeepingError::StillRunning { .. }));
    let err = fx.supervisor.delete().await.unwrap_err();
    assert!(matches!(err, HousekeepingError::StillRunning { .. }));
    assert!(state_file.is_file());
    assert!(jar.is_file());
    assert!(fx.layout.lock_file().exists());

    // Without a lock there is nothing that could be alive.
    std::fs::remove_file(fx.layout.lock_file()).unwrap();
    fx.supervisor.reset().await.unwrap();
    assert!(!state_file.exists());
    assert!(jar.is_file());
}
