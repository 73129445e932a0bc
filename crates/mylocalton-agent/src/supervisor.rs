use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use mylocalton_process::{Arch, LaunchConfiguration, Network, NodeStatus, ProcessState};
use tokio::{
    sync::{Mutex, watch},
    time::Instant,
};

use crate::{
    artifact,
    config::AgentConfig,
    download,
    error::{DownloadError, HousekeepingError, LaunchError, StopError, VersionError},
    housekeeping::{self, CleanReport},
    launch,
    layout::InstallationLayout,
    lite_client::{self, ChainHeight},
    platform::{self, PlatformOps},
    version,
};

const NOTICE_TTL: Duration = Duration::from_secs(3);
pub const STARTING_NOTICE: &str = "Starting...";
pub const STOPPING_NOTICE: &str = "Stopping...";

/// The one child launched by this supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Pid of the launcher (`sh` / `cmd.exe`), not necessarily the JVM.
    pub pid: Option<u32>,
    pub jar_path: PathBuf,
    /// Needle for process discovery on stop.
    pub artifact_filename: String,
    pub command: Vec<String>,
    pub started_at_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Signalled { pids: Vec<u32> },
    NotRunning,
}

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    expires_at: Instant,
}

/// Mutable lifecycle state, touched only by start, stop and poll.
#[derive(Debug, Default)]
pub struct SupervisorState {
    phase: ProcessState,
    phase_since: Option<Instant>,
    handle: Option<ProcessHandle>,
    notice: Option<Notice>,
    last_seqno: Option<u64>,
}

impl SupervisorState {
    pub fn phase(&self) -> ProcessState {
        self.phase
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// Notice text, if it has not expired at `now`.
    pub fn notice(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| now < n.expires_at)
            .map(|n| n.text.as_str())
    }

    fn set_phase(&mut self, phase: ProcessState, now: Instant) {
        if self.phase != phase {
            tracing::info!(from = ?self.phase, to = ?phase, "state change");
            self.phase = phase;
            self.phase_since = Some(now);
        }
    }

    fn set_notice(&mut self, text: &str, now: Instant) {
        self.notice = Some(Notice {
            text: text.to_string(),
            expires_at: now + NOTICE_TTL,
        });
    }

    fn begin_start(&mut self, handle: ProcessHandle, now: Instant) {
        self.handle = Some(handle);
        self.last_seqno = None;
        self.set_phase(ProcessState::Starting, now);
        self.set_notice(STARTING_NOTICE, now);
    }

    fn begin_stop(&mut self, now: Instant) {
        self.handle = None;
        self.set_phase(ProcessState::Stopping, now);
        self.set_notice(STOPPING_NOTICE, now);
    }

    fn mark_stopped(&mut self, now: Instant) {
        self.handle = None;
        self.last_seqno = None;
        self.set_phase(ProcessState::Stopped, now);
    }

    /// Applies one liveness observation.
    ///
    /// `Starting` waits up to `grace` for the lock. `Stopping` waits for the lock to
    /// vanish and falls back to `Running` if it is still there after `grace`.
    pub fn observe(&mut self, lock_present: bool, now: Instant, grace: Duration) -> ProcessState {
        let elapsed = self
            .phase_since
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();

        match (self.phase, lock_present) {
            (ProcessState::Stopped, true) => self.set_phase(ProcessState::Running, now),
            (ProcessState::Stopped, false) => {}
            (ProcessState::Starting, true) => self.set_phase(ProcessState::Running, now),
            (ProcessState::Starting, false) => {
                if elapsed >= grace {
                    tracing::warn!(grace_sec = grace.as_secs(), "lock file never appeared");
                    self.mark_stopped(now);
                }
            }
            (ProcessState::Running, true) => {}
            (ProcessState::Running, false) => self.mark_stopped(now),
            (ProcessState::Stopping, true) => {
                if elapsed >= grace {
                    tracing::warn!(grace_sec = grace.as_secs(), "still running after stop request");
                    self.set_phase(ProcessState::Running, now);
                }
            }
            (ProcessState::Stopping, false) => self.mark_stopped(now),
        }
        if !lock_present {
            self.last_seqno = None;
        }
        self.phase
    }

    pub fn snapshot(&self, lock_present: bool, now: Instant) -> NodeStatus {
        NodeStatus {
            state: self.phase,
            lock_file_present: lock_present,
            last_seqno: if lock_present { self.last_seqno } else { None },
            pid: self.handle.as_ref().and_then(|h| h.pid),
            message: self.notice(now).map(str::to_string),
        }
    }
}

#[derive(Debug)]
struct Inner {
    layout: InstallationLayout,
    config: AgentConfig,
    platform: Arc<dyn PlatformOps>,
    chain: Option<Arc<dyn ChainHeight>>,
    state: Mutex<SupervisorState>,
    status_tx: watch::Sender<NodeStatus>,
}

/// Owns the lifecycle of the artifact under one installation root.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Native platform, lite-client query from the layout.
    pub fn new(layout: InstallationLayout, config: AgentConfig) -> Self {
        let platform = platform::native(&layout);
        let chain: Arc<dyn ChainHeight> = Arc::new(lite_client::query_for(
            &layout.lite_client(),
            &layout.global_config(),
            config.query_timeout,
        ));
        Self::with_platform(layout, config, platform, Some(chain))
    }

    pub fn with_platform(
        layout: InstallationLayout,
        config: AgentConfig,
        platform: Arc<dyn PlatformOps>,
        chain: Option<Arc<dyn ChainHeight>>,
    ) -> Self {
        let now = Instant::now();
        let lock_present = layout.lock_file_exists();
        let mut state = SupervisorState::default();
        state.observe(lock_present, now, config.startup_grace);
        let (status_tx, _) = watch::channel(state.snapshot(lock_present, now));

        Self {
            inner: Arc::new(Inner {
                layout,
                config,
                platform,
                chain,
                state: Mutex::new(state),
                status_tx,
            }),
        }
    }

    pub fn layout(&self) -> &InstallationLayout {
        &self.inner.layout
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Last published snapshot.
    pub fn status(&self) -> NodeStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub async fn handle(&self) -> Option<ProcessHandle> {
        self.inner.state.lock().await.handle().cloned()
    }

    /// Downloads the artifact for (`arch`, `network`) into the installation root.
    pub async fn download<F>(
        &self,
        arch: Arch,
        network: Network,
        on_progress: F,
    ) -> Result<PathBuf, DownloadError>
    where
        F: FnMut(u8) + Send,
    {
        let desc = artifact::resolve_artifact_with_base(&self.inner.config.download_base_url, arch, network);
        let dest = self.inner.layout.artifact_path(arch, network);
        download::download(&desc.url, &dest, on_progress).await?;
        Ok(dest)
    }

    pub async fn start(
        &self,
        jar: &Path,
        config: &LaunchConfiguration,
    ) -> Result<ProcessHandle, LaunchError> {
        let layout = &self.inner.layout;
        let mut state = self.inner.state.lock().await;

        if state.handle().is_some() || layout.lock_file_exists() {
            return Err(LaunchError::AlreadyRunning {
                lock_file: layout.lock_file(),
            });
        }
        if !jar.is_file() {
            return Err(LaunchError::ArtifactMissing(jar.to_path_buf()));
        }

        let spec = launch::resolve_launch_spec(&self.inner.config.java, jar, config, layout.family());
        let command_line = spec.display();
        let root = layout.root();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| LaunchError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        tracing::info!(jar = %jar.display(), command = %command_line, "starting artifact");
        let mut child = self
            .inner
            .platform
            .build_detached_command(&spec, &root)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: command_line.clone(),
                source,
            })?;
        let pid = child.id();
        tokio::spawn(async move {
            // Reap the launcher; the artifact outlives it.
            match child.wait().await {
                Ok(status) => tracing::debug!(?pid, %status, "launcher exited"),
                Err(err) => tracing::debug!(?pid, error = %err, "launcher wait failed"),
            }
        });

        let mut command = vec![spec.exec.display().to_string()];
        command.extend(spec.args.iter().cloned());
        let handle = ProcessHandle {
            pid,
            jar_path: jar.to_path_buf(),
            artifact_filename: jar
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            command,
            started_at_unix_ms: unix_ms(),
        };

        let now = Instant::now();
        state.begin_start(handle.clone(), now);
        self.inner
            .status_tx
            .send_replace(state.snapshot(layout.lock_file_exists(), now));
        Ok(handle)
    }

    /// Starts the preferred installed artifact.
    pub async fn start_installed(
        &self,
        config: &LaunchConfiguration,
    ) -> Result<ProcessHandle, LaunchError> {
        let layout = &self.inner.layout;
        let Some(installed) = layout.preferred_artifact() else {
            return Err(LaunchError::ArtifactMissing(
                layout.artifact_path(Arch::detect(), Network::Mainnet),
            ));
        };
        self.start(&installed.path, config).await
    }

    /// Gracefully signals every artifact process; the poller observes the exit.
    pub async fn stop(&self) -> Result<StopOutcome, StopError> {
        let mut state = self.inner.state.lock().await;
        let needles = self.discovery_needles(state.handle());
        let pids = self.find_artifact_processes(&needles).await?;

        let now = Instant::now();
        if pids.is_empty() {
            tracing::info!("stop requested but no artifact process found");
            state.mark_stopped(now);
            self.inner
                .status_tx
                .send_replace(state.snapshot(self.inner.layout.lock_file_exists(), now));
            return Ok(StopOutcome::NotRunning);
        }

        let mut signalled = Vec::new();
        let mut first_err = None;
        for pid in pids {
            match self.inner.platform.send_terminate_signal(pid).await {
                Ok(()) => signalled.push(pid),
                Err(err) => {
                    tracing::warn!(pid, error = %err, "stop signal failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        if signalled.is_empty()
            && let Some(err) = first_err
        {
            return Err(err);
        }

        state.begin_stop(now);
        self.inner
            .status_tx
            .send_replace(state.snapshot(self.inner.layout.lock_file_exists(), now));
        Ok(StopOutcome::Signalled { pids: signalled })
    }

    /// One poll tick: re-derives liveness and publishes a snapshot.
    pub async fn refresh(&self) -> NodeStatus {
        let layout = &self.inner.layout;
        let lock_present = layout.lock_file_exists();
        let seqno = match (&self.inner.chain, lock_present) {
            (Some(chain), true) => chain.latest_seqno().await,
            _ => None,
        };

        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        // The lock may have changed while the query ran.
        let lock_present = layout.lock_file_exists();
        state.observe(lock_present, now, self.inner.config.startup_grace);
        if lock_present && seqno.is_some() {
            state.last_seqno = seqno;
        }
        let status = state.snapshot(lock_present, now);
        self.inner.status_tx.send_replace(status.clone());
        status
    }

    /// Wipes blockchain state; the jar stays.
    pub async fn reset(&self) -> Result<CleanReport, HousekeepingError> {
        let state = self.inner.state.lock().await;
        self.ensure_stopped(&state).await?;
        let report = housekeeping::clean_directory(&self.inner.layout.state_dir()).await?;
        housekeeping::remove_if_exists(&self.inner.layout.lock_file()).await?;
        drop(state);

        tracing::info!(removed = report.removed.len(), "installation reset");
        self.refresh().await;
        Ok(report)
    }

    /// Wipes the whole installation root, keeping the directory itself.
    pub async fn delete(&self) -> Result<CleanReport, HousekeepingError> {
        let state = self.inner.state.lock().await;
        self.ensure_stopped(&state).await?;
        let report = housekeeping::clean_directory(&self.inner.layout.root()).await?;
        housekeeping::remove_if_exists(&self.inner.layout.lock_file()).await?;
        drop(state);

        tracing::info!(removed = report.removed.len(), "installation deleted");
        self.refresh().await;
        Ok(report)
    }

    /// Version string of `jar`, or of the preferred installed artifact.
    pub async fn version(&self, jar: Option<&Path>) -> Result<String, VersionError> {
        let layout = &self.inner.layout;
        let jar = match jar {
            Some(p) => p.to_path_buf(),
            None => layout
                .preferred_artifact()
                .map(|a| a.path)
                .ok_or_else(|| {
                    VersionError::ArtifactMissing(layout.artifact_path(Arch::detect(), Network::Mainnet))
                })?,
        };
        version::query_version(&self.inner.config.java, &jar, self.inner.config.query_timeout).await
    }

    fn discovery_needles(&self, handle: Option<&ProcessHandle>) -> Vec<String> {
        if let Some(h) = handle
            && !h.artifact_filename.is_empty()
        {
            return vec![h.artifact_filename.clone()];
        }
        let installed: Vec<String> = self
            .inner
            .layout
            .installed_artifacts()
            .iter()
            .map(|a| a.filename())
            .collect();
        if !installed.is_empty() {
            return installed;
        }
        artifact::candidates(Arch::detect())
            .into_iter()
            .map(|(arch, network)| artifact::artifact_filename(arch, network))
            .collect()
    }

    async fn find_artifact_processes(&self, needles: &[String]) -> Result<Vec<u32>, StopError> {
        let mut pids = Vec::new();
        for needle in needles {
            pids.extend(
                self.inner
                    .platform
                    .list_processes_by_command_line_substring(needle)
                    .await?,
            );
        }
        pids.sort_unstable();
        pids.dedup();
        Ok(pids)
    }

    async fn ensure_stopped(&self, state: &SupervisorState) -> Result<(), HousekeepingError> {
        if let Some(h) = state.handle() {
            return Err(HousekeepingError::StillRunning {
                reason: format!("started from {}", h.jar_path.display()),
            });
        }
        let needles = self.discovery_needles(None);
        match self.find_artifact_processes(&needles).await {
            Ok(pids) if !pids.is_empty() => Err(HousekeepingError::StillRunning {
                reason: format!("artifact process(es) {pids:?} alive"),
            }),
            Ok(_) => Ok(()),
            // Without a process list a present lock cannot be told apart from a live node.
            Err(err) if self.inner.layout.lock_file_exists() => {
                tracing::warn!(error = %err, "cannot list processes and lock file is present");
                Err(HousekeepingError::StillRunning {
                    reason: format!("lock file present and process listing failed: {err}"),
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot list processes; no lock file, proceeding");
                Ok(())
            }
        }
    }
}

fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
