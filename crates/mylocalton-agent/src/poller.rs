use std::time::Duration;

use mylocalton_process::NodeStatus;
use tokio::{sync::watch, task::JoinHandle};

use crate::supervisor::Supervisor;

/// Re-evaluates liveness on a fixed interval.
#[derive(Clone)]
pub struct StatePoller {
    supervisor: Supervisor,
    interval: Duration,
}

/// Running poller. Dropping it stops the loop.
pub struct PollerHandle {
    rx: watch::Receiver<NodeStatus>,
    task: JoinHandle<()>,
}

impl StatePoller {
    pub fn new(supervisor: Supervisor, interval: Duration) -> Self {
        Self {
            supervisor,
            interval,
        }
    }

    pub fn spawn(self) -> PollerHandle {
        let rx = self.supervisor.subscribe();
        let task = tokio::spawn(async move {
            loop {
                self.tick().await;
                tokio::time::sleep(self.interval).await;
            }
        });
        PollerHandle { rx, task }
    }

    async fn tick(&self) {
        let status = self.supervisor.refresh().await;
        tracing::trace!(state = ?status.state, label = %status.label(), "poll");
    }
}

impl PollerHandle {
    pub fn receiver(&self) -> watch::Receiver<NodeStatus> {
        self.rx.clone()
    }

    pub fn latest(&self) -> NodeStatus {
        self.rx.borrow().clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Option<NodeStatus> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AgentConfig, layout::InstallationLayout};
    use mylocalton_process::ProcessState;

    #[tokio::test]
    async fn publishes_lock_changes() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallationLayout::new(dir.path().to_path_buf());
        let config = AgentConfig::with_home(dir.path().to_path_buf());
        let supervisor = Supervisor::new(layout.clone(), config);
        assert_eq!(supervisor.status().label(), "not running");

        let mut handle = StatePoller::new(supervisor, Duration::from_millis(20)).spawn();
        std::fs::write(layout.lock_file(), b"").unwrap();

        let mut seen = None;
        for _ in 0..100 {
            let Some(status) = handle.changed().await else {
                break;
            };
            if status.lock_file_present {
                seen = Some(status);
                break;
            }
        }
        let status = seen.unwrap();
        assert_eq!(status.state, ProcessState::Running);
        assert_eq!(status.label(), "running");
        assert_eq!(handle.latest().state, ProcessState::Running);
    }
}
