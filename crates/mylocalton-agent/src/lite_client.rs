//! Chain-height query through the bundled lite-client.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::process::Command;

const LAST_BLOCK_MARKER: &str = "latest masterchain block known to server is";

/// Source of the latest masterchain seqno. `None` means "no answer this tick".
#[async_trait::async_trait]
pub trait ChainHeight: Send + Sync + std::fmt::Debug {
    async fn latest_seqno(&self) -> Option<u64>;
}

#[derive(Debug, Clone)]
pub struct LiteClientQuery {
    binary: PathBuf,
    global_config: PathBuf,
    timeout: Duration,
}

impl LiteClientQuery {
    pub fn new(binary: PathBuf, global_config: PathBuf, timeout: Duration) -> Self {
        Self {
            binary,
            global_config,
            timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_file() && self.global_config.is_file()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", "0", "--timeout", "3", "-C"])
            .arg(&self.global_config)
            .args(["-c", "last"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.binary.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run_last(&self) -> anyhow::Result<String> {
        let child = self.command().spawn()?;
        let out = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("lite-client timed out after {:?}", self.timeout))??;
        // The client logs the answer on stderr in some builds.
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ChainHeight for LiteClientQuery {
    async fn latest_seqno(&self) -> Option<u64> {
        if !self.is_available() {
            return None;
        }
        match self.run_last().await {
            Ok(text) => {
                let seqno = parse_last_seqno(&text);
                if seqno.is_none() {
                    tracing::debug!(binary = %self.binary.display(), "lite-client gave no block");
                }
                seqno
            }
            Err(err) => {
                tracing::debug!(binary = %self.binary.display(), error = %err, "lite-client query failed");
                None
            }
        }
    }
}

/// Pulls `seqno` out of `... is (wc,shard,seqno):roothash:filehash`.
pub fn parse_last_seqno(output: &str) -> Option<u64> {
    let line = output.lines().find(|l| l.contains(LAST_BLOCK_MARKER))?;
    let rest = &line[line.find(LAST_BLOCK_MARKER)? + LAST_BLOCK_MARKER.len()..];
    let open = rest.find('(')?;
    let close = open + rest[open..].find(')')?;
    let mut parts = rest[open + 1..close].split(',');
    let _wc = parts.next()?;
    let _shard = parts.next()?;
    parts.next()?.trim().parse::<u64>().ok()
}

/// Query rooted at the layout's lite-client and global config.
pub fn query_for(lite_client: &Path, global_config: &Path, timeout: Duration) -> LiteClientQuery {
    LiteClientQuery::new(lite_client.to_path_buf(), global_config.to_path_buf(), timeout)
}
