//! Value types shared between the agent and whatever host drives it.

use std::fmt;

/// Host CPU family the artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Arch {
    #[serde(rename = "x86-64")]
    X86_64,
    Arm64,
}

impl Arch {
    /// Anything that does not look like ARM is treated as x86-64.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        if lower.contains("arm") || lower.contains("aarch") {
            Arch::Arm64
        } else {
            Arch::X86_64
        }
    }

    pub fn detect() -> Self {
        Self::from_name(std::env::consts::ARCH)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86-64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn from_testnet_flag(testnet: bool) -> Self {
        if testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MAX_VALIDATORS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validator count must be between 0 and {} (got {})", MAX_VALIDATORS, .0)]
pub struct InvalidValidatorCount(pub u8);

/// Startup options for one launch of the artifact.
///
/// Each enabled option turns into exactly one command-line token; see
/// [`LaunchConfiguration::tokens`] for the emitted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LaunchConfiguration {
    pub http_api: bool,
    pub web_explorer: bool,
    pub data_generator: bool,
    pub no_gui: bool,
    pub debug: bool,
    validator_count: u8,
}

impl LaunchConfiguration {
    pub fn validator_count(&self) -> u8 {
        self.validator_count
    }

    pub fn set_validator_count(&mut self, count: u8) -> Result<(), InvalidValidatorCount> {
        if count > MAX_VALIDATORS {
            return Err(InvalidValidatorCount(count));
        }
        self.validator_count = count;
        Ok(())
    }

    pub fn with_validators(mut self, count: u8) -> Result<Self, InvalidValidatorCount> {
        self.set_validator_count(count)?;
        Ok(self)
    }

    pub fn tokens(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.http_api {
            out.push("ton-http-api".to_string());
        }
        if self.web_explorer {
            out.push("explorer".to_string());
        }
        if self.data_generator {
            out.push("data-generator".to_string());
        }
        if self.no_gui {
            out.push("nogui".to_string());
        }
        if self.debug {
            out.push("debug".to_string());
        }
        if self.validator_count > 0 {
            out.push(format!("with-validators-{}", self.validator_count));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ProcessState {
    pub fn is_active(self) -> bool {
        !matches!(self, ProcessState::Stopped)
    }
}

/// Snapshot published by the poller after each tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeStatus {
    pub state: ProcessState,
    pub lock_file_present: bool,
    pub last_seqno: Option<u64>,
    pub pid: Option<u32>,
    pub message: Option<String>,
}

impl NodeStatus {
    /// Short text for a status line: `Block: <seqno>`, `running` or `not running`.
    pub fn label(&self) -> String {
        if let Some(seqno) = self.last_seqno {
            return format!("Block: {seqno}");
        }
        if self.lock_file_present {
            "running".to_string()
        } else {
            "not running".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_defaults_to_x86_64() {
        assert_eq!(Arch::from_name("amd64"), Arch::X86_64);
        assert_eq!(Arch::from_name("x86_64"), Arch::X86_64);
        assert_eq!(Arch::from_name("riscv64"), Arch::X86_64);
        assert_eq!(Arch::from_name("aarch64"), Arch::Arm64);
        assert_eq!(Arch::from_name("ARMv7"), Arch::Arm64);
    }

    #[test]
    fn empty_configuration_emits_no_tokens() {
        assert!(LaunchConfiguration::default().tokens().is_empty());
    }

    #[test]
    fn tokens_follow_canonical_order() {
        let cfg = LaunchConfiguration {
            http_api: true,
            web_explorer: true,
            data_generator: true,
            no_gui: true,
            debug: true,
            ..Default::default()
        }
        .with_validators(4)
        .unwrap();
        assert_eq!(
            cfg.tokens(),
            vec![
                "ton-http-api",
                "explorer",
                "data-generator",
                "nogui",
                "debug",
                "with-validators-4"
            ]
        );
    }

    #[test]
    fn validator_token_emitted_once() {
        let cfg = LaunchConfiguration::default().with_validators(3).unwrap();
        let tokens = cfg.tokens();
        assert_eq!(
            tokens.iter().filter(|t| *t == "with-validators-3").count(),
            1
        );
        assert!(
            !LaunchConfiguration::default()
                .tokens()
                .iter()
                .any(|t| t.starts_with("with-validators-"))
        );
    }

    #[test]
    fn validator_count_is_bounded() {
        let err = LaunchConfiguration::default().with_validators(6).unwrap_err();
        assert_eq!(err, InvalidValidatorCount(6));
        assert!(err.to_string().contains("between 0 and 5"));
    }

    #[test]
    fn label_prefers_seqno() {
        let mut status = NodeStatus::default();
        assert_eq!(status.label(), "not running");
        status.lock_file_present = true;
        assert_eq!(status.label(), "running");
        status.last_seqno = Some(1234);
        assert_eq!(status.label(), "Block: 1234");
    }
}
