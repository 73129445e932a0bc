use std::path::Path;

use anyhow::Context;
use mylocalton_process::LaunchConfiguration;

/// Startup defaults persisted by the artifact in its `settings.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupSettings {
    pub enable_ton_http_api: bool,
    pub enable_blockchain_explorer: bool,
    pub enable_data_generator: bool,
}

impl StartupSettings {
    pub fn launch_defaults(&self) -> LaunchConfiguration {
        let mut cfg = LaunchConfiguration::default();
        cfg.http_api = self.enable_ton_http_api;
        cfg.web_explorer = self.enable_blockchain_explorer;
        cfg.data_generator = self.enable_data_generator;
        cfg
    }
}

/// Missing file means all defaults off.
pub fn load_startup_settings(path: &Path) -> anyhow::Result<StartupSettings> {
    let raw = match std::fs::read(path) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "settings file not found");
            return Ok(StartupSettings::default());
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let doc: serde_json::Value =
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))?;

    Ok(StartupSettings {
        enable_ton_http_api: find_bool(&doc, "enableTonHttpApi").unwrap_or(false),
        enable_blockchain_explorer: find_bool(&doc, "enableBlockchainExplorer").unwrap_or(false),
        enable_data_generator: find_bool(&doc, "enableDataGenerator").unwrap_or(false),
    })
}

// Flags may sit at any depth; a direct key wins over nested ones.
fn find_bool(v: &serde_json::Value, key: &str) -> Option<bool> {
    match v {
        serde_json::Value::Object(map) => {
            if let Some(b) = map.get(key).and_then(|x| x.as_bool()) {
                return Some(b);
            }
            map.values().find_map(|child| find_bool(child, key))
        }
        serde_json::Value::Array(items) => items.iter().find_map(|child| find_bool(child, key)),
        _ => None,
    }
}
