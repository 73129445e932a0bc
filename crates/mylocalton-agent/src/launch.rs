use std::path::{Path, PathBuf};

use mylocalton_process::LaunchConfiguration;

use crate::layout::OsFamily;

/// Resolved interpreter + arguments, before any platform wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub exec: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Space-joined form, used for logs and error messages.
    pub fn display(&self) -> String {
        let mut out = self.exec.display().to_string();
        for a in &self.args {
            out.push(' ');
            out.push_str(a);
        }
        out
    }
}

/// `java` → `javaw`, `java.exe` → `javaw.exe`; anything else is left alone.
pub fn windowless_interpreter(java: &Path) -> PathBuf {
    let Some(stem) = java.file_stem().and_then(|s| s.to_str()) else {
        return java.to_path_buf();
    };
    if !stem.eq_ignore_ascii_case("java") {
        return java.to_path_buf();
    }
    let name = match java.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("javaw.{ext}"),
        None => "javaw".to_string(),
    };
    java.with_file_name(name)
}

pub fn resolve_launch_spec(
    java: &Path,
    jar: &Path,
    config: &LaunchConfiguration,
    family: OsFamily,
) -> LaunchSpec {
    let exec = match family {
        OsFamily::Windows => windowless_interpreter(java),
        OsFamily::MacOs | OsFamily::Linux => java.to_path_buf(),
    };
    let mut args = vec!["-jar".to_string(), jar.display().to_string()];
    args.extend(config.tokens());
    LaunchSpec { exec, args }
}

/// Single-quotes `s` for `sh -c`.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// `sh -c` script that starts the command in the background.
pub fn background_shell_script(spec: &LaunchSpec) -> String {
    let mut parts = vec![shell_quote(&spec.exec.display().to_string())];
    parts.extend(spec.args.iter().map(|a| shell_quote(a)));
    format!("{} &", parts.join(" "))
}
