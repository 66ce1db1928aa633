//! Shell selection for analyzer command lines.
//!
//! Analyzer commands are literal shell strings (`stylelint **.scss --formatter json`),
//! so they are always handed to a shell rather than split into argv.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

/// Shell override from configuration.
///
/// ```toml
/// [shell]
/// binary = "bash"
/// args = ["-c"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
    /// Override shell binary (e.g. "bash", "cmd.exe", "/usr/local/bin/fish").
    pub binary: Option<String>,
    /// Override shell args placed before the command (e.g. `["-c"]` or `["/C"]`).
    pub args: Option<Vec<String>>,
}

/// The shell used to launch analyzer command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    binary: PathBuf,
    args: Vec<String>,
}

impl Shell {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    /// Config override first, then the platform default.
    #[must_use]
    pub fn detect(config: Option<&ShellConfig>) -> Self {
        if let Some(cfg) = config
            && let Some(binary) = &cfg.binary
        {
            let args = cfg.args.clone().unwrap_or_else(|| default_args_for(binary));
            return Self::new(binary, args);
        }
        platform_shell()
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build a command that runs `command_line` through this shell.
    #[must_use]
    pub fn command(&self, command_line: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args).arg(command_line);
        cmd
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Infer the "run this string" flag for a shell binary.
fn default_args_for(binary: &str) -> Vec<String> {
    let name = Path::new(binary)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(binary)
        .to_lowercase();

    match name.as_str() {
        "cmd" => vec!["/C".to_string()],
        "pwsh" | "powershell" => vec!["-NoProfile".to_string(), "-Command".to_string()],
        _ => vec!["-c".to_string()],
    }
}

#[cfg(windows)]
fn platform_shell() -> Shell {
    let comspec = std::env::var("ComSpec")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(r"C:\Windows\System32\cmd.exe"));
    Shell::new(comspec, vec!["/C".to_string()])
}

#[cfg(not(windows))]
fn platform_shell() -> Shell {
    let binary = which::which("sh").unwrap_or_else(|_| PathBuf::from("/bin/sh"));
    Shell::new(binary, vec!["-c".to_string()])
}

#[cfg(test)]
mod tests {
    use super::{PathBuf, Shell, ShellConfig, default_args_for};

    #[test]
    fn default_args_by_shell_name() {
        assert_eq!(default_args_for("cmd"), vec!["/C"]);
        assert_eq!(default_args_for("cmd.exe"), vec!["/C"]);
        assert_eq!(default_args_for("pwsh"), vec!["-NoProfile", "-Command"]);
        assert_eq!(default_args_for("/bin/bash"), vec!["-c"]);
        assert_eq!(default_args_for("zsh"), vec!["-c"]);
    }

    #[test]
    fn config_override_wins() {
        let config = ShellConfig {
            binary: Some("fish".to_string()),
            args: Some(vec!["-c".to_string()]),
        };
        let shell = Shell::detect(Some(&config));
        assert_eq!(shell.binary(), PathBuf::from("fish"));
        assert_eq!(shell.args(), ["-c"]);
    }

    #[test]
    fn config_override_infers_args() {
        let config = ShellConfig {
            binary: Some("pwsh".to_string()),
            args: None,
        };
        let shell = Shell::detect(Some(&config));
        assert_eq!(shell.args(), ["-NoProfile", "-Command"]);
    }

    #[test]
    fn config_without_binary_falls_back_to_platform() {
        let shell = Shell::detect(Some(&ShellConfig::default()));
        assert!(!shell.binary().as_os_str().is_empty());
        assert!(!shell.args().is_empty());
    }

    #[test]
    fn display_joins_binary_and_args() {
        let shell = Shell::new("/bin/sh", vec!["-c".to_string()]);
        assert_eq!(shell.to_string(), "/bin/sh -c");
    }
}
