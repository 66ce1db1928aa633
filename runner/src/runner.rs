//! Single-use process runner.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::env::{apply_sanitized_env, default_denylist};
use crate::process::ChildGuard;
use crate::shell::Shell;

/// Errors from launching or waiting on an analyzer process.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to launch `{command}` in {}: {source}", working_dir.display())]
    Launch {
        command: String,
        working_dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while waiting on `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` timed out after {}ms", elapsed.as_millis())]
    TimedOut { command: String, elapsed: Duration },
}

/// Captured result of a completed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launch settings shared by every runner spawned from the same configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub shell: Shell,
    /// Upper bound on the wait; the process group is killed when it expires.
    pub timeout: Option<Duration>,
    pub env_denylist: Vec<String>,
}

impl RunnerSettings {
    #[must_use]
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            timeout: None,
            env_denylist: default_denylist(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner {
            settings: self.clone(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::new(Shell::detect(None))
    }
}

/// Runs one external command and captures its output.
///
/// Single-use: `execute` consumes the runner. Concurrent invocations each get
/// their own runner from [`RunnerSettings::runner`].
#[derive(Debug)]
pub struct ProcessRunner {
    settings: RunnerSettings,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Run `command_line` through the configured shell in `working_dir`.
    ///
    /// stdout and stderr are read line by line as they stream in, so large
    /// payloads never block the child on a full pipe. A non-zero exit is not an
    /// error here; callers interpret `exit_code`.
    pub async fn execute(
        self,
        working_dir: &Path,
        command_line: &str,
    ) -> Result<ProcessOutput, RunError> {
        let started = Instant::now();
        let mut cmd = self.settings.shell.command(command_line);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let removed = apply_sanitized_env(&mut cmd, &self.settings.env_denylist);
        if removed > 0 {
            tracing::trace!(removed, "Stripped secret-bearing variables from analyzer env");
        }

        #[cfg(unix)]
        crate::process::set_new_session(&mut cmd);
        #[cfg(windows)]
        crate::process::hide_window(&mut cmd);

        let child = cmd.spawn().map_err(|source| RunError::Launch {
            command: command_line.to_string(),
            working_dir: working_dir.to_path_buf(),
            source,
        })?;
        let mut guard = ChildGuard::new(child);

        let io_error = |source: io::Error| RunError::Io {
            command: command_line.to_string(),
            source,
        };
        let child = guard
            .child_mut()
            .ok_or_else(|| io_error(io::Error::other("child already released")))?;
        let group = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error(io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error(io::Error::other("stderr not captured")))?;

        let stdout_task = tokio::spawn(collect_lines(stdout));
        let stderr_task = tokio::spawn(collect_lines(stderr));
        let aborts = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        // One deadline covers the wait and both pipes: a background child
        // that inherited stdout must not hold the run open past the limit.
        let finish = async {
            let status = child.wait().await.map_err(io_error)?;
            if let Some(group) = group {
                crate::process::kill_group(group);
            }
            let stdout = join_output(stdout_task).await;
            let stderr = join_output(stderr_task).await;
            Ok::<_, RunError>((status, stdout, stderr))
        };
        let finished = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, finish).await.ok(),
            None => Some(finish.await),
        };
        let Some(finished) = finished else {
            for abort in &aborts {
                abort.abort();
            }
            if let Some(group) = group {
                crate::process::kill_group(group);
            }
            // Dropping the guard kills the leader if it is still running.
            drop(guard);
            tracing::warn!(
                command = command_line,
                timeout_ms = self.settings.timeout.unwrap_or_default().as_millis() as u64,
                "Analyzer process timed out; killed"
            );
            return Err(RunError::TimedOut {
                command: command_line.to_string(),
                elapsed: started.elapsed(),
            });
        };
        let (status, stdout, stderr) = finished?;
        guard.disarm();

        tracing::debug!(
            command = command_line,
            exit_code = ?status.code(),
            stdout_bytes = stdout.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analyzer process finished"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }
}

/// Accumulate a stream line by line. Invalid UTF-8 is replaced, not fatal.
async fn collect_lines<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> String {
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                collected.push_str(text.trim_end_matches(['\r', '\n']));
                collected.push('\n');
            }
            Err(e) => {
                tracing::debug!("Stopped reading analyzer output: {e}");
                break;
            }
        }
    }
    collected
}

async fn join_output(task: JoinHandle<String>) -> String {
    task.await.unwrap_or_default()
}
