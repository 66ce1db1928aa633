//! Child process lifetime helpers.

use tokio::process::{Child, Command};

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned child immediately after `spawn()`. A runner that gives up on
/// the child (timeout, read failure) simply drops the guard. Call `disarm()`
/// once the process has exited normally.
pub(crate) struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub(crate) fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub(crate) fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    pub(crate) fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        tracing::debug!(pid = ?child.id(), "Killing analyzer process");
        #[cfg(unix)]
        {
            if let Some(pid) = child.id()
                && !kill_group(pid)
            {
                let _ = child.start_kill();
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// SIGKILL every process in the group led by `pid`. Returns false when no
/// such group exists.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) -> bool {
    // SAFETY: killpg has no memory-safety preconditions; a stale group only
    // yields ESRCH.
    unsafe { libc::killpg(pid as i32, libc::SIGKILL) == 0 }
}

/// Process groups are a Unix concept; stragglers elsewhere are bounded only
/// by the run deadline.
#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) -> bool {
    false
}

/// Put the child in its own session so the whole process group can be killed
/// via `killpg`. On Linux the child also dies with its parent.
#[cfg(unix)]
pub(crate) fn set_new_session(cmd: &mut Command) {
    use std::io;
    use std::os::unix::process::CommandExt;

    // SAFETY: the closure only calls async-signal-safe libc functions.
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Launch without a console window.
#[cfg(windows)]
pub(crate) fn hide_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    cmd.as_std_mut()
        .creation_flags(windows_sys::Win32::System::Threading::CREATE_NO_WINDOW);
}
