// SPDX-License-Identifier: Apache-2.0

//! Extension trait for [`std::process::Command`] that supervises a child process
//! against a deadline and a cancellation probe. The child's output streams are
//! drained concurrently so a chatty child can never fill a pipe and deadlock the
//! supervisor. On unix the child leads its own process group, and on timeout or
//! cancellation the entire group is killed and the child reaped, so processes the
//! child spawned cannot outlive the deadline holding the output pipes open. Both
//! are reported as statuses rather than errors.

use std::{
    io::{self, Read},
    process::{Command, Stdio},
    thread::{sleep, spawn},
    time::{Duration, Instant},
};
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};

/// How often the supervisor polls the child for exit, cancellation, and deadline
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
/// An error while spawning or supervising a child process
pub enum CommandWaitError {
    #[error("Failed to spawn command: {source}")]
    Spawn { source: io::Error },
    #[error("I/O error while supervising child: {source}")]
    Wait { source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a supervised child finished
pub enum WaitStatus {
    /// The child exited on its own with a status code
    Exited(i32),
    /// The child was terminated by a signal (unix only)
    Signaled(i32),
    /// The deadline elapsed and the child was killed
    TimedOut,
    /// The cancellation probe fired and the child was killed
    Cancelled,
}

#[derive(Debug)]
/// Captured output of a supervised child
pub struct WaitedOutput {
    pub status: WaitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

/// Extension trait for [`Command`] to run a child under a deadline with a
/// cancellation probe
pub trait CommandWaitExt {
    /// Spawn the command and wait for it to finish, up to `timeout`. The
    /// `cancelled` probe is polled between exit checks; when it returns true the
    /// child is killed and the wait reports [`WaitStatus::Cancelled`]. Timeout and
    /// cancellation are normal outcomes, not errors.
    ///
    /// On unix the child is placed in a fresh process group and a timeout or
    /// cancellation kills the whole group, including anything the child spawned.
    fn wait_with_deadline<F>(
        &mut self,
        timeout: Duration,
        cancelled: F,
    ) -> Result<WaitedOutput, CommandWaitError>
    where
        F: Fn() -> bool;
}

impl CommandWaitExt for Command {
    fn wait_with_deadline<F>(
        &mut self,
        timeout: Duration,
        cancelled: F,
    ) -> Result<WaitedOutput, CommandWaitError>
    where
        F: Fn() -> bool,
    {
        let start = Instant::now();

        // The child leads its own group so a group kill reaches its descendants
        #[cfg(unix)]
        self.process_group(0);

        let mut child = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandWaitError::Spawn { source: e })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_reader = spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stream) = stdout {
                let _ = stream.read_to_end(&mut buf);
            }
            buf
        });
        let stderr_reader = spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stream) = stderr {
                let _ = stream.read_to_end(&mut buf);
            }
            buf
        });

        let status = loop {
            match child
                .try_wait()
                .map_err(|e| CommandWaitError::Wait { source: e })?
            {
                Some(status) => {
                    #[cfg(unix)]
                    if let Some(signal) = status.signal() {
                        break WaitStatus::Signaled(signal);
                    }
                    break WaitStatus::Exited(status.code().unwrap_or(-1));
                }
                None => {
                    if cancelled() {
                        kill_and_reap(&mut child)?;
                        break WaitStatus::Cancelled;
                    }
                    if start.elapsed() >= timeout {
                        kill_and_reap(&mut child)?;
                        break WaitStatus::TimedOut;
                    }
                    sleep(POLL_INTERVAL);
                }
            }
        };

        // The pipes close once the child is dead, so the readers terminate
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(WaitedOutput {
            status,
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }
}

fn kill_and_reap(child: &mut std::process::Child) -> Result<(), CommandWaitError> {
    // The whole group must go, or a process the child spawned keeps the output
    // pipes open past the deadline and stalls the reader joins
    #[cfg(unix)]
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGKILL);
    }
    // Kill can race an exit; the race loser is harmless as long as we reap
    let _ = child.kill();
    child
        .wait()
        .map(|_| ())
        .map_err(|e| CommandWaitError::Wait { source: e })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::process::Command;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_exit_success() {
        let output = Command::new("echo")
            .arg("x")
            .wait_with_deadline(Duration::from_secs(5), || false)
            .expect("echo should spawn");
        assert_eq!(output.status, WaitStatus::Exited(0));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "x\n");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_exit_failure() {
        let output = Command::new("false")
            .wait_with_deadline(Duration::from_secs(5), || false)
            .expect("false should spawn");
        assert_eq!(output.status, WaitStatus::Exited(1));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_timeout_kills_child() {
        let output = Command::new("sleep")
            .arg("30")
            .wait_with_deadline(Duration::from_millis(100), || false)
            .expect("sleep should spawn");
        assert_eq!(output.status, WaitStatus::TimedOut);
        assert!(
            output.duration < Duration::from_secs(10),
            "Timed-out child was not killed promptly"
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[cfg(unix)]
    fn test_timeout_kills_background_children() {
        // The backgrounded sleep inherits the pipes; unless the whole group is
        // killed it holds them open and the wait runs its full 30 seconds
        let output = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & sleep 30")
            .wait_with_deadline(Duration::from_millis(300), || false)
            .expect("sh should spawn");
        assert_eq!(output.status, WaitStatus::TimedOut);
        assert!(
            output.duration < Duration::from_secs(10),
            "Background child survived the group kill and held the pipes"
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_cancellation_kills_child() {
        let output = Command::new("sleep")
            .arg("30")
            .wait_with_deadline(Duration::from_secs(30), || true)
            .expect("sleep should spawn");
        assert_eq!(output.status, WaitStatus::Cancelled);
        assert!(
            output.duration < Duration::from_secs(10),
            "Cancelled child was not killed promptly"
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_spawn_failure() {
        let result = Command::new("asdfasdfasdfasdfjkljkljkl")
            .wait_with_deadline(Duration::from_secs(1), || false);
        assert!(matches!(result, Err(CommandWaitError::Spawn { source: _ })));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_stderr_captured() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .wait_with_deadline(Duration::from_secs(5), || false)
            .expect("sh should spawn");
        assert_eq!(output.status, WaitStatus::Exited(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr), "oops\n");
    }
}
