//! Process execution primitives: spawn a child, hand back a handle that
//! can be killed from outside the owning task, and be notified when it
//! exits.
//!
//! Grounded on the same shape as a generic background-process manager:
//! the manager never owns a `Child` directly — spawning creates a
//! background task that owns the child, and communicates kill requests
//! in and completion notifications out over channels. Kiwibes' Executor
//! is the only consumer: unlike a general-purpose exec tool, a
//! `ChildHandle` here races exactly two futures (the child's exit, and
//! an external kill request) because the watchdog timeout is driven
//! externally by a one-second sweep rather than a per-child sleep
//! timer (see SPEC_FULL §4.5).

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// How long `terminate` waits for SIGTERM to take effect before escalating
/// to SIGKILL.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How a child process finished.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub exit_code: Option<i32>,
    pub killed: bool,
}

/// A handle to a running child process. Dropping this does not kill the
/// child; call `kill()` explicitly.
pub struct ChildHandle {
    kill_tx: mpsc::Sender<()>,
}

impl ChildHandle {
    /// Request termination of the child. Idempotent: a second call
    /// after the child has already exited is a harmless no-op send
    /// into a closed channel.
    pub fn kill(&self) {
        let _ = self.kill_tx.try_send(());
    }
}

/// Spawn `program` (element 0 is the executable, the rest are literal
/// argv tokens — never a shell string) and return a handle plus a
/// one-shot receiver that resolves when the process exits.
///
/// Failure to spawn is reported as `Err` and no background task is
/// created; the caller maps this to `ERROR_PROCESS_LAUNCH_FAILED`.
pub fn spawn(program: &[String]) -> std::io::Result<(ChildHandle, oneshot::Receiver<Outcome>)> {
    assert!(!program.is_empty(), "program must have at least one element");

    let mut cmd = Command::new(&program[0]);
    cmd.args(&program[1..]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    let mut child = cmd.spawn()?;

    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    let (done_tx, done_rx) = oneshot::channel::<Outcome>();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => Outcome { exit_code: status.code(), killed: false },
                    Err(e) => {
                        tracing::warn!(error = %e, "error waiting on child process");
                        Outcome { exit_code: None, killed: false }
                    }
                }
            }
            _ = kill_rx.recv() => {
                let exit_code = terminate(&mut child).await;
                Outcome { exit_code, killed: true }
            }
        };

        tracing::debug!(exit_code = ?outcome.exit_code, killed = outcome.killed, "child process finished");
        let _ = done_tx.send(outcome);
    });

    Ok((ChildHandle { kill_tx }, done_rx))
}

/// Graceful-then-force termination: send SIGTERM, give the child
/// `GRACE_PERIOD` to exit on its own, and only SIGKILL if it's still
/// alive after that.
async fn terminate(child: &mut Child) -> Option<i32> {
    if let Some(pid) = child.id() {
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
                Ok(Ok(status)) => return status.code(),
                Ok(Err(e)) => tracing::warn!(error = %e, "error waiting on child after SIGTERM"),
                Err(_) => tracing::debug!("child still alive after grace period, sending SIGKILL"),
            },
            Err(e) => tracing::warn!(error = %e, "failed to send SIGTERM"),
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill child process");
    }
    child.wait().await.ok().and_then(|s| s.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_true_exits_cleanly() {
        let (_handle, done) = spawn(&["/bin/true".to_string()]).unwrap();
        let outcome = done.await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.killed);
    }

    #[tokio::test]
    async fn kill_terminates_sleeping_child() {
        let (handle, done) = spawn(&["/bin/sleep".to_string(), "30".to_string()]).unwrap();
        handle.kill();
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), done)
            .await
            .expect("child did not exit after kill")
            .unwrap();
        assert!(outcome.killed);
    }

    #[tokio::test]
    async fn spawn_nonexistent_binary_fails() {
        let result = spawn(&["/nowhere/does-not-exist".to_string()]);
        assert!(result.is_err());
    }
}
