//! Per-call deadlines for blocking work.
//!
//! The work runs on a helper thread; the caller waits at most `timeout`. A call
//! that overruns is abandoned, not cancelled: its thread finishes in the
//! background and its result is dropped. The caller gets an [`Abandoned`]
//! handle to find out when that happens.

use std::sync::mpsc;
use std::time::Duration;

/// Why a deadline call produced no value.
#[derive(Debug)]
pub enum DeadlineError {
    /// The work did not finish in time. It is still running.
    Elapsed(Abandoned),
    /// The work panicked.
    Panicked,
    /// No helper thread could be started.
    Spawn,
}

/// A call that overran its deadline and is still running on its thread.
#[derive(Debug)]
pub struct Abandoned {
    /// Disconnects when the helper thread exits, normally or by unwinding.
    exited: mpsc::Receiver<()>,
}

impl Abandoned {
    /// Whether the helper thread has exited.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.exited.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        )
    }

    /// Wait at most `timeout` for the helper thread to exit. Hands the handle
    /// back if it is still running.
    pub fn wait(self, timeout: Duration) -> Result<(), Abandoned> {
        match self.exited.recv_timeout(timeout) {
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self),
            _ => Ok(()),
        }
    }
}

/// Run `work` with a deadline. A zero `timeout` runs it inline with no limit.
pub fn run_with_deadline<T, F>(timeout: Duration, work: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if timeout.is_zero() {
        return Ok(work());
    }

    let (tx, rx) = mpsc::sync_channel(1);
    let (exit_tx, exit_rx) = mpsc::channel::<()>();
    let spawned = std::thread::Builder::new()
        .name("audit-call".into())
        .spawn(move || {
            let _exit = exit_tx;
            // The receiver may be gone after a timeout.
            let _ = tx.send(work());
        });
    if spawned.is_err() {
        return Err(DeadlineError::Spawn);
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(DeadlineError::Elapsed(Abandoned { exited: exit_rx }))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeadlineError::Panicked),
    }
}
