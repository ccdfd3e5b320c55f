//! Cancellable single-shot timer.
//!
//! Each arm spawns a short-lived thread that blocks on a cancel channel
//! with a timeout. Dropping the sender wakes the thread without firing;
//! letting the timeout elapse fires the callback exactly once.

use crate::error::{AlertError, Result};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// A timer that runs at most one pending callback.
///
/// The owner must call [`stop`](Self::stop) before re-arming; `stop` is
/// safe to call concurrently with a firing callback, which then runs to
/// completion.
pub struct SingleShotTimer {
    armed: Mutex<Option<ArmedTimer>>,
}

struct ArmedTimer {
    // Held only so the drop of this struct closes the cancel channel.
    _cancel_tx: crossbeam_channel::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl SingleShotTimer {
    /// Create a disarmed timer.
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(None),
        }
    }

    /// Arm the timer: run `callback` once after `delay` unless stopped first.
    pub fn start<F>(&self, delay: Duration, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));
        let worker_fired = Arc::clone(&fired);

        thread::Builder::new()
            .name("alert-timer".to_owned())
            .spawn(move || {
                match cancel_rx.recv_timeout(delay) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        worker_fired.store(true, Ordering::SeqCst);
                        callback();
                    }
                    // Sender dropped or signalled: the timer was stopped.
                    _ => {}
                }
            })
            .map_err(|e| AlertError::Config(format!("cannot spawn timer thread: {e}")))?;

        let mut armed = self.armed.lock().expect("timer mutex poisoned");
        *armed = Some(ArmedTimer {
            _cancel_tx: cancel_tx,
            fired,
        });
        Ok(())
    }

    /// Cancel the pending callback, if any. A callback already in flight
    /// completes.
    pub fn stop(&self) {
        let _ = self.armed.lock().expect("timer mutex poisoned").take();
    }

    /// Returns `true` while a callback is pending and has not fired.
    pub fn is_active(&self) -> bool {
        match self.armed.lock().expect("timer mutex poisoned").as_ref() {
            Some(timer) => !timer.fired.load(Ordering::SeqCst),
            None => false,
        }
    }
}

impl Default for SingleShotTimer {
    fn default() -> Self {
        Self::new()
    }
}
