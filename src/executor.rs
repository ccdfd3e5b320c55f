//! Serial task executor.
//!
//! A single worker thread drains a FIFO queue of boxed jobs. All alert
//! state-change handling and observer fan-out runs here, so callbacks are
//! observed in submission order and never on a caller's thread.

use crate::error::{AlertError, Result};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded FIFO work queue.
///
/// Jobs submitted after [`shutdown`](Self::shutdown) are dropped.
pub struct SerialExecutor {
    tx: Mutex<Option<crossbeam_channel::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    /// Spawn the worker thread.
    pub fn new(name: &str) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                // Runs until every sender is dropped, draining what remains.
                for job in rx {
                    job();
                }
            })
            .map_err(|e| AlertError::Config(format!("cannot spawn executor thread: {e}")))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueue a job to run on the worker thread, after all previously
    /// submitted jobs.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.tx.lock().expect("executor mutex poisoned");
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    warn!("executor worker gone, dropping job");
                }
            }
            None => debug!("executor is shut down, dropping job"),
        }
    }

    /// Drain pending jobs and terminate the worker.
    ///
    /// Blocks until every job submitted before this call has run, unless
    /// called from the worker thread itself, in which case the queue is
    /// closed without waiting.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().expect("executor mutex poisoned").take();
        // Closing the channel lets the worker finish the queue and exit.
        drop(tx);

        let worker = self.worker.lock().expect("executor mutex poisoned").take();
        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                // Shut down from our own worker (last owner dropped inside a
                // job); the closed channel already ends the loop.
                return;
            }
            if handle.join().is_err() {
                warn!("executor worker panicked during shutdown");
            }
        }
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn jobs_run_in_submission_order() {
        let executor = SerialExecutor::new("test-executor").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let log = Arc::clone(&log);
            executor.submit(move || log.lock().unwrap().push(i));
        }
        executor.shutdown();

        let log = log.lock().unwrap();
        assert_eq!(*log, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_drains_pending_jobs() {
        let executor = SerialExecutor::new("test-executor").unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            executor.submit(move || {
                std::thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        executor.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn submit_after_shutdown_is_dropped() {
        let executor = SerialExecutor::new("test-executor").unwrap();
        executor.shutdown();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        executor.submit(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_twice_is_safe() {
        let executor = SerialExecutor::new("test-executor").unwrap();
        executor.shutdown();
        executor.shutdown();
    }
}
