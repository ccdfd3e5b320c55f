//! Shared test doubles used across unit and integration tests.
//!
//! Provides a manually driven clock, a scripted renderer, a recording
//! observer with blocking waits, and an in-memory storage backend with
//! per-operation failure injection.

use crate::error::{AlertError, Result};
use crate::observer::AlertObserver;
use crate::renderer::{AlertRenderer, RendererObserver, RendererState};
use crate::storage::{AlertRecord, AlertStorage};
use crate::time::Clock;
use crate::types::LifecycleState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Route `tracing` output through the test harness's captured writer.
///
/// Safe to call from every test; only the first call installs the
/// subscriber.
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Clock driven explicitly by the test.
pub struct ManualClock {
    now: AtomicI64,
    failing: AtomicBool,
}

impl ManualClock {
    /// Create a clock reading `now` seconds since epoch.
    pub fn new(now: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
            failing: AtomicBool::new(false),
        })
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Make subsequent reads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_now(&self) -> Result<i64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AlertError::Time("clock unavailable".to_owned()));
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}

/// Clock whose every read fails.
pub struct FailingClock;

impl Clock for FailingClock {
    fn unix_now(&self) -> Result<i64> {
        Err(AlertError::Time("clock unavailable".to_owned()))
    }
}

/// One notification captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    pub token: String,
    pub type_name: String,
    pub state: LifecycleState,
    pub reason: String,
}

/// Observer that records every notification and supports blocking waits.
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    cond: Condvar,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        })
    }

    /// Snapshot of all recorded events, in delivery order.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }

    /// Lifecycle states recorded for `token`, in delivery order.
    pub fn states_for(&self, token: &str) -> Vec<LifecycleState> {
        self.events()
            .iter()
            .filter(|e| e.token == token)
            .map(|e| e.state)
            .collect()
    }

    /// Block until `predicate` holds over the recorded events, or until
    /// `timeout` elapses. Returns whether the predicate held.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[ObservedEvent]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().expect("observer mutex poisoned");
        loop {
            if predicate(&events) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(events, deadline - now)
                .expect("observer mutex poisoned");
            events = guard;
        }
    }

    /// Block until `token` reaches `state`, or until `timeout` elapses.
    pub fn wait_for_state(&self, token: &str, state: LifecycleState, timeout: Duration) -> bool {
        self.wait_for(timeout, |events| {
            events.iter().any(|e| e.token == token && e.state == state)
        })
    }
}

impl AlertObserver for RecordingObserver {
    fn on_alert_state_change(
        &self,
        token: &str,
        type_name: &str,
        state: LifecycleState,
        reason: &str,
    ) {
        let mut events = self.events.lock().expect("observer mutex poisoned");
        events.push(ObservedEvent {
            token: token.to_owned(),
            type_name: type_name.to_owned(),
            state,
            reason: reason.to_owned(),
        });
        self.cond.notify_all();
    }
}

/// Renderer that reports scripted playback transitions synchronously.
///
/// By default `start` reports `Started` and `stop` reports `Stopped`
/// immediately; both can be turned off to drive transitions manually via
/// [`emit`](Self::emit).
pub struct ScriptedRenderer {
    observer: Mutex<Option<Arc<dyn RendererObserver>>>,
    auto_start: AtomicBool,
    auto_stop: AtomicBool,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observer: Mutex::new(None),
            auto_start: AtomicBool::new(true),
            auto_stop: AtomicBool::new(true),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
        })
    }

    /// Disable the automatic `Started` report on `start`.
    pub fn set_auto_start(&self, auto: bool) {
        self.auto_start.store(auto, Ordering::SeqCst);
    }

    /// Disable the automatic `Stopped` report on `stop`.
    pub fn set_auto_stop(&self, auto: bool) {
        self.auto_stop.store(auto, Ordering::SeqCst);
    }

    /// Report `state` to the most recently started observer.
    pub fn emit(&self, state: RendererState) {
        let observer = self
            .observer
            .lock()
            .expect("renderer mutex poisoned")
            .clone();
        if let Some(observer) = observer {
            observer.on_renderer_state_change(state);
        }
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }
}

impl AlertRenderer for ScriptedRenderer {
    fn start(&self, observer: Arc<dyn RendererObserver>) {
        *self.observer.lock().expect("renderer mutex poisoned") = Some(Arc::clone(&observer));
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if self.auto_start.load(Ordering::SeqCst) {
            observer.on_renderer_state_change(RendererState::Started);
        }
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.auto_stop.load(Ordering::SeqCst) {
            self.emit(RendererState::Stopped);
        }
    }
}

/// In-memory storage with per-operation failure injection.
#[derive(Default)]
pub struct MemoryAlertStorage {
    rows: Mutex<HashMap<String, AlertRecord>>,
    created: AtomicBool,
    fail_open: AtomicBool,
    fail_store: AtomicBool,
    fail_modify: AtomicBool,
    fail_erase: AtomicBool,
    fail_bulk_erase: AtomicBool,
}

impl MemoryAlertStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a storage that already "exists" on disk, with `records`
    /// pre-seeded. Used to model state left by a previous run.
    pub fn with_records(records: Vec<AlertRecord>) -> Arc<Self> {
        let storage = Self::default();
        storage.created.store(true, Ordering::SeqCst);
        {
            let mut rows = storage.rows.lock().expect("storage mutex poisoned");
            for record in records {
                rows.insert(record.token.clone(), record);
            }
        }
        Arc::new(storage)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_store(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_modify(&self, fail: bool) {
        self.fail_modify.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_erase(&self, fail: bool) {
        self.fail_erase.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_bulk_erase(&self, fail: bool) {
        self.fail_bulk_erase.store(fail, Ordering::SeqCst);
    }

    /// Tokens currently persisted, sorted.
    pub fn tokens(&self) -> Vec<String> {
        let rows = self.rows.lock().expect("storage mutex poisoned");
        let mut tokens: Vec<String> = rows.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    /// Persisted record for `token`, if any.
    pub fn record(&self, token: &str) -> Option<AlertRecord> {
        self.rows
            .lock()
            .expect("storage mutex poisoned")
            .get(token)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("storage mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AlertError::Storage(format!("injected {op} failure")));
        }
        Ok(())
    }
}

impl AlertStorage for MemoryAlertStorage {
    fn open(&self) -> Result<()> {
        self.check(&self.fail_open, "open")?;
        if !self.created.load(Ordering::SeqCst) {
            return Err(AlertError::Storage("no database".to_owned()));
        }
        Ok(())
    }

    fn create_database(&self) -> Result<()> {
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_database(&self) -> Result<()> {
        self.rows.lock().expect("storage mutex poisoned").clear();
        Ok(())
    }

    fn load(&self) -> Result<Vec<AlertRecord>> {
        let rows = self.rows.lock().expect("storage mutex poisoned");
        let mut records: Vec<AlertRecord> = rows.values().cloned().collect();
        records.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(records)
    }

    fn store(&self, record: &AlertRecord) -> Result<()> {
        self.check(&self.fail_store, "store")?;
        let mut rows = self.rows.lock().expect("storage mutex poisoned");
        if rows.contains_key(&record.token) {
            return Err(AlertError::Storage(format!(
                "duplicate token '{}'",
                record.token
            )));
        }
        rows.insert(record.token.clone(), record.clone());
        Ok(())
    }

    fn modify(&self, record: &AlertRecord) -> Result<()> {
        self.check(&self.fail_modify, "modify")?;
        let mut rows = self.rows.lock().expect("storage mutex poisoned");
        if !rows.contains_key(&record.token) {
            return Err(AlertError::Storage(format!(
                "no row for token '{}'",
                record.token
            )));
        }
        rows.insert(record.token.clone(), record.clone());
        Ok(())
    }

    fn erase(&self, token: &str) -> Result<()> {
        self.check(&self.fail_erase, "erase")?;
        self.rows
            .lock()
            .expect("storage mutex poisoned")
            .remove(token);
        Ok(())
    }

    fn bulk_erase(&self, tokens: &[String]) -> Result<()> {
        self.check(&self.fail_bulk_erase, "bulk erase")?;
        let mut rows = self.rows.lock().expect("storage mutex poisoned");
        for token in tokens {
            rows.remove(token);
        }
        Ok(())
    }
}
