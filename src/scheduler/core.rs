//! The alert scheduler.
//!
//! All public operations take one internal mutex for their whole critical
//! section. Alerts report their state transitions through a capability
//! sink that re-enters the scheduler via the serial executor, so alert
//! callbacks never run under the scheduler lock on the caller's thread,
//! and observer notifications are always delivered with the lock released.

use crate::alert::{Alert, AlertContext};
use crate::config::SchedulerConfig;
use crate::error::{AlertError, Result};
use crate::executor::SerialExecutor;
use crate::observer::AlertObserver;
use crate::renderer::AlertRenderer;
use crate::scheduler::queue::ScheduledQueue;
use crate::storage::AlertStorage;
use crate::time::Clock;
use crate::timer::SingleShotTimer;
use crate::types::{AlertState, FocusState, LifecycleState, StopReason};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Snapshot of all alerts for context reporting.
///
/// The active alert appears in `scheduled` as well as in `active`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsContext {
    /// Every alert the scheduler knows about, active included.
    pub scheduled: Vec<AlertContext>,
    /// The active alert, if any.
    pub active: Vec<AlertContext>,
}

struct SchedulerInner {
    storage: Option<Arc<dyn AlertStorage>>,
    renderer: Option<Arc<dyn AlertRenderer>>,
    observer: Option<Arc<dyn AlertObserver>>,
    scheduled: ScheduledQueue,
    active: Option<Arc<Alert>>,
    focus: FocusState,
}

/// Persistent, focus-aware, single-timer alert scheduler.
pub struct AlertScheduler {
    weak: Weak<AlertScheduler>,
    clock: Arc<dyn Clock>,
    past_due_tolerance_secs: i64,
    executor: SerialExecutor,
    timer: SingleShotTimer,
    inner: Mutex<SchedulerInner>,
}

impl AlertScheduler {
    /// Create a scheduler over the given collaborators. Storage is not
    /// touched until [`initialize`](Self::initialize).
    pub fn new(
        storage: Arc<dyn AlertStorage>,
        renderer: Arc<dyn AlertRenderer>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>> {
        let executor = SerialExecutor::new("alert-scheduler")?;
        Ok(Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            clock,
            past_due_tolerance_secs: config.past_due_tolerance_secs,
            executor,
            timer: SingleShotTimer::new(),
            inner: Mutex::new(SchedulerInner {
                storage: Some(storage),
                renderer: Some(renderer),
                observer: None,
                scheduled: ScheduledQueue::new(),
                active: None,
                focus: FocusState::None,
            }),
        }))
    }

    /// Bind the observer, open (or create) storage, reload persisted
    /// alerts, and arm the timer.
    ///
    /// Past-due alerts are announced and erased instead of re-scheduled.
    /// An alert persisted as `Active` is reset to `Set`: a crash during
    /// activation must not leave it stuck active.
    pub fn initialize(&self, observer: Arc<dyn AlertObserver>) -> Result<()> {
        let mut inner = self.lock_inner();
        inner.observer = Some(observer);

        let storage = Self::storage_of(&inner)?;
        if storage.open().is_err() {
            info!("alert database missing, creating");
            storage.create_database().map_err(|e| {
                error!("cannot create alert database: {e}");
                AlertError::Config(format!("cannot create alert database: {e}"))
            })?;
        }

        let now = self.clock.unix_now()?;
        let renderer = Self::renderer_of(&inner)?;

        for record in storage.load()? {
            let alert = match Alert::from_record(&record) {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(token = %record.token, "skipping unreadable alert row: {e}");
                    continue;
                }
            };

            if alert.is_past_due(now, self.past_due_tolerance_secs) {
                self.notify_observer(
                    alert.token(),
                    alert.type_name(),
                    LifecycleState::PastDue,
                    "",
                );
                if let Err(e) = self.erase_alert_locked(&inner, &alert) {
                    warn!(token = %alert.token(), "cannot erase past-due alert: {e}");
                }
                continue;
            }

            if record.state == AlertState::Active {
                alert.reset();
                if let Err(e) = storage.modify(&alert.to_record()) {
                    warn!(token = %alert.token(), "cannot persist reset state: {e}");
                }
            }

            alert.set_renderer(Arc::clone(&renderer));
            alert.set_observer(self.event_sink());
            inner.scheduled.insert(alert);
        }

        self.set_timer_for_next_locked(&mut inner);
        Ok(())
    }

    /// Schedule a new alert, or reschedule the existing alert with the
    /// same token.
    pub fn schedule(&self, alert: Arc<Alert>) -> Result<()> {
        debug!(token = %alert.token(), "schedule");
        let now = self.clock.unix_now()?;
        let mut inner = self.lock_inner();

        if alert.is_past_due(now, self.past_due_tolerance_secs) {
            error!(token = %alert.token(), "rejecting past-due alert");
            return Err(AlertError::ScheduleViolation(format!(
                "alert '{}' is already past due",
                alert.token()
            )));
        }

        if let Some(existing) = inner.scheduled.get(alert.token()).cloned() {
            debug!(token = %existing.token(), "token already scheduled, updating");
            return self.update_locked(&mut inner, &existing, &alert.scheduled_iso());
        }

        let storage = Self::storage_of(&inner)?;
        storage.store(&alert.to_record()).map_err(|e| {
            error!(token = %alert.token(), "cannot store alert: {e}");
            e
        })?;

        alert.set_renderer(Self::renderer_of(&inner)?);
        alert.set_observer(self.event_sink());
        inner.scheduled.insert(Arc::clone(&alert));

        if inner.active.is_none() {
            self.set_timer_for_next_locked(&mut inner);
        }
        Ok(())
    }

    /// Move a scheduled alert to a new fire time.
    pub fn update(&self, token: &str, new_iso: &str) -> Result<()> {
        let mut inner = self.lock_inner();
        let Some(alert) = inner.scheduled.get(token).cloned() else {
            warn!(%token, "update for unknown alert");
            return Err(AlertError::ScheduleViolation(format!(
                "no scheduled alert with token '{token}'"
            )));
        };
        self.update_locked(&mut inner, &alert, new_iso)
    }

    /// Snooze the active alert to `new_iso`. The resulting `Snoozed` event
    /// moves it back into the scheduled set.
    pub fn snooze(&self, token: &str, new_iso: &str) -> Result<()> {
        debug!(%token, %new_iso, "snooze");
        let inner = self.lock_inner();
        let active = inner
            .active
            .as_ref()
            .filter(|a| a.token() == token)
            .cloned();
        let Some(active) = active else {
            error!(%token, "snooze target is not the active alert");
            return Err(AlertError::ScheduleViolation(format!(
                "alert '{token}' is not active"
            )));
        };
        active.snooze(new_iso)
    }

    /// Delete one alert by token. Deleting an unknown token succeeds.
    ///
    /// If the token names the active alert it is deactivated instead; the
    /// subsequent `Stopped` event erases it.
    pub fn delete(&self, token: &str) -> Result<()> {
        debug!(%token, "delete");
        let mut inner = self.lock_inner();

        if inner.active.as_ref().is_some_and(|a| a.token() == token) {
            Self::deactivate_active_locked(&inner, StopReason::RemoteStop);
            return Ok(());
        }

        let Some(alert) = inner.scheduled.get(token).cloned() else {
            warn!(%token, "delete for unknown alert");
            return Ok(());
        };

        self.erase_alert_locked(&inner, &alert)?;
        inner.scheduled.remove(token);
        self.set_timer_for_next_locked(&mut inner);
        Ok(())
    }

    /// Delete a batch of alerts with one storage round trip.
    ///
    /// Missing tokens are skipped. On storage failure nothing in memory
    /// changes.
    pub fn delete_many(&self, tokens: &[String]) -> Result<()> {
        debug!(count = tokens.len(), "delete many");
        let mut inner = self.lock_inner();

        let mut selected: Vec<Arc<Alert>> = Vec::new();
        let mut delete_active = false;
        for token in tokens {
            if inner
                .active
                .as_ref()
                .is_some_and(|a| a.token() == token.as_str())
            {
                delete_active = true;
                if let Some(active) = inner.active.clone() {
                    selected.push(active);
                }
                continue;
            }
            match inner.scheduled.get(token) {
                Some(alert) => selected.push(Arc::clone(alert)),
                None => warn!(%token, "delete target missing"),
            }
        }

        let storage = Self::storage_of(&inner)?;
        let selected_tokens: Vec<String> =
            selected.iter().map(|a| a.token().to_owned()).collect();
        storage.bulk_erase(&selected_tokens).map_err(|e| {
            error!("bulk erase failed: {e}");
            e
        })?;

        if delete_active {
            Self::deactivate_active_locked(&inner, StopReason::RemoteStop);
            inner.active = None;
        }

        for alert in &selected {
            inner.scheduled.remove(alert.token());
            self.notify_observer(alert.token(), alert.type_name(), LifecycleState::Deleted, "");
        }

        self.set_timer_for_next_locked(&mut inner);
        Ok(())
    }

    /// True iff the active slot holds `token` and it is activating or
    /// active.
    pub fn is_alert_active(&self, token: &str) -> bool {
        let inner = self.lock_inner();
        inner.active.as_ref().is_some_and(|a| {
            a.token() == token && matches!(a.state(), AlertState::Activating | AlertState::Active)
        })
    }

    /// Apply a focus change from the focus authority.
    pub fn update_focus(&self, focus: FocusState) {
        debug!(%focus, "update focus");
        let mut inner = self.lock_inner();
        if inner.focus == focus {
            return;
        }
        inner.focus = focus;

        match focus {
            FocusState::Foreground | FocusState::Background => {
                if let Some(active) = inner.active.clone() {
                    active.set_focus_state(focus);
                    let state = if focus == FocusState::Foreground {
                        LifecycleState::FocusEnteredForeground
                    } else {
                        LifecycleState::FocusEnteredBackground
                    };
                    self.notify_observer(active.token(), active.type_name(), state, "");
                } else {
                    self.activate_next_locked(&mut inner);
                }
            }
            FocusState::None => {
                Self::deactivate_active_locked(&inner, StopReason::LocalStop);
            }
        }
    }

    /// Current focus level.
    pub fn focus_state(&self) -> FocusState {
        self.lock_inner().focus
    }

    /// Context snapshot of every alert; the active alert appears in both
    /// lists.
    pub fn context_info(&self) -> AlertsContext {
        let inner = self.lock_inner();
        let mut scheduled: Vec<AlertContext> =
            inner.scheduled.iter().map(|a| a.context_info()).collect();
        let mut active = Vec::new();
        if let Some(alert) = &inner.active {
            scheduled.push(alert.context_info());
            active.push(alert.context_info());
        }
        AlertsContext { scheduled, active }
    }

    /// Flat snapshot of every alert, active included.
    pub fn all_alerts(&self) -> Vec<AlertContext> {
        let inner = self.lock_inner();
        let mut all: Vec<AlertContext> =
            inner.scheduled.iter().map(|a| a.context_info()).collect();
        if let Some(alert) = &inner.active {
            all.push(alert.context_info());
        }
        all
    }

    /// Stop the active alert from a local interaction.
    pub fn local_stop(&self) {
        debug!("local stop");
        let inner = self.lock_inner();
        Self::deactivate_active_locked(&inner, StopReason::LocalStop);
    }

    /// Deactivate the active alert with `reason`, announce deletion of
    /// every scheduled alert, and wipe memory and storage.
    ///
    /// The active slot itself is cleared by the `Stopped` event that the
    /// deactivation produces.
    pub fn clear_all(&self, reason: StopReason) -> Result<()> {
        debug!(%reason, "clear all");
        let mut inner = self.lock_inner();

        Self::deactivate_active_locked(&inner, reason);
        self.timer.stop();

        for alert in inner.scheduled.iter() {
            self.notify_observer(alert.token(), alert.type_name(), LifecycleState::Deleted, "");
        }
        inner.scheduled.clear();

        let storage = Self::storage_of(&inner)?;
        storage.clear_database()
    }

    /// Drain the executor, stop the timer, and release every collaborator.
    /// Operations after shutdown fail.
    pub fn shutdown(&self) {
        // Drain callbacks first so nothing re-enters a half-released state.
        self.executor.shutdown();
        self.timer.stop();

        // Dropping the observer may run teardown that calls back in, so it
        // must not happen while the lock is held.
        let observer = self.lock_inner().observer.take();
        drop(observer);

        let mut inner = self.lock_inner();
        inner.storage = None;
        inner.renderer = None;
        inner.active = None;
        inner.scheduled.clear();
        info!("alert scheduler shut down");
    }

    /// Returns `true` while the fire timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.timer.is_active()
    }

    /// Inbound state transition from an alert. Enqueued onto the serial
    /// executor; never handled on the caller's thread.
    pub fn on_alert_state_change(
        &self,
        token: &str,
        type_name: &str,
        state: LifecycleState,
        reason: &str,
    ) {
        debug!(%token, %state, %reason, "alert state change");
        let weak = self.weak.clone();
        let token = token.to_owned();
        let type_name = type_name.to_owned();
        let reason = reason.to_owned();
        self.executor.submit(move || {
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            scheduler.execute_on_alert_state_change(&token, &type_name, state, &reason);
        });
    }

    fn execute_on_alert_state_change(
        &self,
        token: &str,
        type_name: &str,
        state: LifecycleState,
        reason: &str,
    ) {
        debug!(%token, %state, %reason, "dispatch alert state change");
        let mut inner = self.lock_inner();

        match state {
            LifecycleState::Ready => {
                self.notify_observer(token, type_name, state, reason);
            }

            LifecycleState::Started => {
                let activating = inner
                    .active
                    .clone()
                    .filter(|a| a.state() == AlertState::Activating);
                if let Some(active) = activating {
                    active.set_state_active();
                    match Self::storage_of(&inner) {
                        Ok(storage) => {
                            if let Err(e) = storage.modify(&active.to_record()) {
                                error!(%token, "cannot persist active state: {e}");
                            }
                        }
                        Err(e) => error!(%token, "cannot persist active state: {e}"),
                    }
                    self.notify_observer(token, type_name, state, reason);
                }
            }

            LifecycleState::Stopped | LifecycleState::Completed => {
                self.notify_observer(token, type_name, state, reason);
                if let Some(active) = inner.active.take() {
                    if let Err(e) = self.erase_alert_locked(&inner, &active) {
                        error!(token = %active.token(), "cannot erase finished alert: {e}");
                    }
                }
                self.set_timer_for_next_locked(&mut inner);
            }

            LifecycleState::Snoozed => {
                if let Some(active) = inner.active.take() {
                    match Self::storage_of(&inner) {
                        Ok(storage) => {
                            if let Err(e) = storage.modify(&active.to_record()) {
                                error!(%token, "cannot persist snoozed schedule: {e}");
                            }
                        }
                        Err(e) => error!(%token, "cannot persist snoozed schedule: {e}"),
                    }
                    inner.scheduled.insert(active);
                }
                self.notify_observer(token, type_name, state, reason);
                self.set_timer_for_next_locked(&mut inner);
            }

            LifecycleState::Error => {
                // Discard the erroring alert so it cannot loop forever.
                if inner.active.as_ref().is_some_and(|a| a.token() == token) {
                    if let Some(active) = inner.active.take() {
                        let _ = self.erase_alert_locked(&inner, &active);
                    }
                    self.set_timer_for_next_locked(&mut inner);
                } else if let Some(alert) = inner.scheduled.get(token).cloned() {
                    let _ = self.erase_alert_locked(&inner, &alert);
                    inner.scheduled.remove(token);
                    self.set_timer_for_next_locked(&mut inner);
                }
                self.notify_observer(token, type_name, state, reason);
            }

            LifecycleState::PastDue
            | LifecycleState::FocusEnteredForeground
            | LifecycleState::FocusEnteredBackground
            | LifecycleState::Deleted => {
                // Scheduler-generated states; alerts never send these.
                warn!(%token, %state, "ignoring scheduler-only state from alert");
            }
        }
    }

    /// Remove-mutate-reinsert with rollback. The alert re-enters the set
    /// and the timer is re-armed on every exit path.
    fn update_locked(
        &self,
        inner: &mut SchedulerInner,
        alert: &Arc<Alert>,
        new_iso: &str,
    ) -> Result<()> {
        debug!(token = %alert.token(), %new_iso, "update schedule");
        inner.scheduled.remove(alert.token());

        let result = (|| {
            let old_iso = alert.scheduled_iso();
            alert.update_scheduled_time(new_iso)?;
            let storage = Self::storage_of(inner)?;
            if let Err(e) = storage.modify(&alert.to_record()) {
                error!(token = %alert.token(), "cannot persist new schedule: {e}");
                let _ = alert.update_scheduled_time(&old_iso);
                return Err(e);
            }
            Ok(())
        })();

        inner.scheduled.insert(Arc::clone(alert));
        if inner.active.is_none() {
            self.set_timer_for_next_locked(inner);
        }
        result
    }

    /// Disarm, then arm the timer for the earliest scheduled alert.
    ///
    /// No timer runs while an alert is active. An already-due alert is
    /// announced `Ready` immediately instead of starting a zero-length
    /// timer.
    fn set_timer_for_next_locked(&self, inner: &mut SchedulerInner) {
        self.timer.stop();

        if inner.active.is_some() {
            debug!("active alert present, timer stays disarmed");
            return;
        }
        let Some(next) = inner.scheduled.first() else {
            debug!("no scheduled alerts, timer disarmed");
            return;
        };

        let token = next.token().to_owned();
        let type_name = next.type_name().to_owned();
        let scheduled_unix = next.scheduled_unix();

        let now = match self.clock.unix_now() {
            Ok(now) => now,
            Err(e) => {
                error!("cannot arm timer: {e}");
                return;
            }
        };

        let delay = (scheduled_unix - now).max(0);
        if delay == 0 {
            self.notify_observer(&token, &type_name, LifecycleState::Ready, "");
            return;
        }

        let weak = self.weak.clone();
        let fire_token = token.clone();
        let started = self.timer.start(Duration::from_secs(delay as u64), move || {
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            debug!(token = %fire_token, "alert timer fired");
            scheduler.notify_observer(&fire_token, &type_name, LifecycleState::Ready, "");
        });
        match started {
            Ok(()) => debug!(%token, delay_secs = delay, "timer armed"),
            Err(e) => error!(%token, "cannot start alert timer: {e}"),
        }
    }

    /// Promote the earliest scheduled alert into the active slot and start
    /// its activation under the current focus.
    fn activate_next_locked(&self, inner: &mut SchedulerInner) {
        if inner.active.is_some() {
            error!("activate_next while an alert is already active");
            return;
        }
        let Some(alert) = inner.scheduled.pop_first() else {
            return;
        };
        debug!(token = %alert.token(), "activating next alert");
        alert.set_focus_state(inner.focus);
        inner.active = Some(Arc::clone(&alert));
        alert.activate();
    }

    fn deactivate_active_locked(inner: &SchedulerInner, reason: StopReason) {
        if let Some(active) = &inner.active {
            active.deactivate(reason);
        }
    }

    /// Erase `alert` from storage and announce the deletion. Callers
    /// remove the alert from their own structures.
    fn erase_alert_locked(&self, inner: &SchedulerInner, alert: &Alert) -> Result<()> {
        let storage = Self::storage_of(inner)?;
        if let Err(e) = storage.erase(alert.token()) {
            error!(token = %alert.token(), "cannot erase alert from storage: {e}");
            return Err(e);
        }
        self.notify_observer(alert.token(), alert.type_name(), LifecycleState::Deleted, "");
        Ok(())
    }

    /// Deliver a notification on the executor thread, outside the lock.
    fn notify_observer(&self, token: &str, type_name: &str, state: LifecycleState, reason: &str) {
        debug!(%token, %state, "notify observer");
        let weak = self.weak.clone();
        let token = token.to_owned();
        let type_name = type_name.to_owned();
        let reason = reason.to_owned();
        self.executor.submit(move || {
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            let observer = scheduler.lock_inner().observer.clone();
            if let Some(observer) = observer {
                observer.on_alert_state_change(&token, &type_name, state, &reason);
            }
        });
    }

    fn event_sink(&self) -> Arc<dyn AlertObserver> {
        Arc::new(SchedulerEventSink {
            scheduler: self.weak.clone(),
        })
    }

    fn storage_of(inner: &SchedulerInner) -> Result<Arc<dyn AlertStorage>> {
        inner
            .storage
            .clone()
            .ok_or_else(|| AlertError::Config("scheduler is shut down".to_owned()))
    }

    fn renderer_of(inner: &SchedulerInner) -> Result<Arc<dyn AlertRenderer>> {
        inner
            .renderer
            .clone()
            .ok_or_else(|| AlertError::Config("scheduler is shut down".to_owned()))
    }

    fn lock_inner(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().expect("scheduler mutex poisoned")
    }
}

/// Capability handle given to alerts for posting their state transitions.
/// Holds the scheduler weakly so alerts never keep it alive.
struct SchedulerEventSink {
    scheduler: Weak<AlertScheduler>,
}

impl AlertObserver for SchedulerEventSink {
    fn on_alert_state_change(
        &self,
        token: &str,
        type_name: &str,
        state: LifecycleState,
        reason: &str,
    ) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.on_alert_state_change(token, type_name, state, reason);
        }
    }
}
