//! Alert entity.
//!
//! An [`Alert`] owns one scheduled notification: its immutable identity,
//! its wall-clock schedule (kept as both an RFC 3339 string and Unix
//! seconds), its internal state machine, and its bindings to a renderer
//! and an event sink. The scheduler treats the entity as a black box
//! driven by the state callbacks it posts.

use crate::error::{AlertError, Result};
use crate::observer::AlertObserver;
use crate::renderer::{AlertRenderer, RendererObserver, RendererState};
use crate::storage::AlertRecord;
use crate::types::{AlertState, FocusState, LifecycleState, StopReason};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// One audio asset referenced by an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Asset identifier, unique within the alert.
    pub id: String,
    /// Source URL of the audio content.
    pub url: String,
}

/// Custom-audio metadata carried by an alert and handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Ordered assets to play per loop.
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
    /// Number of times the asset sequence repeats.
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,
    /// Pause between loops, in milliseconds.
    #[serde(default)]
    pub loop_pause_ms: u64,
    /// Asset played while the alert holds background focus, if any.
    #[serde(default)]
    pub background_asset: Option<String>,
}

fn default_loop_count() -> u32 {
    1
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            loop_count: default_loop_count(),
            loop_pause_ms: 0,
            background_asset: None,
        }
    }
}

/// Read-only snapshot of an alert for context reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Opaque unique token.
    pub token: String,
    /// Alert type name.
    pub type_name: String,
    /// Scheduled fire time, RFC 3339.
    pub scheduled_time: String,
}

struct AlertInner {
    scheduled_iso: String,
    scheduled_unix: i64,
    state: AlertState,
    focus: FocusState,
    stop_reason: StopReason,
    assets: AssetConfig,
    renderer: Option<Arc<dyn AlertRenderer>>,
    sink: Option<Arc<dyn AlertObserver>>,
}

/// A scheduled notification at a wall-clock instant.
pub struct Alert {
    token: String,
    type_name: String,
    weak: Weak<Alert>,
    inner: Mutex<AlertInner>,
}

impl Alert {
    /// Create an alert in state `Set`, scheduled at `scheduled_iso`
    /// (RFC 3339).
    pub fn new(
        token: impl Into<String>,
        type_name: impl Into<String>,
        scheduled_iso: &str,
    ) -> Result<Arc<Self>> {
        let scheduled_unix = parse_rfc3339(scheduled_iso)?;
        Ok(Arc::new_cyclic(|weak| Self {
            token: token.into(),
            type_name: type_name.into(),
            weak: weak.clone(),
            inner: Mutex::new(AlertInner {
                scheduled_iso: scheduled_iso.to_owned(),
                scheduled_unix,
                state: AlertState::Set,
                focus: FocusState::None,
                stop_reason: StopReason::Unset,
                assets: AssetConfig::default(),
                renderer: None,
                sink: None,
            }),
        }))
    }

    /// Reconstruct an alert from its persisted record, preserving the
    /// last-committed state.
    pub fn from_record(record: &AlertRecord) -> Result<Arc<Self>> {
        let alert = Self::new(&record.token, &record.type_name, &record.scheduled_iso)?;
        {
            let mut inner = alert.lock_inner();
            inner.state = record.state;
            inner.assets = record.assets.clone();
        }
        Ok(alert)
    }

    /// Snapshot this alert as a persistable record.
    pub fn to_record(&self) -> AlertRecord {
        let inner = self.lock_inner();
        AlertRecord {
            token: self.token.clone(),
            type_name: self.type_name.clone(),
            scheduled_iso: inner.scheduled_iso.clone(),
            state: inner.state,
            assets: inner.assets.clone(),
        }
    }

    /// Opaque unique token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Alert type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Scheduled fire time, RFC 3339.
    pub fn scheduled_iso(&self) -> String {
        self.lock_inner().scheduled_iso.clone()
    }

    /// Scheduled fire time, Unix seconds.
    pub fn scheduled_unix(&self) -> i64 {
        self.lock_inner().scheduled_unix
    }

    /// Current state-machine state.
    pub fn state(&self) -> AlertState {
        self.lock_inner().state
    }

    /// Current focus level.
    pub fn focus_state(&self) -> FocusState {
        self.lock_inner().focus
    }

    /// Replace the asset configuration.
    pub fn set_assets(&self, assets: AssetConfig) {
        self.lock_inner().assets = assets;
    }

    /// Bind the renderer used for audible output.
    pub fn set_renderer(&self, renderer: Arc<dyn AlertRenderer>) {
        self.lock_inner().renderer = Some(renderer);
    }

    /// Bind the sink that receives this alert's state transitions.
    pub fn set_observer(&self, sink: Arc<dyn AlertObserver>) {
        self.lock_inner().sink = Some(sink);
    }

    /// Record the focus level granted by the focus authority.
    pub fn set_focus_state(&self, focus: FocusState) {
        self.lock_inner().focus = focus;
    }

    /// Returns `true` if the scheduled time precedes `now - tolerance_secs`.
    pub fn is_past_due(&self, now: i64, tolerance_secs: i64) -> bool {
        self.lock_inner().scheduled_unix < now - tolerance_secs
    }

    /// Return the state machine to `Set`, as after initial scheduling.
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.state = AlertState::Set;
        inner.stop_reason = StopReason::Unset;
    }

    /// Move the schedule to `new_iso`. Fails on an unparseable time,
    /// leaving the previous schedule in place.
    pub fn update_scheduled_time(&self, new_iso: &str) -> Result<()> {
        let scheduled_unix = parse_rfc3339(new_iso)?;
        let mut inner = self.lock_inner();
        inner.scheduled_iso = new_iso.to_owned();
        inner.scheduled_unix = scheduled_unix;
        Ok(())
    }

    /// Begin activation: enter `Activating` and start the renderer.
    ///
    /// Ignored if activation is already underway.
    pub fn activate(&self) {
        let renderer = {
            let mut inner = self.lock_inner();
            if matches!(inner.state, AlertState::Activating | AlertState::Active) {
                debug!(token = %self.token, "activation already underway");
                return;
            }
            inner.state = AlertState::Activating;
            inner.renderer.clone()
        };

        let Some(this) = self.weak.upgrade() else {
            return;
        };
        match renderer {
            Some(renderer) => renderer.start(this as Arc<dyn RendererObserver>),
            None => self.post(LifecycleState::Error, "no renderer bound"),
        }
    }

    /// Request a stop with `reason`: enter `Stopping` and stop the
    /// renderer. Ignored unless the alert is activating or active.
    pub fn deactivate(&self, reason: StopReason) {
        let renderer = {
            let mut inner = self.lock_inner();
            if !matches!(inner.state, AlertState::Activating | AlertState::Active) {
                debug!(token = %self.token, state = %inner.state, "deactivate ignored");
                return;
            }
            inner.state = AlertState::Stopping;
            inner.stop_reason = reason;
            inner.renderer.clone()
        };

        if let Some(renderer) = renderer {
            renderer.stop();
        }
    }

    /// Reschedule to `new_iso` and enter `Snoozing`; the renderer stop
    /// completes the transition to `Snoozed`.
    pub fn snooze(&self, new_iso: &str) -> Result<()> {
        let scheduled_unix = parse_rfc3339(new_iso)?;
        let renderer = {
            let mut inner = self.lock_inner();
            inner.scheduled_iso = new_iso.to_owned();
            inner.scheduled_unix = scheduled_unix;
            inner.state = AlertState::Snoozing;
            inner.renderer.clone()
        };

        if let Some(renderer) = renderer {
            renderer.stop();
        }
        Ok(())
    }

    /// Commit the `Activating` → `Active` transition.
    pub(crate) fn set_state_active(&self) {
        self.lock_inner().state = AlertState::Active;
    }

    /// Read-only context snapshot.
    pub fn context_info(&self) -> AlertContext {
        let inner = self.lock_inner();
        AlertContext {
            token: self.token.clone(),
            type_name: self.type_name.clone(),
            scheduled_time: inner.scheduled_iso.clone(),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, AlertInner> {
        self.inner.lock().expect("alert mutex poisoned")
    }

    /// Forward a lifecycle event to the bound sink, outside the alert lock.
    fn post(&self, state: LifecycleState, reason: &str) {
        let sink = self.lock_inner().sink.clone();
        if let Some(sink) = sink {
            sink.on_alert_state_change(&self.token, &self.type_name, state, reason);
        }
    }
}

impl std::fmt::Debug for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("Alert")
            .field("token", &self.token)
            .field("type_name", &self.type_name)
            .field("scheduled_iso", &inner.scheduled_iso)
            .field("state", &inner.state)
            .finish()
    }
}

impl RendererObserver for Alert {
    fn on_renderer_state_change(&self, state: RendererState) {
        debug!(token = %self.token, ?state, "renderer state change");
        match state {
            RendererState::Started => {
                let started = self.lock_inner().state == AlertState::Activating;
                if started {
                    self.post(LifecycleState::Started, "");
                }
            }
            RendererState::Stopped => {
                let event = {
                    let mut inner = self.lock_inner();
                    match inner.state {
                        AlertState::Stopping => {
                            inner.state = AlertState::Stopped;
                            Some((LifecycleState::Stopped, inner.stop_reason.to_string()))
                        }
                        AlertState::Snoozing => {
                            inner.state = AlertState::Snoozed;
                            Some((LifecycleState::Snoozed, String::new()))
                        }
                        _ => None,
                    }
                };
                if let Some((state, reason)) = event {
                    self.post(state, &reason);
                }
            }
            RendererState::Completed => {
                self.lock_inner().state = AlertState::Completed;
                self.post(LifecycleState::Completed, "");
            }
            RendererState::Error(message) => {
                self.post(LifecycleState::Error, &message);
            }
        }
    }
}

/// Parse an RFC 3339 instant into Unix seconds.
fn parse_rfc3339(iso: &str) -> Result<i64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(iso)
        .map_err(|e| AlertError::Time(format!("invalid RFC 3339 time '{iso}': {e}")))?;
    Ok(parsed.timestamp())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::{RecordingObserver, ScriptedRenderer};

    fn iso_at(unix: i64) -> String {
        chrono::DateTime::from_timestamp(unix, 0)
            .expect("valid timestamp")
            .to_rfc3339()
    }

    #[test]
    fn new_alert_parses_schedule() {
        let alert = Alert::new("tok-1", "ALARM", "2026-08-02T10:00:00+00:00").unwrap();
        assert_eq!(alert.state(), AlertState::Set);
        assert_eq!(alert.scheduled_unix(), 1_785_664_800);
        assert_eq!(alert.scheduled_iso(), "2026-08-02T10:00:00+00:00");
    }

    #[test]
    fn new_alert_rejects_garbage_time() {
        let result = Alert::new("tok-1", "ALARM", "tomorrow-ish");
        assert!(matches!(result, Err(AlertError::Time(_))));
    }

    #[test]
    fn past_due_is_strict() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(1_000)).unwrap();
        assert!(!alert.is_past_due(1_030, 30));
        assert!(alert.is_past_due(1_031, 30));
    }

    #[test]
    fn update_scheduled_time_keeps_old_value_on_parse_failure() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(1_000)).unwrap();
        assert!(alert.update_scheduled_time("not-a-time").is_err());
        assert_eq!(alert.scheduled_unix(), 1_000);
    }

    #[test]
    fn record_round_trip_preserves_state_and_assets() {
        let alert = Alert::new("tok-1", "TIMER", &iso_at(5_000)).unwrap();
        alert.set_assets(AssetConfig {
            assets: vec![AssetRecord {
                id: "a".to_owned(),
                url: "https://example.com/a.mp3".to_owned(),
            }],
            loop_count: 3,
            loop_pause_ms: 500,
            background_asset: Some("a".to_owned()),
        });
        alert.set_state_active();

        let record = alert.to_record();
        assert_eq!(record.state, AlertState::Active);

        let restored = Alert::from_record(&record).unwrap();
        assert_eq!(restored.state(), AlertState::Active);
        assert_eq!(restored.to_record(), record);
    }

    #[test]
    fn reset_returns_to_set() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        alert.set_state_active();
        alert.reset();
        assert_eq!(alert.state(), AlertState::Set);
    }

    #[test]
    fn activation_drives_started_event() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        let sink = RecordingObserver::new();
        alert.set_renderer(renderer);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();

        assert_eq!(alert.state(), AlertState::Activating);
        assert_eq!(sink.states_for("tok-1"), vec![LifecycleState::Started]);
    }

    #[test]
    fn activation_waits_for_renderer_start() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        renderer.set_auto_start(false);
        let sink = RecordingObserver::new();
        alert.set_renderer(Arc::clone(&renderer) as Arc<dyn AlertRenderer>);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();
        assert_eq!(alert.state(), AlertState::Activating);
        assert!(sink.events().is_empty());

        renderer.emit(RendererState::Started);
        assert_eq!(sink.states_for("tok-1"), vec![LifecycleState::Started]);
    }

    #[test]
    fn deactivation_waits_for_renderer_stop() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        renderer.set_auto_stop(false);
        let sink = RecordingObserver::new();
        alert.set_renderer(Arc::clone(&renderer) as Arc<dyn AlertRenderer>);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();
        alert.deactivate(StopReason::RemoteStop);
        assert_eq!(alert.state(), AlertState::Stopping);
        assert_eq!(renderer.stop_count(), 1);

        renderer.emit(RendererState::Stopped);
        assert_eq!(alert.state(), AlertState::Stopped);
        let events = sink.events();
        assert_eq!(events.last().unwrap().reason, "remote_stop");
    }

    #[test]
    fn deactivate_reports_stop_reason() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        let sink = RecordingObserver::new();
        alert.set_renderer(renderer);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();
        alert.deactivate(StopReason::LocalStop);

        assert_eq!(alert.state(), AlertState::Stopped);
        let events = sink.events();
        let stopped = events
            .iter()
            .find(|e| e.state == LifecycleState::Stopped)
            .expect("stopped event");
        assert_eq!(stopped.reason, "local_stop");
    }

    #[test]
    fn deactivate_without_activation_is_ignored() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let sink = RecordingObserver::new();
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.deactivate(StopReason::LocalStop);

        assert_eq!(alert.state(), AlertState::Set);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn snooze_transitions_through_snoozing_to_snoozed() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        let sink = RecordingObserver::new();
        alert.set_renderer(renderer);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();
        alert.snooze(&iso_at(9_000)).unwrap();

        assert_eq!(alert.state(), AlertState::Snoozed);
        assert_eq!(alert.scheduled_unix(), 9_000);
        assert!(
            sink.events()
                .iter()
                .any(|e| e.state == LifecycleState::Snoozed)
        );
    }

    #[test]
    fn renderer_completion_marks_completed() {
        let alert = Alert::new("tok-1", "TIMER", &iso_at(5_000)).unwrap();
        let renderer = ScriptedRenderer::new();
        let sink = RecordingObserver::new();
        alert.set_renderer(Arc::clone(&renderer) as Arc<dyn AlertRenderer>);
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();
        renderer.emit(RendererState::Completed);

        assert_eq!(alert.state(), AlertState::Completed);
        assert!(
            sink.events()
                .iter()
                .any(|e| e.state == LifecycleState::Completed)
        );
    }

    #[test]
    fn activation_without_renderer_posts_error() {
        let alert = Alert::new("tok-1", "ALARM", &iso_at(5_000)).unwrap();
        let sink = RecordingObserver::new();
        alert.set_observer(Arc::clone(&sink) as Arc<dyn AlertObserver>);

        alert.activate();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, LifecycleState::Error);
    }
}
