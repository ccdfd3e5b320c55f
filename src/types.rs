//! State taxonomy shared across the alert subsystem.
//!
//! Defines the internal per-alert state machine states, the lifecycle
//! states delivered to observers, stop reasons, and audio-focus levels.

use serde::{Deserialize, Serialize};

/// Well-known alert type name for alarms.
pub const ALERT_TYPE_ALARM: &str = "ALARM";

/// Well-known alert type name for countdown timers.
pub const ALERT_TYPE_TIMER: &str = "TIMER";

/// Well-known alert type name for reminders.
pub const ALERT_TYPE_REMINDER: &str = "REMINDER";

/// Internal state of a single alert's state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// Placeholder before the alert has a valid schedule. Never persisted
    /// by a healthy scheduler.
    #[default]
    Unset,
    /// Scheduled and waiting for its fire time.
    Set,
    /// Activation requested; waiting for the renderer to start.
    Activating,
    /// Audibly (or silently, under background focus) rendering.
    Active,
    /// Snooze requested; waiting for the renderer to stop.
    Snoozing,
    /// Snoozed and rescheduled to a later instant.
    Snoozed,
    /// Stop requested; waiting for the renderer to stop.
    Stopping,
    /// Stopped by a deliberate request.
    Stopped,
    /// Ran to natural completion.
    Completed,
}

impl AlertState {
    /// Storage-stable name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Set => "set",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Snoozing => "snoozing",
            Self::Snoozed => "snoozed",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }

    /// Parse a storage-stable state name. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "unset" => Some(Self::Unset),
            "set" => Some(Self::Set),
            "activating" => Some(Self::Activating),
            "active" => Some(Self::Active),
            "snoozing" => Some(Self::Snoozing),
            "snoozed" => Some(Self::Snoozed),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state delivered to observers.
///
/// A subset (`Ready`, `Started`, `Stopped`, `Completed`, `Snoozed`,
/// `Error`) is also reported inbound by alerts themselves; the rest are
/// generated by the scheduler for observer consumption only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The alert's fire time has arrived; it is ready for activation.
    Ready,
    /// The renderer started for this alert.
    Started,
    /// The alert stopped on request.
    Stopped,
    /// The alert ran to natural completion.
    Completed,
    /// The alert was snoozed and rescheduled.
    Snoozed,
    /// The alert was found past due and will never fire.
    PastDue,
    /// The active alert gained foreground focus.
    FocusEnteredForeground,
    /// The active alert was pushed to background focus.
    FocusEnteredBackground,
    /// The alert was erased from storage.
    Deleted,
    /// The alert failed at runtime and was discarded.
    Error,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Snoozed => "snoozed",
            Self::PastDue => "past_due",
            Self::FocusEnteredForeground => "focus_entered_foreground",
            Self::FocusEnteredBackground => "focus_entered_background",
            Self::Deleted => "deleted",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why an active alert was told to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// No stop has been requested yet.
    #[default]
    Unset,
    /// The upstream platform asked for the stop.
    RemoteStop,
    /// A local interaction (button, voice command) asked for the stop.
    LocalStop,
    /// The device is shutting down.
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::RemoteStop => "remote_stop",
            Self::LocalStop => "local_stop",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Audio-focus level granted by the external focus authority.
///
/// Only `Foreground` grants audible rendering; `Background` keeps the
/// active alert alive but silent; `None` deactivates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FocusState {
    /// No focus; nothing may render.
    #[default]
    None,
    /// Background focus; the active alert stays active but silent.
    Background,
    /// Foreground focus; the active alert renders audibly.
    Foreground,
}

impl std::fmt::Display for FocusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Background => "background",
            Self::Foreground => "foreground",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn alert_state_name_round_trip() {
        for state in [
            AlertState::Unset,
            AlertState::Set,
            AlertState::Activating,
            AlertState::Active,
            AlertState::Snoozing,
            AlertState::Snoozed,
            AlertState::Stopping,
            AlertState::Stopped,
            AlertState::Completed,
        ] {
            assert_eq!(AlertState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn alert_state_parse_rejects_unknown() {
        assert_eq!(AlertState::parse("exploded"), None);
    }

    #[test]
    fn alert_state_serde_uses_snake_case() {
        let json = serde_json::to_string(&AlertState::Activating).unwrap();
        assert_eq!(json, "\"activating\"");
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(StopReason::RemoteStop.to_string(), "remote_stop");
        assert_eq!(StopReason::LocalStop.to_string(), "local_stop");
    }

    #[test]
    fn focus_state_defaults_to_none() {
        assert_eq!(FocusState::default(), FocusState::None);
    }
}
