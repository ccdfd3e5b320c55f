//! Upward notification contract.

use crate::types::LifecycleState;

/// Sink for alert lifecycle notifications.
///
/// One observer at a time, bound at scheduler initialization. Calls arrive
/// on the scheduler's executor thread, in submission order, never while
/// the scheduler lock is held. Multiplexing to several consumers belongs
/// to a higher layer.
pub trait AlertObserver: Send + Sync {
    /// Report that `token` (of type `type_name`) reached `state`.
    ///
    /// `reason` carries the stop reason or error detail where one applies,
    /// and is empty otherwise.
    fn on_alert_state_change(
        &self,
        token: &str,
        type_name: &str,
        state: LifecycleState,
        reason: &str,
    );
}
