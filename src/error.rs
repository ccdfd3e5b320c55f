//! Error types for the alert scheduler.

/// Top-level error type for alert scheduling.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// Scheduler lifecycle or configuration error (unusable storage on
    /// initialize, operation after shutdown).
    #[error("config error: {0}")]
    Config(String),

    /// Wall-clock read failed; the affected operation left state unchanged.
    #[error("time error: {0}")]
    Time(String),

    /// Storage open/read/write failed; in-memory state was kept consistent
    /// with what storage actually committed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation rejected by scheduling rules (past-due alert, snooze or
    /// update against an alert that is not in the required state).
    #[error("schedule violation: {0}")]
    ScheduleViolation(String),

    /// Internal invariant breached; the operation aborted without mutation.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Runtime failure surfaced by an alert (renderer error).
    #[error("alert runtime error: {0}")]
    AlertRuntime(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AlertError>;
