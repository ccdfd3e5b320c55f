//! Chime: persistent, focus-aware alert scheduling for voice devices.
//!
//! Manages a set of time-triggered alerts (alarms, timers, reminders):
//! orders them by fire time, arms exactly one wall-clock timer for the
//! earliest due alert, drives each alert's state machine through
//! activation, coordinates audible rendering with an external audio-focus
//! authority, and persists every state-affecting change so the alert set
//! survives restarts.
//!
//! # Architecture
//!
//! The [`AlertScheduler`] owns an ordered set of [`Alert`]s plus an
//! at-most-one active alert, all guarded by a single mutex. Alerts report
//! their state transitions through a capability sink that bounces onto a
//! serial executor thread, which performs storage updates and delivers
//! observer notifications in submission order, never on a caller's
//! thread and never under the scheduler lock. Audio rendering
//! ([`AlertRenderer`]), durable storage ([`AlertStorage`]), wall-clock
//! time ([`Clock`]), and the upstream observer ([`AlertObserver`]) are
//! trait seams supplied by the host.

pub mod alert;
pub mod config;
pub mod error;
pub mod executor;
pub mod observer;
pub mod renderer;
pub mod scheduler;
pub mod storage;
pub mod test_utils;
pub mod time;
pub mod timer;
pub mod types;

pub use alert::{Alert, AlertContext, AssetConfig, AssetRecord};
pub use config::SchedulerConfig;
pub use error::{AlertError, Result};
pub use observer::AlertObserver;
pub use renderer::{AlertRenderer, RendererObserver, RendererState};
pub use scheduler::{AlertScheduler, AlertsContext};
pub use storage::{AlertRecord, AlertStorage, SqliteAlertStorage};
pub use time::{Clock, SystemClock};
pub use timer::SingleShotTimer;
pub use types::{AlertState, FocusState, LifecycleState, StopReason};
