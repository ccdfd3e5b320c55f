//! Alert rendering contract.
//!
//! A renderer turns an alert's asset configuration into audible output.
//! Rendering is driven by the alert entity, never by the scheduler; the
//! renderer reports progress back through [`RendererObserver`], typically
//! from its own playback thread.

use std::sync::Arc;

/// Playback lifecycle events emitted by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererState {
    /// Rendering started.
    Started,
    /// Rendering stopped on request.
    Stopped,
    /// Rendering finished naturally (all loops played).
    Completed,
    /// Rendering failed.
    Error(String),
}

/// Sink for renderer lifecycle events. Implemented by the alert entity.
pub trait RendererObserver: Send + Sync {
    /// Called by the renderer whenever its playback state changes.
    fn on_renderer_state_change(&self, state: RendererState);
}

/// Starts and stops audible rendering of an alert on command.
pub trait AlertRenderer: Send + Sync {
    /// Begin rendering, reporting progress to `observer`.
    fn start(&self, observer: Arc<dyn RendererObserver>);

    /// Stop rendering. The renderer reports `Stopped` once playback has
    /// actually ceased, or `Completed` if it finished before the stop
    /// landed.
    fn stop(&self);
}
