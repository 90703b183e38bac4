//! Application layer for Waypoint.
//!
//! This crate provides the session lifecycle service, the per-window
//! auto-save controller and the helpers built on it: form persistence and
//! the error boundary.

pub mod error_boundary;
pub mod forms;
pub mod session;
pub mod window;

pub use error_boundary::{CheckpointSink, ErrorBoundary, LifecycleSink};
pub use forms::SessionForm;
pub use session::{SessionLifecycleService, SessionUpdater};
pub use window::{AutoSaveController, SessionHandle, SessionManager, SyncHub};
