//! Window-side session management.
//!
//! Each window runs one [`AutoSaveController`] around a [`SessionManager`].
//! Windows sharing a session id exchange checkpoint notifications through a
//! [`SyncHub`].

mod controller;
mod manager;
mod reset;
mod snapshot;
mod sync;

pub use controller::{AutoSaveController, SessionHandle};
pub use manager::{AUTO_SAVED, SESSION_STARTED, SessionManager, TAB_RESUMED, WINDOW_CLOSING};
pub use reset::{CountingReset, RuntimeReset};
pub use snapshot::{RestorePlan, collect_app_state};
pub use sync::{SyncEventType, SyncHub, SyncMessage};
