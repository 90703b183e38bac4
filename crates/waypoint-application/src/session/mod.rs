//! Session application services.
//!
//! This module contains the server-side lifecycle service and the updater
//! helper every transition goes through.

mod lifecycle;
mod updater;

pub use lifecycle::{CompletionOutcome, LifecycleOutcome, SaveStateRequest, SessionLifecycleService};
pub use updater::SessionUpdater;
