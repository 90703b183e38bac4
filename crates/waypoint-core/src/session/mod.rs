//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `TimeEntry`, `DeviceInfo`)
//! - `repository`: Repository trait for session persistence

mod model;
mod repository;

pub use model::{
    DeviceInfo, Session, SessionError, SessionRefs, SessionStatus, TimeEntry, TimeEntryType,
};
pub use repository::SessionRepository;
