//! Domain layer for Waypoint: sessions, recovery points, the state store
//! contract and the ambient pieces (errors, clock, config) shared by every
//! other crate.

pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod request;
pub mod session;
pub mod state;

// Re-export common error type
pub use error::WaypointError;
