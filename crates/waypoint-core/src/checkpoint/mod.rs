//! Recovery points: window-local pointers with their eviction policy, and
//! the server-side records written on every lifecycle event.

mod point;
mod repository;
mod stored;

pub use point::{RecoveryPoint, SnapshotType, enforce_limit, merge_point, recent};
pub use repository::RecoveryPointRepository;
pub use stored::{RecoveryKind, StoredRecoveryPoint, tags};
