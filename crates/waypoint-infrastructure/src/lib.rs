pub mod config_service;
pub mod dto;
pub mod memory_repository;
pub mod paths;
pub mod recovery_point_repository;
pub mod session_repository;
pub mod storage;
mod storage_repository;

pub use crate::config_service::ConfigService;
pub use crate::memory_repository::{InMemoryRecoveryPointRepository, InMemorySessionRepository};
pub use crate::paths::WaypointPaths;
pub use crate::recovery_point_repository::FileRecoveryPointRepository;
pub use crate::session_repository::FileSessionRepository;
pub use crate::storage::{DirStore, LocalStore, MemoryStore};
