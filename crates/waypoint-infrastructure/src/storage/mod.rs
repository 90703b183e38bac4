//! Storage layer: lock files and the state store backends.

mod dir_store;
mod file_lock;
mod local_store;
mod memory_store;

pub use dir_store::DirStore;
pub(crate) use file_lock::{FileLock, temp_path};
pub use local_store::LocalStore;
pub use memory_store::MemoryStore;
