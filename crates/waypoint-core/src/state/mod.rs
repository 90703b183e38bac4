//! Window-side state: the store contract, snapshots and the envelope that
//! wraps every persisted blob.

mod envelope;
mod snapshot;
mod store;

pub use envelope::{ErrorReport, STATE_SCHEMA_VERSION, StateBody, StateEnvelope};
pub use snapshot::AppSnapshot;
pub use store::{StateStore, StateStoreExt, StoreWrite, SyncStateStore, SyncStateStoreExt};
