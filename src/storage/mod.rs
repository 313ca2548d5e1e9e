//! Snapshot models and the latest-snapshot store.

pub mod model;
pub mod store;

pub use model::DeviceSnapshot;
pub use store::{CommitSummary, SnapshotStore, StoredSnapshot};
