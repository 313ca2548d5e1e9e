//! Data models for collected block-device state.
//!
//! - [`device`]: device numbers, identities and diskstats counters
//! - [`topology`]: hierarchy classification and queue attributes
//! - [`snapshot`]: the merged per-device record handed to consumers

mod device;
mod snapshot;
mod topology;

pub use device::{CounterLayout, CounterRecord, DeviceIdentity, DeviceNumber};
pub use snapshot::DeviceSnapshot;
pub use topology::{DeviceClass, DeviceTopology, QueueAttribute, QueueAttributes};
