//! The externally visible per-device snapshot.

use serde::{Deserialize, Serialize};

use super::device::{CounterRecord, DeviceIdentity};
use super::topology::{DeviceTopology, QueueAttributes};

/// One point-in-time capture of a device.
///
/// `captured_at` is microseconds since the Unix epoch and strictly increases
/// across snapshots of the same device committed to one store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub identity: DeviceIdentity,
    pub counters: CounterRecord,
    pub topology: DeviceTopology,
    pub queue: QueueAttributes,
    pub captured_at: i64,
}

impl DeviceSnapshot {
    pub fn name(&self) -> &str {
        &self.identity.name
    }
}
