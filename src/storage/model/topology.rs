//! Block-device hierarchy classification and queue attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::device::DeviceIdentity;

/// Position of a device in the sysfs block hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    WholeDisk,
    Partition,
    /// NVMe namespace (`nvme0n1`).
    Namespace,
    /// Partition of an NVMe namespace (`nvme0n1p1`).
    NamespacePartition,
    /// Software RAID (`md127`).
    Raid,
    /// Device-mapper volume (`dm-0`).
    DeviceMapper,
    #[default]
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::WholeDisk => "whole_disk",
            DeviceClass::Partition => "partition",
            DeviceClass::Namespace => "namespace",
            DeviceClass::NamespacePartition => "namespace_partition",
            DeviceClass::Raid => "raid",
            DeviceClass::DeviceMapper => "device_mapper",
            DeviceClass::Unknown => "unknown",
        }
    }

    /// Whether the device is a slice of another device.
    pub fn is_partition(&self) -> bool {
        matches!(
            self,
            DeviceClass::Partition | DeviceClass::NamespacePartition
        )
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome for one device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTopology {
    pub class: DeviceClass,

    /// Owning whole disk or namespace, for partitions. A relation only.
    pub parent: Option<DeviceIdentity>,

    /// Canonical sysfs directory of the device itself (`size`, `inflight`).
    pub device_path: Option<PathBuf>,

    /// Directory whose `queue/` subdirectory holds the queue attributes.
    /// For partitions this is the parent device's directory.
    pub attribute_path: Option<PathBuf>,

    /// Member devices from `slaves/` (raid and device-mapper).
    #[serde(default)]
    pub slaves: Vec<String>,

    /// `dm/name` for device-mapper volumes, `md/level` for raid.
    #[serde(default)]
    pub label: Option<String>,
}

impl DeviceTopology {
    /// Topology of a device that could not be classified.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Files read from a device's sysfs directory.
///
/// Everything except `Inflight` and `Size` lives under `queue/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAttribute {
    Inflight,
    Size,
    DiscardGranularity,
    HwSectorSize,
    IoPoll,
    IoPollDelay,
    IoTimeout,
    Iostats,
    LogicalBlockSize,
    MaxHwSectorsKb,
    MaxSectorsKb,
    MinimumIoSize,
    Nomerges,
    OptimalIoSize,
    PhysicalBlockSize,
    ReadAheadKb,
    Rotational,
    RqAffinity,
    Scheduler,
    WriteCache,
}

impl QueueAttribute {
    pub const ALL: [QueueAttribute; 20] = [
        QueueAttribute::Inflight,
        QueueAttribute::Size,
        QueueAttribute::DiscardGranularity,
        QueueAttribute::HwSectorSize,
        QueueAttribute::IoPoll,
        QueueAttribute::IoPollDelay,
        QueueAttribute::IoTimeout,
        QueueAttribute::Iostats,
        QueueAttribute::LogicalBlockSize,
        QueueAttribute::MaxHwSectorsKb,
        QueueAttribute::MaxSectorsKb,
        QueueAttribute::MinimumIoSize,
        QueueAttribute::Nomerges,
        QueueAttribute::OptimalIoSize,
        QueueAttribute::PhysicalBlockSize,
        QueueAttribute::ReadAheadKb,
        QueueAttribute::Rotational,
        QueueAttribute::RqAffinity,
        QueueAttribute::Scheduler,
        QueueAttribute::WriteCache,
    ];

    /// File name inside the device or `queue/` directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            QueueAttribute::Inflight => "inflight",
            QueueAttribute::Size => "size",
            QueueAttribute::DiscardGranularity => "discard_granularity",
            QueueAttribute::HwSectorSize => "hw_sector_size",
            QueueAttribute::IoPoll => "io_poll",
            QueueAttribute::IoPollDelay => "io_poll_delay",
            QueueAttribute::IoTimeout => "io_timeout",
            QueueAttribute::Iostats => "iostats",
            QueueAttribute::LogicalBlockSize => "logical_block_size",
            QueueAttribute::MaxHwSectorsKb => "max_hw_sectors_kb",
            QueueAttribute::MaxSectorsKb => "max_sectors_kb",
            QueueAttribute::MinimumIoSize => "minimum_io_size",
            QueueAttribute::Nomerges => "nomerges",
            QueueAttribute::OptimalIoSize => "optimal_io_size",
            QueueAttribute::PhysicalBlockSize => "physical_block_size",
            QueueAttribute::ReadAheadKb => "read_ahead_kb",
            QueueAttribute::Rotational => "rotational",
            QueueAttribute::RqAffinity => "rq_affinity",
            QueueAttribute::Scheduler => "scheduler",
            QueueAttribute::WriteCache => "write_cache",
        }
    }

    /// Whether the file sits at the device root rather than under `queue/`.
    pub fn at_device_root(&self) -> bool {
        matches!(self, QueueAttribute::Inflight | QueueAttribute::Size)
    }
}

impl fmt::Display for QueueAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Raw, trimmed attribute values. A missing key means the file was absent
/// or unreadable on this device/kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueAttributes(BTreeMap<QueueAttribute, String>);

impl QueueAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: QueueAttribute, value: impl Into<String>) {
        self.0.insert(attribute, value.into());
    }

    pub fn get(&self, attribute: QueueAttribute) -> Option<&str> {
        self.0.get(&attribute).map(String::as_str)
    }

    pub fn contains(&self, attribute: QueueAttribute) -> bool {
        self.0.contains_key(&attribute)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueueAttribute, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
