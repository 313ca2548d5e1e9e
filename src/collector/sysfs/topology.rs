//! Classification of block devices from the `/sys/dev/block` hierarchy.
//!
//! `/sys/dev/block/<major>:<minor>` is a symlink into `/sys/devices`. The
//! shape of the canonical path, the device name and a few marker files
//! decide the class:
//!
//! ```text
//! .../block/sda                          whole_disk
//! .../block/sda/sda1          (partition) partition, parent sda
//! .../nvme/nvme0/nvme0n1                 namespace
//! .../nvme/nvme0/nvme0n1/nvme0n1p1       namespace_partition, parent nvme0n1
//! .../virtual/block/md127                raid
//! .../virtual/block/dm-0                 device_mapper
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;
use crate::storage::model::{DeviceClass, DeviceIdentity, DeviceNumber, DeviceTopology};

/// Name of a device split into its NVMe parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NvmeName<'a> {
    /// Namespace name without any partition suffix (`nvme0n1`).
    namespace: &'a str,
    partition: Option<u32>,
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Matches `nvme<ctrl>[c<path>]n<ns>[p<part>]`.
fn parse_nvme_name(name: &str) -> Option<NvmeName<'_>> {
    let rest = name.strip_prefix("nvme")?;

    let ctrl_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if ctrl_len == 0 {
        return None;
    }
    let mut rest = &rest[ctrl_len..];

    // Multipath controller path, e.g. nvme0c1n1
    if let Some(after_c) = rest.strip_prefix('c') {
        let path_len = after_c.bytes().take_while(u8::is_ascii_digit).count();
        if path_len == 0 {
            return None;
        }
        rest = &after_c[path_len..];
    }

    let after_n = rest.strip_prefix('n')?;
    let ns_len = after_n.bytes().take_while(u8::is_ascii_digit).count();
    if ns_len == 0 {
        return None;
    }
    let suffix = &after_n[ns_len..];
    let namespace = &name[..name.len() - suffix.len()];

    if suffix.is_empty() {
        return Some(NvmeName {
            namespace,
            partition: None,
        });
    }

    let part = suffix.strip_prefix('p')?;
    if !all_digits(part) {
        return None;
    }
    Some(NvmeName {
        namespace,
        partition: part.parse().ok(),
    })
}

/// Matches `md<N>`.
fn is_raid_name(name: &str) -> bool {
    name.strip_prefix("md").is_some_and(all_digits)
}

/// Matches `dm-<N>`.
fn is_device_mapper_name(name: &str) -> bool {
    name.strip_prefix("dm-").is_some_and(all_digits)
}

/// Resolves device numbers to their position in the sysfs block hierarchy.
pub struct TopologyResolver<F: FileSystem> {
    fs: F,
    sys_path: PathBuf,
}

impl<F: FileSystem> TopologyResolver<F> {
    /// Creates a resolver rooted at `sys_path` (usually "/sys").
    pub fn new(fs: F, sys_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            sys_path: sys_path.into(),
        }
    }

    /// Path of the device-number symlink for `devnum`.
    pub fn devnum_link(&self, devnum: DeviceNumber) -> PathBuf {
        self.sys_path
            .join("dev")
            .join("block")
            .join(devnum.to_string())
    }

    /// Classifies the device `name` with device number `devnum`.
    ///
    /// `known` maps device names seen in the same poll to their numbers; it
    /// is consulted when a parent's `dev` file cannot be read.
    ///
    /// Fails with `TopologyUnresolved` on a missing or broken symlink or a
    /// path shape that matches none of the known classes.
    pub fn resolve(
        &self,
        name: &str,
        devnum: DeviceNumber,
        known: &HashMap<String, DeviceNumber>,
    ) -> Result<DeviceTopology, CollectError> {
        let unresolved = |reason: String| CollectError::TopologyUnresolved {
            device: name.to_string(),
            reason,
        };

        let link = self.devnum_link(devnum);
        let canonical = self
            .fs
            .canonicalize(&link)
            .map_err(|e| unresolved(format!("cannot resolve {}: {}", link.display(), e)))?;
        trace!(device = name, path = %canonical.display(), "resolved device link");

        let dir_name = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| unresolved(format!("no device name in {}", canonical.display())))?;
        if dir_name != name {
            warn!(
                device = name,
                sysfs_name = dir_name,
                "sysfs name differs from diskstats name, classifying by sysfs name"
            );
        }

        let parent_dir = canonical
            .parent()
            .ok_or_else(|| unresolved(format!("{} has no parent", canonical.display())))?;
        let is_partition = self.fs.exists(&canonical.join("partition"));

        let mut topology = DeviceTopology {
            device_path: Some(canonical.clone()),
            attribute_path: Some(canonical.clone()),
            ..DeviceTopology::default()
        };

        if let Some(nvme) = parse_nvme_name(dir_name) {
            if nvme.partition.is_some() {
                topology.class = DeviceClass::NamespacePartition;
                topology.parent = self.parent_identity(nvme.namespace, parent_dir, known);
                topology.attribute_path = Some(parent_dir.to_path_buf());
            } else {
                topology.class = DeviceClass::Namespace;
            }
        } else if is_partition {
            let parent_name = parent_dir
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| unresolved(format!("{} has no parent", canonical.display())))?;
            topology.class = DeviceClass::Partition;
            topology.parent = self.parent_identity(parent_name, parent_dir, known);
            topology.attribute_path = Some(parent_dir.to_path_buf());
        } else if is_raid_name(dir_name) {
            topology.class = DeviceClass::Raid;
            topology.slaves = self.slaves(&canonical);
            topology.label = self.read_trimmed(&canonical.join("md").join("level"));
        } else if is_device_mapper_name(dir_name) {
            topology.class = DeviceClass::DeviceMapper;
            topology.slaves = self.slaves(&canonical);
            topology.label = self.read_trimmed(&canonical.join("dm").join("name"));
        } else if parent_dir.file_name().is_some_and(|n| n == "block") {
            topology.class = DeviceClass::WholeDisk;
        } else {
            return Err(unresolved(format!(
                "unexpected sysfs path shape {}",
                canonical.display()
            )));
        }

        Ok(topology)
    }

    /// Identity of the owning device, from its `dev` file or the poll's
    /// name map.
    fn parent_identity(
        &self,
        parent_name: &str,
        parent_dir: &Path,
        known: &HashMap<String, DeviceNumber>,
    ) -> Option<DeviceIdentity> {
        let devnum = self
            .read_trimmed(&parent_dir.join("dev"))
            .and_then(|s| s.parse::<DeviceNumber>().ok())
            .or_else(|| known.get(parent_name).copied());

        match devnum {
            Some(devnum) => Some(DeviceIdentity::new(parent_name, devnum)),
            None => {
                warn!(parent = parent_name, "cannot determine parent device number");
                None
            }
        }
    }

    /// Names of member devices listed under `slaves/`, sorted.
    fn slaves(&self, device_path: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .fs
            .read_dir(&device_path.join("slaves"))
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    fn read_trimmed(&self, path: &Path) -> Option<String> {
        self.fs
            .read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn resolver() -> TopologyResolver<MockFs> {
        TopologyResolver::new(MockFs::typical_host(), "/sys")
    }

    fn resolve(name: &str, major: u32, minor: u32) -> Result<DeviceTopology, CollectError> {
        resolver().resolve(name, DeviceNumber::new(major, minor), &HashMap::new())
    }

    #[test]
    fn test_parse_nvme_name() {
        assert_eq!(
            parse_nvme_name("nvme0n1"),
            Some(NvmeName {
                namespace: "nvme0n1",
                partition: None
            })
        );
        assert_eq!(
            parse_nvme_name("nvme12n3p14"),
            Some(NvmeName {
                namespace: "nvme12n3",
                partition: Some(14)
            })
        );
        assert_eq!(
            parse_nvme_name("nvme0c1n1"),
            Some(NvmeName {
                namespace: "nvme0c1n1",
                partition: None
            })
        );
        assert_eq!(parse_nvme_name("nvme0"), None);
        assert_eq!(parse_nvme_name("nvmen1"), None);
        assert_eq!(parse_nvme_name("nvme0n1p"), None);
        assert_eq!(parse_nvme_name("nvme0n1x2"), None);
        assert_eq!(parse_nvme_name("sda"), None);
    }

    #[test]
    fn test_name_patterns() {
        assert!(is_raid_name("md0"));
        assert!(is_raid_name("md127"));
        assert!(!is_raid_name("md"));
        assert!(!is_raid_name("md127p1"));
        assert!(!is_raid_name("mmcblk0"));

        assert!(is_device_mapper_name("dm-0"));
        assert!(is_device_mapper_name("dm-12"));
        assert!(!is_device_mapper_name("dm-"));
        assert!(!is_device_mapper_name("dm0"));
    }

    #[test]
    fn test_whole_disk() {
        let topology = resolve("sda", 8, 0).unwrap();
        assert_eq!(topology.class, DeviceClass::WholeDisk);
        assert_eq!(topology.parent, None);
        assert_eq!(
            topology.device_path.as_deref(),
            Some(Path::new(
                "/sys/devices/pci0000:00/0000:00:17.0/ata1/host0/target0:0:0/0:0:0:0/block/sda"
            ))
        );
        assert_eq!(topology.attribute_path, topology.device_path);
    }

    #[test]
    fn test_partition() {
        let topology = resolve("sda1", 8, 1).unwrap();
        assert_eq!(topology.class, DeviceClass::Partition);
        assert_eq!(
            topology.parent,
            Some(DeviceIdentity::new("sda", DeviceNumber::new(8, 0)))
        );
        assert!(topology.device_path.as_ref().unwrap().ends_with("block/sda/sda1"));
        assert!(topology.attribute_path.as_ref().unwrap().ends_with("block/sda"));
    }

    #[test]
    fn test_namespace() {
        let topology = resolve("nvme0n1", 259, 0).unwrap();
        assert_eq!(topology.class, DeviceClass::Namespace);
        assert_eq!(topology.parent, None);
    }

    #[test]
    fn test_namespace_partition() {
        let topology = resolve("nvme0n1p1", 259, 1).unwrap();
        assert_eq!(topology.class, DeviceClass::NamespacePartition);
        assert_eq!(
            topology.parent,
            Some(DeviceIdentity::new("nvme0n1", DeviceNumber::new(259, 0)))
        );
        assert!(topology.attribute_path.as_ref().unwrap().ends_with("nvme0/nvme0n1"));
    }

    #[test]
    fn test_raid_without_partition_marker() {
        let topology = resolve("md127", 9, 127).unwrap();
        assert_eq!(topology.class, DeviceClass::Raid);
        assert_eq!(topology.slaves, vec!["sda2".to_string(), "sdb1".to_string()]);
        assert_eq!(topology.label.as_deref(), Some("raid1"));
    }

    #[test]
    fn test_device_mapper() {
        let topology = resolve("dm-0", 253, 0).unwrap();
        assert_eq!(topology.class, DeviceClass::DeviceMapper);
        assert_eq!(topology.slaves, vec!["nvme0n1p2".to_string()]);
        assert_eq!(topology.label.as_deref(), Some("vg0-root"));
    }

    #[test]
    fn test_broken_symlink_is_unresolved() {
        let err = resolve("sdc", 8, 32).unwrap_err();
        assert!(matches!(err, CollectError::TopologyUnresolved { ref device, .. } if device == "sdc"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_devnum_entry_is_unresolved() {
        assert!(resolve("sdz", 65, 160).is_err());
    }

    #[test]
    fn test_unexpected_shape_is_unresolved() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/devices/platform/weird/thing0/dev", "240:0\n");
        fs.add_symlink("/sys/dev/block/240:0", "../../devices/platform/weird/thing0");
        let resolver = TopologyResolver::new(fs, "/sys");

        let err = resolver
            .resolve("thing0", DeviceNumber::new(240, 0), &HashMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("unexpected sysfs path shape"));
    }

    #[test]
    fn test_parent_falls_back_to_known_devices() {
        let mut fs = MockFs::new();
        fs.add_dir("/sys/devices/virtual/block/vda");
        fs.add_file("/sys/devices/virtual/block/vda/vda1/partition", "1\n");
        fs.add_symlink("/sys/dev/block/252:1", "../../devices/virtual/block/vda/vda1");
        let resolver = TopologyResolver::new(fs, "/sys");

        let mut known = HashMap::new();
        known.insert("vda".to_string(), DeviceNumber::new(252, 0));

        let topology = resolver
            .resolve("vda1", DeviceNumber::new(252, 1), &known)
            .unwrap();
        assert_eq!(topology.class, DeviceClass::Partition);
        assert_eq!(
            topology.parent,
            Some(DeviceIdentity::new("vda", DeviceNumber::new(252, 0)))
        );

        let topology = resolver
            .resolve("vda1", DeviceNumber::new(252, 1), &HashMap::new())
            .unwrap();
        assert_eq!(topology.class, DeviceClass::Partition);
        assert_eq!(topology.parent, None);
    }

    #[test]
    fn test_partition_of_raid() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/devices/virtual/block/md0/dev", "9:0\n");
        fs.add_file("/sys/devices/virtual/block/md0/md0p1/partition", "1\n");
        fs.add_symlink("/sys/dev/block/259:9", "../../devices/virtual/block/md0/md0p1");
        let resolver = TopologyResolver::new(fs, "/sys");

        let topology = resolver
            .resolve("md0p1", DeviceNumber::new(259, 9), &HashMap::new())
            .unwrap();
        assert_eq!(topology.class, DeviceClass::Partition);
        assert_eq!(
            topology.parent,
            Some(DeviceIdentity::new("md0", DeviceNumber::new(9, 0)))
        );
    }
}
