//! Reader for per-device sysfs attributes.

use std::io;
use std::path::Path;

use tracing::{debug, trace};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;
use crate::storage::model::{DeviceTopology, QueueAttribute, QueueAttributes};

/// Reads the fixed set of `QueueAttribute` files for a device.
///
/// Values are trimmed raw strings; nothing is interpreted here (the
/// scheduler's bracketed current entry is left as-is).
pub struct QueueAttributeReader<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> QueueAttributeReader<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Reads `inflight` and `size` from `device_path` and everything else
    /// from `attribute_path/queue/`.
    ///
    /// Missing files are omitted silently. Files that exist but cannot be
    /// read are omitted too and reported as `AttributeUnavailable`.
    pub fn read(
        &self,
        device: &str,
        device_path: &Path,
        attribute_path: &Path,
    ) -> (QueueAttributes, Vec<CollectError>) {
        let mut attributes = QueueAttributes::new();
        let mut errors = Vec::new();
        self.visit(device, device_path, attribute_path, |attribute, result| {
            match result {
                Ok(Some(value)) => attributes.insert(attribute, value),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
            true
        });
        (attributes, errors)
    }

    /// Reads attributes at the paths recorded in `topology`; an unresolved
    /// topology yields an empty set.
    pub fn read_for(
        &self,
        device: &str,
        topology: &DeviceTopology,
    ) -> (QueueAttributes, Vec<CollectError>) {
        match (&topology.device_path, &topology.attribute_path) {
            (Some(device_path), Some(attribute_path)) => {
                self.read(device, device_path, attribute_path)
            }
            _ => (QueueAttributes::new(), Vec::new()),
        }
    }

    /// Reads the attributes one at a time in `QueueAttribute::ALL` order,
    /// handing each result to `each` as soon as it is read.
    ///
    /// `Ok(None)` means the file does not exist. Stops early when `each`
    /// returns `false`.
    pub fn visit<E>(&self, device: &str, device_path: &Path, attribute_path: &Path, mut each: E)
    where
        E: FnMut(QueueAttribute, Result<Option<String>, CollectError>) -> bool,
    {
        let queue_dir = attribute_path.join("queue");

        for attribute in QueueAttribute::ALL {
            let path = if attribute.at_device_root() {
                device_path.join(attribute.file_name())
            } else {
                queue_dir.join(attribute.file_name())
            };

            let result = match self.fs.read_to_string(&path) {
                Ok(content) => Ok(Some(content.trim().to_string())),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(device, %attribute, "attribute not present");
                    Ok(None)
                }
                Err(source) => {
                    debug!(device, %attribute, "cannot read attribute: {}", source);
                    Err(CollectError::AttributeUnavailable {
                        device: device.to_string(),
                        attribute,
                        source,
                    })
                }
            };
            if !each(attribute, result) {
                break;
            }
        }
    }

    /// [`visit`](Self::visit) at the paths recorded in `topology`.
    pub fn visit_for<E>(&self, device: &str, topology: &DeviceTopology, each: E)
    where
        E: FnMut(QueueAttribute, Result<Option<String>, CollectError>) -> bool,
    {
        if let (Some(device_path), Some(attribute_path)) =
            (&topology.device_path, &topology.attribute_path)
        {
            self.visit(device, device_path, attribute_path, each);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::collector::sysfs::TopologyResolver;
    use crate::storage::model::DeviceNumber;
    use std::collections::HashMap;

    const NVME: &str = "/sys/devices/pci0000:00/0000:00:1d.0/0000:3d:00.0/nvme/nvme0/nvme0n1";

    #[test]
    fn test_read_full_attribute_set() {
        let reader = QueueAttributeReader::new(MockFs::typical_host());
        let (attrs, errors) = reader.read("nvme0n1", Path::new(NVME), Path::new(NVME));

        assert!(errors.is_empty());
        assert_eq!(attrs.len(), QueueAttribute::ALL.len());
        assert_eq!(attrs.get(QueueAttribute::Rotational), Some("0"));
        assert_eq!(attrs.get(QueueAttribute::Scheduler), Some("[none] mq-deadline"));
        let inflight: Vec<&str> = attrs
            .get(QueueAttribute::Inflight)
            .unwrap()
            .split_whitespace()
            .collect();
        assert_eq!(inflight, vec!["0", "0"]);
        assert_eq!(attrs.get(QueueAttribute::Size), Some("1000215216"));
        assert_eq!(attrs.get(QueueAttribute::WriteCache), Some("write back"));
    }

    #[test]
    fn test_missing_files_are_omitted() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/block/sdx/size", "2048\n");
        fs.add_file("/sys/block/sdx/queue/rotational", "1\n");
        let reader = QueueAttributeReader::new(fs);

        let (attrs, errors) = reader.read(
            "sdx",
            Path::new("/sys/block/sdx"),
            Path::new("/sys/block/sdx"),
        );
        assert!(errors.is_empty());
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get(QueueAttribute::Size), Some("2048"));
        assert!(!attrs.contains(QueueAttribute::Inflight));
        assert!(!attrs.contains(QueueAttribute::IoPollDelay));
    }

    #[test]
    fn test_permission_denied_is_absence() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/block/sdx/queue/rotational", "1\n");
        fs.add_unreadable("/sys/block/sdx/queue/io_timeout");
        let reader = QueueAttributeReader::new(fs);

        let (attrs, errors) = reader.read(
            "sdx",
            Path::new("/sys/block/sdx"),
            Path::new("/sys/block/sdx"),
        );
        assert_eq!(attrs.len(), 1);
        assert!(!attrs.contains(QueueAttribute::IoTimeout));
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            CollectError::AttributeUnavailable {
                attribute: QueueAttribute::IoTimeout,
                ..
            }
        ));
        assert!(!errors[0].is_fatal());
    }

    #[test]
    fn test_partition_reads_queue_from_parent() {
        let fs = MockFs::typical_host();
        let topology = TopologyResolver::new(fs.clone(), "/sys")
            .resolve("nvme0n1p1", DeviceNumber::new(259, 1), &HashMap::new())
            .unwrap();
        let reader = QueueAttributeReader::new(fs);

        let (attrs, errors) = reader.read_for("nvme0n1p1", &topology);
        assert!(errors.is_empty());
        // Own size, parent's queue
        assert_eq!(attrs.get(QueueAttribute::Size), Some("1048576"));
        assert_eq!(attrs.get(QueueAttribute::Rotational), Some("0"));
        assert_eq!(attrs.get(QueueAttribute::Scheduler), Some("[none] mq-deadline"));
    }

    #[test]
    fn test_visit_reports_in_order_and_stops_early() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/block/sdx/size", "2048\n");
        fs.add_unreadable("/sys/block/sdx/queue/io_timeout");
        fs.add_file("/sys/block/sdx/queue/rotational", "1\n");
        let reader = QueueAttributeReader::new(fs);

        let mut seen = Vec::new();
        reader.visit(
            "sdx",
            Path::new("/sys/block/sdx"),
            Path::new("/sys/block/sdx"),
            |attribute, result| {
                seen.push((attribute, result.map_err(|e| e.to_string())));
                attribute != QueueAttribute::IoTimeout
            },
        );

        assert_eq!(seen.len(), 7);
        assert_eq!(seen[0], (QueueAttribute::Inflight, Ok(None)));
        assert_eq!(seen[1], (QueueAttribute::Size, Ok(Some("2048".to_string()))));
        let (last, result) = &seen[6];
        assert_eq!(*last, QueueAttribute::IoTimeout);
        assert!(result.as_ref().unwrap_err().contains("io_timeout"));
    }

    #[test]
    fn test_unresolved_topology_reads_nothing() {
        let reader = QueueAttributeReader::new(MockFs::typical_host());
        let (attrs, errors) = reader.read_for("sdc", &DeviceTopology::unknown());
        assert!(attrs.is_empty());
        assert!(errors.is_empty());

        let mut visited = 0;
        reader.visit_for("sdc", &DeviceTopology::unknown(), |_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
    }
}
